#![recursion_limit = "256"]

pub mod error;
pub mod inference;
pub mod model;

pub use error::SeaFormerError;

#[cfg(feature = "backend_cuda")]
pub type InferenceBackend = burn::backend::Cuda<f32>;

#[cfg(all(feature = "backend_wgpu", not(feature = "backend_cuda")))]
pub type InferenceBackend = burn::backend::Wgpu<f32>;

#[cfg(all(
    feature = "backend_ndarray",
    not(any(feature = "backend_cuda", feature = "backend_wgpu"))
))]
pub type InferenceBackend = burn::backend::NdArray<f32>;

#[cfg(test)]
mod tests {
    use super::model::seaformer::{ForwardMode, SeaFormer, SeaFormerConfig};

    #[cfg(feature = "backend_cuda")]
    use burn::backend::Cuda as CudaBackend;

    #[cfg(feature = "backend_ndarray")]
    use burn::backend::NdArray as NdArrayBackend;

    #[cfg(feature = "backend_wgpu")]
    use burn::backend::Wgpu as WgpuBackend;

    use burn::prelude::*;
    use std::any::type_name;
    use std::panic::{self, AssertUnwindSafe};

    #[cfg(feature = "backend_wgpu")]
    fn init_wgpu_device() -> Result<<WgpuBackend<f32> as Backend>::Device, String> {
        panic::catch_unwind(AssertUnwindSafe(|| {
            let device = <WgpuBackend<f32> as Backend>::Device::default();
            // Touch the device so adapter failures surface here.
            let _ = Tensor::<WgpuBackend<f32>, 1>::zeros([1], &device).into_data();
            device
        }))
        .map_err(|_| "Failed to initialize WGPU runtime for tests.".to_string())
    }

    #[cfg(feature = "backend_cuda")]
    fn init_cuda_device() -> Result<<CudaBackend<f32> as Backend>::Device, String> {
        panic::catch_unwind(AssertUnwindSafe(|| {
            <CudaBackend<f32> as Backend>::Device::default()
        }))
        .map_err(|_| "CUDA runtime unavailable on this system.".to_string())
    }

    #[cfg(feature = "backend_ndarray")]
    fn init_ndarray_device() -> Result<<NdArrayBackend<f32> as Backend>::Device, String> {
        Ok(<NdArrayBackend<f32> as Backend>::Device::default())
    }

    fn build_model<B: Backend>(device: &B::Device) -> SeaFormer<B> {
        panic::catch_unwind(AssertUnwindSafe(|| {
            SeaFormer::<B>::new(device, SeaFormerConfig::base())
        }))
        .unwrap_or_else(|_| {
            panic!(
                "SeaFormer initialization panicked when using backend `{}`.",
                type_name::<B>()
            );
        })
        .unwrap_or_else(|err| panic!("SeaFormer base configuration rejected: {err}"))
    }

    #[allow(dead_code)]
    #[derive(Clone, Copy)]
    enum Availability {
        Optional(&'static str),
        Required(&'static str),
    }

    fn resolve_device<B, F>(make_device: F, availability: Availability) -> Option<B::Device>
    where
        B: Backend,
        F: Fn() -> Result<B::Device, String>,
    {
        match make_device() {
            Ok(device) => Some(device),
            Err(reason) => match availability {
                Availability::Optional(label) => {
                    println!("ignored {label}: {reason}");
                    None
                }
                Availability::Required(label) => panic!("{label}: {reason}"),
            },
        }
    }

    fn run_initializes_test<B, F>(make_device: F, availability: Availability)
    where
        B: Backend,
        F: Fn() -> Result<B::Device, String>,
    {
        let Some(device) = resolve_device::<B, _>(make_device, availability) else {
            return;
        };

        let model = build_model::<B>(&device);
        assert_eq!(model.stages().len(), 8);
        assert!(model.has_light_head());
    }

    fn run_roundtrip_test<B, F>(make_device: F, availability: Availability)
    where
        B: Backend,
        F: Fn() -> Result<B::Device, String>,
    {
        let Some(device) = resolve_device::<B, _>(make_device, availability) else {
            return;
        };

        let model = build_model::<B>(&device);
        let record = model.clone().into_record();
        let reloaded = build_model::<B>(&device).load_record(record);

        assert_eq!(model.output_channels(), reloaded.output_channels());

        let input = Tensor::<B, 4>::ones([1, 3, 64, 64], &device);
        let expected = model.forward(input.clone(), ForwardMode::Inference);
        let actual = reloaded.forward(input, ForwardMode::Inference);
        for (expected, actual) in expected.into_iter().zip(actual) {
            assert!(expected.all_close(actual, Some(1e-4), Some(1e-4)));
        }
    }

    fn run_inference_test<B, F>(make_device: F, availability: Availability)
    where
        B: Backend,
        F: Fn() -> Result<B::Device, String>,
    {
        let Some(device) = resolve_device::<B, _>(make_device, availability) else {
            return;
        };

        let model = build_model::<B>(&device);
        let input = Tensor::<B, 4>::zeros([1, 3, 512, 512], &device);
        let outputs = model.forward(input, ForwardMode::Inference);

        let shapes: Vec<_> = outputs.iter().map(|output| output.dims()).collect();
        assert_eq!(
            shapes,
            vec![
                [1, 128, 64, 64],
                [1, 192, 32, 32],
                [1, 256, 16, 16],
                [1, 320, 8, 8],
            ]
        );

        let logits = model
            .forward_head(&outputs, ForwardMode::Inference)
            .expect("base configuration carries a light head");
        assert_eq!(logits.dims(), [1, 2, 64, 64]);
    }

    #[test]
    #[cfg(feature = "backend_wgpu")]
    fn seaformer_initializes_wgpu() {
        run_initializes_test::<WgpuBackend<f32>, _>(
            init_wgpu_device,
            Availability::Optional("WGPU backend test"),
        );
    }

    #[test]
    #[cfg(feature = "backend_wgpu")]
    fn seaformer_roundtrip_record_wgpu() {
        run_roundtrip_test::<WgpuBackend<f32>, _>(
            init_wgpu_device,
            Availability::Optional("WGPU backend test"),
        );
    }

    #[test]
    #[cfg(feature = "backend_cuda")]
    fn seaformer_initializes_cuda() {
        run_initializes_test::<CudaBackend<f32>, _>(
            init_cuda_device,
            Availability::Required("CUDA backend unavailable"),
        );
    }

    #[test]
    #[cfg(feature = "backend_cuda")]
    fn seaformer_roundtrip_record_cuda() {
        run_roundtrip_test::<CudaBackend<f32>, _>(
            init_cuda_device,
            Availability::Required("CUDA backend unavailable"),
        );
    }

    #[test]
    #[cfg(feature = "backend_ndarray")]
    fn seaformer_initializes_ndarray() {
        run_initializes_test::<NdArrayBackend<f32>, _>(
            init_ndarray_device,
            Availability::Required("NdArray backend unavailable"),
        );
    }

    #[test]
    #[cfg(feature = "backend_ndarray")]
    fn seaformer_roundtrip_record_ndarray() {
        run_roundtrip_test::<NdArrayBackend<f32>, _>(
            init_ndarray_device,
            Availability::Required("NdArray backend unavailable"),
        );
    }

    #[test]
    #[cfg(feature = "backend_wgpu")]
    fn seaformer_infers_wgpu() {
        run_inference_test::<WgpuBackend<f32>, _>(
            init_wgpu_device,
            Availability::Optional("WGPU backend test"),
        );
    }

    #[test]
    #[cfg(feature = "backend_cuda")]
    fn seaformer_infers_cuda() {
        run_inference_test::<CudaBackend<f32>, _>(
            init_cuda_device,
            Availability::Required("CUDA backend unavailable"),
        );
    }

    #[test]
    #[cfg(feature = "backend_ndarray")]
    fn seaformer_infers_ndarray() {
        run_inference_test::<NdArrayBackend<f32>, _>(
            init_ndarray_device,
            Availability::Required("NdArray backend unavailable"),
        );
    }
}
