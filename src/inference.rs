use burn::prelude::*;

use crate::{
    error::{Result, SeaFormerError},
    model::{AnySegmentationModel, seaformer::ForwardMode},
};

/// Per-channel mean of the RGB statistics SeaFormer is trained with, in `[0, 255]`.
pub const IMAGENET_MEAN: [f32; 3] = [123.675, 116.28, 103.53];
/// Per-channel standard deviation, in `[0, 255]`.
pub const IMAGENET_STD: [f32; 3] = [58.395, 57.12, 57.375];

/// Converts packed RGB bytes into a normalized tensor suitable for the
/// segmentation models.
///
/// The input slice must contain `width * height * 3` bytes in row-major order.
/// The output tensor is channel-first (`NCHW`), standardized per channel with
/// [`IMAGENET_MEAN`] and [`IMAGENET_STD`].
pub fn rgb_to_input_tensor<B: Backend>(
    rgb: &[u8],
    width: usize,
    height: usize,
    device: &B::Device,
) -> Result<Tensor<B, 4>> {
    if width == 0 || height == 0 {
        return Err(SeaFormerError::input(format!(
            "image must not be empty, got {width}x{height}"
        )));
    }

    let expected_len = width
        .checked_mul(height)
        .and_then(|pixels| pixels.checked_mul(3))
        .ok_or_else(|| SeaFormerError::input("image dimensions overflowed while preparing input"))?;

    if rgb.len() != expected_len {
        return Err(SeaFormerError::input(format!(
            "expected {expected_len} RGB bytes for {width}x{height}, got {}",
            rgb.len()
        )));
    }

    let hw = width * height;
    let mut data = vec![0.0f32; 3 * hw];

    for (idx, pixel) in rgb.chunks_exact(3).enumerate() {
        for channel in 0..3 {
            let value = pixel[channel] as f32;
            data[channel * hw + idx] = (value - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel];
        }
    }

    Ok(
        Tensor::<B, 1>::from_floats(data.as_slice(), device).reshape([
            1,
            3,
            height as i32,
            width as i32,
        ]),
    )
}

/// Picks the highest scoring class for every pixel of `(B, C, H, W)` logits.
pub fn logits_to_class_map<B: Backend>(logits: Tensor<B, 4>) -> Tensor<B, 3, Int> {
    logits.argmax(1).squeeze_dim::<3>(1)
}

/// Runs a segmentation model directly from packed RGB bytes and returns the
/// per-pixel class map.
pub fn segment_from_rgb<B: Backend>(
    model: &AnySegmentationModel<B>,
    rgb: &[u8],
    width: usize,
    height: usize,
    device: &B::Device,
) -> Result<Tensor<B, 3, Int>> {
    let input = rgb_to_input_tensor::<B>(rgb, width, height, device)?;
    let logits = model.segment(input, ForwardMode::Inference)?;
    Ok(logits_to_class_map(logits))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::seaformer::{MobileBlockConfig, SeaFormerConfig};
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn rgb_to_input_tensor_standardizes_channels() {
        let device = <TestBackend as Backend>::Device::default();
        let rgb = vec![
            0u8, 255, 128, //
            124, 116, 104,
        ];
        let tensor = rgb_to_input_tensor::<TestBackend>(&rgb, 1, 2, &device).unwrap();
        let data = tensor.into_data().convert::<f32>();
        assert_eq!(data.shape.as_slice(), &[1, 3, 2, 1]);
        let values = data.to_vec::<f32>().unwrap();

        let expected = [
            -123.675 / 58.395,
            0.325 / 58.395,
            138.72 / 57.12,
            -0.28 / 57.12,
            24.47 / 57.375,
            0.47 / 57.375,
        ];
        assert_eq!(values.len(), expected.len());
        for (value, expected) in values.iter().zip(expected.iter()) {
            assert!((value - expected).abs() < 1e-5, "{value} != {expected}");
        }
    }

    #[test]
    fn rgb_to_input_tensor_rejects_invalid_length() {
        let device = <TestBackend as Backend>::Device::default();
        let rgb = vec![0u8; 5];
        let result = rgb_to_input_tensor::<TestBackend>(&rgb, 1, 2, &device);
        assert!(matches!(result, Err(SeaFormerError::InvalidInput(_))));
    }

    #[test]
    fn rgb_to_input_tensor_rejects_empty_image() {
        let device = <TestBackend as Backend>::Device::default();
        let result = rgb_to_input_tensor::<TestBackend>(&[], 0, 4, &device);
        assert!(result.is_err());
    }

    #[test]
    fn logits_to_class_map_takes_argmax() {
        let device = <TestBackend as Backend>::Device::default();
        let logits = Tensor::<TestBackend, 4>::from_floats(
            [[[[0.1, 2.0]], [[0.5, -1.0]], [[0.2, 3.0]]]],
            &device,
        );
        let classes = logits_to_class_map(logits);
        assert_eq!(classes.dims(), [1, 1, 2]);
        let values = classes
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .unwrap();
        assert_eq!(values, vec![1, 2]);
    }

    #[test]
    fn segment_from_rgb_returns_class_per_pixel() {
        let device = <TestBackend as Backend>::Device::default();
        let stage = |blocks: &[[usize; 4]]| {
            blocks
                .iter()
                .copied()
                .map(MobileBlockConfig::from_array)
                .collect::<Vec<_>>()
        };
        let config = SeaFormerConfig::new(
            vec![
                stage(&[[3, 1, 16, 2]]),
                stage(&[[3, 3, 24, 2]]),
                stage(&[[3, 3, 32, 2]]),
            ],
            vec![16, 16, 24],
            vec![24, 32],
            vec![8, 8],
        )
        .with_depths(vec![1, 1])
        .with_num_heads(2)
        .with_mlp_ratios(vec![2.0, 2.0])
        .with_num_classes(3)
        .with_decoder_embed_dims(Some(vec![16, 16]));
        let model = AnySegmentationModel::SeaFormer(config.init::<TestBackend>(&device).unwrap());

        let rgb = vec![90u8; 32 * 24 * 3];
        let classes = segment_from_rgb::<TestBackend>(&model, &rgb, 32, 24, &device).unwrap();
        assert_eq!(classes.dims(), [1, 24, 32]);

        let max = classes.max().into_scalar().elem::<i64>();
        assert!((0..3).contains(&max));
    }
}
