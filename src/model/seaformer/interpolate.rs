use burn::{
    config::Config,
    tensor::{
        Tensor,
        backend::Backend,
        module,
        ops::{InterpolateMode as BurnInterpolateMode, InterpolateOptions},
    },
};

/// Selects how feature maps are resized.
///
/// `Custom` samples with half-pixel centers (`align_corners = false`), the
/// convention SeaFormer checkpoints were trained with. `Burn` defers to the
/// backend's bilinear kernel.
#[derive(Config, Debug, Copy, PartialEq, Eq)]
pub enum InterpolationMethod {
    Custom,
    Burn,
}

impl Default for InterpolationMethod {
    fn default() -> Self {
        Self::Custom
    }
}

fn source_index(output_index: usize, scale: f32) -> f32 {
    ((output_index as f32 + 0.5) * scale - 0.5).max(0.0)
}

/// Row-major `[in_len, out_len]` matrix mapping samples along one axis onto
/// `out_len` linearly interpolated samples.
pub(crate) fn linear_resample_weights(in_len: usize, out_len: usize) -> Vec<f32> {
    assert!(
        in_len > 0 && out_len > 0,
        "resample lengths must be positive"
    );

    let mut weights = vec![0.0f32; in_len * out_len];
    let scale = in_len as f32 / out_len as f32;

    for out in 0..out_len {
        let src = source_index(out, scale);
        let lower = (src.floor() as usize).min(in_len - 1);
        let upper = (lower + 1).min(in_len - 1);
        let frac = (src - lower as f32).clamp(0.0, 1.0);

        weights[lower * out_len + out] += 1.0 - frac;
        weights[upper * out_len + out] += frac;
    }

    weights
}

fn resample_last_axis<B: Backend, const D: usize>(
    input: Tensor<B, D>,
    out_len: usize,
) -> Tensor<B, D> {
    let dims = input.dims();
    let in_len = dims[D - 1];
    if in_len == out_len {
        return input;
    }

    let rows: usize = dims[..D - 1].iter().product();
    let device = input.device();
    let weights = Tensor::<B, 1>::from_floats(
        linear_resample_weights(in_len, out_len).as_slice(),
        &device,
    )
    .reshape([in_len, out_len]);

    let mut out_dims = dims;
    out_dims[D - 1] = out_len;

    input
        .reshape([rows, in_len])
        .matmul(weights)
        .reshape(out_dims)
}

/// Resamples `(batch, channels, length)` along the last axis with linear
/// interpolation and half-pixel centers.
pub fn resize_linear<B: Backend>(input: Tensor<B, 3>, length: usize) -> Tensor<B, 3> {
    resample_last_axis(input, length)
}

fn resize_bilinear_custom<B: Backend>(
    input: Tensor<B, 4>,
    output_size: [usize; 2],
) -> Tensor<B, 4> {
    let [out_height, out_width] = output_size;
    let x = resample_last_axis(input, out_width);
    let x = resample_last_axis(x.swap_dims(2, 3), out_height);
    x.swap_dims(2, 3)
}

fn resize_bilinear_burn<B: Backend>(input: Tensor<B, 4>, output_size: [usize; 2]) -> Tensor<B, 4> {
    module::interpolate(
        input,
        output_size,
        InterpolateOptions::new(BurnInterpolateMode::Bilinear),
    )
}

pub fn resize_bilinear<B: Backend>(
    input: Tensor<B, 4>,
    output_size: [usize; 2],
    method: InterpolationMethod,
) -> Tensor<B, 4> {
    let [_, _, in_height, in_width] = input.dims();
    if [in_height, in_width] == output_size {
        return input;
    }

    assert!(
        output_size[0] > 0 && output_size[1] > 0,
        "output size must be positive"
    );

    match method {
        InterpolationMethod::Custom => resize_bilinear_custom(input, output_size),
        InterpolationMethod::Burn => resize_bilinear_burn(input, output_size),
    }
}
