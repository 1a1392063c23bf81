use burn::{module::Ignored, prelude::*};
use tracing::trace;

use super::conv::{Activation, Conv2dBn, Conv2dBnConfig};
use crate::error::{Result, SeaFormerError};

/// Rounds `value` to the nearest multiple of `divisor`, never below
/// `min_value` (defaults to `divisor`) and never more than ten percent below
/// `value`.
pub fn make_divisible(value: f64, divisor: usize, min_value: Option<usize>) -> usize {
    let min_value = min_value.unwrap_or(divisor);
    let rounded = ((value + divisor as f64 / 2.0) as usize / divisor) * divisor;
    let mut new_value = min_value.max(rounded);
    if (new_value as f64) < 0.9 * value {
        new_value += divisor;
    }
    new_value
}

/// One inverted residual block of a convolutional stage.
#[derive(Config, Debug, Copy, PartialEq, Eq)]
pub struct MobileBlockConfig {
    pub kernel_size: usize,
    pub expand_ratio: usize,
    pub out_channels: usize,
    pub stride: usize,
}

impl MobileBlockConfig {
    /// `[kernel_size, expand_ratio, out_channels, stride]`.
    pub const fn from_array(values: [usize; 4]) -> Self {
        Self {
            kernel_size: values[0],
            expand_ratio: values[1],
            out_channels: values[2],
            stride: values[3],
        }
    }
}

#[derive(Module, Debug)]
pub struct InvertedResidual<B: Backend> {
    expand: Option<Conv2dBn<B>>,
    depthwise: Conv2dBn<B>,
    project: Conv2dBn<B>,
    activation: Ignored<Activation>,
    use_residual: bool,
    stride: usize,
    out_channels: usize,
}

impl<B: Backend> InvertedResidual<B> {
    pub fn new(
        device: &B::Device,
        inp: usize,
        oup: usize,
        kernel_size: usize,
        stride: usize,
        expand_ratio: usize,
        activation: Activation,
    ) -> Result<Self> {
        if stride != 1 && stride != 2 {
            return Err(SeaFormerError::config(format!(
                "inverted residual stride must be 1 or 2, got {stride}"
            )));
        }
        if kernel_size == 0 {
            return Err(SeaFormerError::config("kernel size must be positive"));
        }
        let hidden = inp * expand_ratio;
        if hidden == 0 {
            return Err(SeaFormerError::config(format!(
                "inverted residual with {inp} input channels and expand ratio {expand_ratio} has no hidden width"
            )));
        }

        let expand =
            (expand_ratio != 1).then(|| Conv2dBn::pointwise(device, inp, hidden));
        let depthwise = Conv2dBnConfig::new([hidden, hidden])
            .with_kernel_size(kernel_size)
            .with_stride(stride)
            .with_padding(kernel_size / 2)
            .with_groups(hidden)
            .init(device);
        let project = Conv2dBn::pointwise(device, hidden, oup);

        Ok(Self {
            expand,
            depthwise,
            project,
            activation: Ignored(activation),
            use_residual: stride == 1 && inp == oup,
            stride,
            out_channels: oup,
        })
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut out = x.clone();
        if let Some(expand) = &self.expand {
            out = self.activation.0.forward(expand.forward(out));
        }
        out = self.activation.0.forward(self.depthwise.forward(out));
        out = self.project.forward(out);

        if self.use_residual { x + out } else { out }
    }

    pub fn has_residual(&self) -> bool {
        self.use_residual
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// Makes the residual branch start as an exact identity.
    pub fn zero_init_residual(&mut self) {
        if self.use_residual {
            self.project.zero_init_gamma();
        }
    }
}

/// Convolutional stage: an optional stride-2 stem followed by inverted
/// residual blocks.
#[derive(Module, Debug)]
pub struct StackedMv2Block<B: Backend> {
    stem: Option<Conv2dBn<B>>,
    layers: Vec<InvertedResidual<B>>,
    activation: Ignored<Activation>,
    out_channels: usize,
}

impl<B: Backend> StackedMv2Block<B> {
    pub fn new(
        device: &B::Device,
        cfgs: &[MobileBlockConfig],
        stem: bool,
        inp_channel: usize,
        activation: Activation,
        width_mult: f64,
    ) -> Result<Self> {
        if cfgs.is_empty() {
            return Err(SeaFormerError::config(
                "convolutional stage needs at least one block",
            ));
        }

        let stem = stem.then(|| {
            Conv2dBnConfig::new([3, inp_channel])
                .with_kernel_size(3)
                .with_stride(2)
                .with_padding(1)
                .init(device)
        });

        let mut layers = Vec::with_capacity(cfgs.len());
        let mut channels = inp_channel;
        for (index, cfg) in cfgs.iter().enumerate() {
            let output_channel = make_divisible(cfg.out_channels as f64 * width_mult, 8, None);
            let layer = InvertedResidual::new(
                device,
                channels,
                output_channel,
                cfg.kernel_size,
                cfg.stride,
                cfg.expand_ratio,
                activation,
            )
            .map_err(|err| match err {
                SeaFormerError::InvalidConfiguration(message) => {
                    SeaFormerError::config(format!("block {index}: {message}"))
                }
                other => other,
            })?;
            trace!(
                block = index,
                in_channels = channels,
                out_channels = output_channel,
                stride = cfg.stride,
                residual = layer.has_residual(),
                "inverted residual"
            );
            layers.push(layer);
            channels = output_channel;
        }

        Ok(Self {
            stem,
            layers,
            activation: Ignored(activation),
            out_channels: channels,
        })
    }

    pub fn forward(&self, mut x: Tensor<B, 4>) -> Tensor<B, 4> {
        if let Some(stem) = &self.stem {
            x = self.activation.0.forward(stem.forward(x));
        }
        for layer in &self.layers {
            x = layer.forward(x);
        }
        x
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// Total spatial reduction of this stage, stem included.
    pub fn stride(&self) -> usize {
        let stem = if self.stem.is_some() { 2 } else { 1 };
        stem * self.layers.iter().map(|layer| layer.stride()).product::<usize>()
    }

    pub fn zero_init_residual(&mut self) {
        for layer in &mut self.layers {
            layer.zero_init_residual();
        }
    }
}
