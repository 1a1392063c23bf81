use burn::{
    module::{Ignored, Param},
    nn::{
        BatchNorm, BatchNormConfig, PaddingConfig2d,
        conv::{Conv2d, Conv2dConfig},
    },
    prelude::*,
    tensor::activation::{hard_sigmoid, relu},
};

/// Activation applied between SeaFormer's convolution blocks.
#[derive(Config, Debug, Copy, PartialEq, Eq)]
pub enum Activation {
    Identity,
    Relu,
    Relu6,
}

impl Default for Activation {
    fn default() -> Self {
        Self::Relu
    }
}

impl Activation {
    pub fn forward<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Self::Identity => x,
            Self::Relu => relu(x),
            Self::Relu6 => relu6(x),
        }
    }
}

pub fn relu6<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x.clamp(0.0, 6.0)
}

/// `relu6(x + 3) / 6`: zero below -3, one above 3, linear in between.
pub fn h_sigmoid<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    hard_sigmoid(x, 1.0 / 6.0, 0.5)
}

#[derive(Config, Debug)]
pub struct Conv2dBnConfig {
    pub channels: [usize; 2],
    #[config(default = "1")]
    pub kernel_size: usize,
    #[config(default = "1")]
    pub stride: usize,
    #[config(default = "0")]
    pub padding: usize,
    #[config(default = "1")]
    pub dilation: usize,
    #[config(default = "1")]
    pub groups: usize,
    #[config(default = "Activation::Relu")]
    pub activation: Activation,
}

impl Conv2dBnConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Conv2dBn<B> {
        Conv2dBn::new(device, self)
    }
}

/// Convolution followed by batch normalization and an activation.
#[derive(Module, Debug)]
pub struct Conv2dBn<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B>,
    activation: Ignored<Activation>,
}

impl<B: Backend> Conv2dBn<B> {
    pub fn new(device: &B::Device, config: &Conv2dBnConfig) -> Self {
        let [in_channels, out_channels] = config.channels;
        let conv = Conv2dConfig::new(
            [in_channels, out_channels],
            [config.kernel_size, config.kernel_size],
        )
        .with_stride([config.stride, config.stride])
        .with_padding(PaddingConfig2d::Explicit(config.padding, config.padding))
        .with_dilation([config.dilation, config.dilation])
        .with_groups(config.groups)
        .with_bias(true)
        .init(device);

        Self {
            conv,
            bn: BatchNormConfig::new(out_channels).init(device),
            activation: Ignored(config.activation),
        }
    }

    /// 1x1 projection with the default ReLU.
    pub fn pointwise(device: &B::Device, in_channels: usize, out_channels: usize) -> Self {
        Conv2dBnConfig::new([in_channels, out_channels]).init(device)
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        self.activation.0.forward(x)
    }

    pub fn out_channels(&self) -> usize {
        self.bn.gamma.val().dims()[0]
    }

    /// Zeroes the normalization scale so the block emits `activation(beta)`,
    /// which is zero for the default initialization.
    pub fn zero_init_gamma(&mut self) {
        let gamma = self.bn.gamma.val();
        self.bn.gamma = Param::from_tensor(gamma.zeros_like());
    }
}
