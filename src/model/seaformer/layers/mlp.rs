use burn::{
    nn::{
        PaddingConfig2d,
        conv::{Conv2d, Conv2dConfig},
    },
    prelude::*,
    tensor::activation::relu,
};

use super::{
    conv::Conv2dBn,
    drop::{ForwardMode, dropout},
};

/// Channel-wise feed-forward block with a depthwise 3x3 convolution between
/// the two projections.
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    fc1: Conv2dBn<B>,
    dwconv: Conv2d<B>,
    fc2: Conv2dBn<B>,
    drop: f64,
}

impl<B: Backend> Mlp<B> {
    pub fn new(
        device: &B::Device,
        in_features: usize,
        hidden_features: Option<usize>,
        out_features: Option<usize>,
        drop: f64,
    ) -> Self {
        let hidden = hidden_features.unwrap_or(in_features);
        let out = out_features.unwrap_or(in_features);

        let dwconv = Conv2dConfig::new([hidden, hidden], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_groups(hidden)
            .with_bias(false)
            .init(device);

        Self {
            fc1: Conv2dBn::pointwise(device, in_features, hidden),
            dwconv,
            fc2: Conv2dBn::pointwise(device, hidden, out),
            drop,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>, mode: ForwardMode) -> Tensor<B, 4> {
        let x = self.fc1.forward(x);
        let x = relu(self.dwconv.forward(x));
        let x = dropout(self.drop, x, mode);
        let x = self.fc2.forward(x);
        dropout(self.drop, x, mode)
    }
}
