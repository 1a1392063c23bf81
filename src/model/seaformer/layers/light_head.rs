use burn::{
    module::Ignored,
    nn::conv::{Conv2d, Conv2dConfig},
    prelude::*,
};

use super::{
    conv::{Activation, Conv2dBn, Conv2dBnConfig, h_sigmoid},
    drop::{ForwardMode, dropout},
};
use crate::model::seaformer::interpolate::{InterpolationMethod, resize_bilinear};

/// Gates a high-resolution detail feature with a coarser semantic feature.
#[derive(Module, Debug)]
pub struct FusionBlock<B: Backend> {
    local_embedding: Conv2dBn<B>,
    global_act: Conv2dBn<B>,
}

impl<B: Backend> FusionBlock<B> {
    pub fn new(device: &B::Device, inp: usize, oup: usize, embed_dim: usize) -> Self {
        let projection = |channels_in: usize| {
            Conv2dBnConfig::new([channels_in, embed_dim])
                .with_activation(Activation::Identity)
                .init(device)
        };

        Self {
            local_embedding: projection(inp),
            global_act: projection(oup),
        }
    }

    pub fn forward(
        &self,
        detail: Tensor<B, 4>,
        semantic: Tensor<B, 4>,
        interpolation: InterpolationMethod,
    ) -> Tensor<B, 4> {
        let [_, _, height, width] = detail.dims();
        let local = self.local_embedding.forward(detail);
        let gate = h_sigmoid(self.global_act.forward(semantic));
        let gate = resize_bilinear(gate, [height, width], interpolation);
        local * gate
    }
}

/// SeaFormer's segmentation head. Folds every deeper backbone output into
/// the first (highest resolution) one and classifies each pixel there.
#[derive(Module, Debug)]
pub struct LightHead<B: Backend> {
    fusions: Vec<FusionBlock<B>>,
    linear_fuse: Conv2dBn<B>,
    dropout: f64,
    conv_seg: Conv2d<B>,
    interpolation: Ignored<InterpolationMethod>,
}

impl<B: Backend> LightHead<B> {
    /// `in_channels` holds the channel count of every backbone output in
    /// order; `embed_dims` has one entry per output after the first.
    pub fn new(
        device: &B::Device,
        in_channels: &[usize],
        embed_dims: &[usize],
        num_classes: usize,
        interpolation: InterpolationMethod,
    ) -> Self {
        assert_eq!(
            in_channels.len(),
            embed_dims.len() + 1,
            "light head needs one embedding width per fused feature"
        );

        let mut fusions = Vec::with_capacity(embed_dims.len());
        let mut detail_channels = in_channels[0];
        for (&semantic_channels, &embed_dim) in in_channels[1..].iter().zip(embed_dims) {
            fusions.push(FusionBlock::new(
                device,
                detail_channels,
                semantic_channels,
                embed_dim,
            ));
            detail_channels = embed_dim;
        }

        let head_channels = detail_channels;
        Self {
            fusions,
            linear_fuse: Conv2dBn::pointwise(device, head_channels, head_channels),
            dropout: 0.1,
            conv_seg: Conv2dConfig::new([head_channels, num_classes], [1, 1])
                .with_bias(true)
                .init(device),
            interpolation: Ignored(interpolation),
        }
    }

    pub fn forward(&self, features: &[Tensor<B, 4>], mode: ForwardMode) -> Tensor<B, 4> {
        let levels = features.len();
        if levels != self.fusions.len() + 1 {
            panic!(
                "Got {levels} backbone features, light head expects {}.",
                self.fusions.len() + 1
            );
        }

        let mut detail = features[0].clone();
        for (fusion, semantic) in self.fusions.iter().zip(&features[1..]) {
            detail = fusion.forward(detail, semantic.clone(), self.interpolation.0);
        }

        let x = self.linear_fuse.forward(detail);
        let x = dropout(self.dropout, x, mode);
        self.conv_seg.forward(x)
    }
}
