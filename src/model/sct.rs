use burn::{
    module::Ignored,
    nn::{
        BatchNorm, BatchNormConfig, PaddingConfig2d,
        conv::{Conv2d, Conv2dConfig},
    },
    prelude::*,
    tensor::activation::relu,
};
use tracing::info;

use crate::{
    error::{Result, SeaFormerError},
    model::seaformer::{
        ForwardMode, InterpolationMethod, SeaFormer, SeaFormerConfig,
        layers::drop::dropout,
        resize_bilinear,
    },
};

#[derive(Config, Debug)]
pub struct SctHeadConfig {
    pub in_channels: usize,
    #[config(default = "128")]
    pub channels: usize,
    #[config(default = "2")]
    pub num_classes: usize,
    #[config(default = "0.1")]
    pub dropout: f64,
    /// Resolution the feature is resampled to before classification.
    #[config(default = "[512, 512]")]
    pub output_size: [usize; 2],
    #[config(default = "InterpolationMethod::Custom")]
    pub interpolation: InterpolationMethod,
}

impl SctHeadConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SctHead<B> {
        SctHead::new(device, self)
    }
}

/// Upsamples a single backbone feature and classifies every pixel.
#[derive(Module, Debug)]
pub struct SctHead<B: Backend> {
    bn1: BatchNorm<B>,
    conv1: Conv2d<B>,
    dropout: f64,
    bn2: BatchNorm<B>,
    conv_seg: Conv2d<B>,
    output_size: Ignored<[usize; 2]>,
    interpolation: Ignored<InterpolationMethod>,
}

impl<B: Backend> SctHead<B> {
    pub fn new(device: &B::Device, config: &SctHeadConfig) -> Self {
        Self {
            bn1: BatchNormConfig::new(config.in_channels).init(device),
            conv1: Conv2dConfig::new([config.in_channels, config.channels], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            dropout: config.dropout,
            bn2: BatchNormConfig::new(config.channels).init(device),
            conv_seg: Conv2dConfig::new([config.channels, config.num_classes], [1, 1])
                .init(device),
            output_size: Ignored(config.output_size),
            interpolation: Ignored(config.interpolation),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>, mode: ForwardMode) -> Tensor<B, 4> {
        let x = resize_bilinear(x, self.output_size.0, self.interpolation.0);
        let x = self.conv1.forward(relu(self.bn1.forward(x)));
        let x = dropout(self.dropout, x, mode);
        self.conv_seg.forward(relu(self.bn2.forward(x)))
    }

    pub fn output_size(&self) -> [usize; 2] {
        self.output_size.0
    }
}

#[derive(Config, Debug)]
pub struct SctSeaConfig {
    pub backbone: SeaFormerConfig,
    /// Which backbone output feeds the head.
    #[config(default = "2")]
    pub feature_index: usize,
    #[config(default = "128")]
    pub channels: usize,
    #[config(default = "2")]
    pub num_classes: usize,
    #[config(default = "0.1")]
    pub dropout: f64,
    #[config(default = "[512, 512]")]
    pub output_size: [usize; 2],
}

impl Default for SctSeaConfig {
    fn default() -> Self {
        Self::new(SeaFormerConfig::base().with_decoder_embed_dims(None))
    }
}

impl SctSeaConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<SctSea<B>> {
        SctSea::new(device, self.clone())
    }

    /// Head configuration wired to the selected backbone output.
    pub fn head(&self) -> Result<SctHeadConfig> {
        let outputs = self.backbone.output_channels();
        let in_channels = outputs.get(self.feature_index).copied().ok_or_else(|| {
            SeaFormerError::config(format!(
                "feature_index {} is out of range for {} backbone outputs",
                self.feature_index,
                outputs.len()
            ))
        })?;

        Ok(SctHeadConfig::new(in_channels)
            .with_channels(self.channels)
            .with_num_classes(self.num_classes)
            .with_dropout(self.dropout)
            .with_output_size(self.output_size)
            .with_interpolation(self.backbone.interpolation))
    }
}

/// SeaFormer backbone followed by an [`SctHead`] on one of its outputs.
#[derive(Module, Debug)]
pub struct SctSea<B: Backend> {
    backbone: SeaFormer<B>,
    decoder: SctHead<B>,
    feature_index: usize,
}

impl<B: Backend> SctSea<B> {
    pub fn new(device: &B::Device, config: SctSeaConfig) -> Result<Self> {
        let head = config.head()?;
        let backbone = SeaFormer::new(device, config.backbone.clone())?;
        info!(
            feature_index = config.feature_index,
            in_channels = head.in_channels,
            output_size = ?head.output_size,
            "constructed SctSea"
        );

        Ok(Self {
            backbone,
            decoder: head.init(device),
            feature_index: config.feature_index,
        })
    }

    pub fn forward(&self, x: Tensor<B, 4>, mode: ForwardMode) -> Tensor<B, 4> {
        let mut features = self.backbone.forward(x, mode);
        self.decoder
            .forward(features.swap_remove(self.feature_index), mode)
    }

    pub fn backbone(&self) -> &SeaFormer<B> {
        &self.backbone
    }

    pub fn output_size(&self) -> [usize; 2] {
        self.decoder.output_size()
    }
}
