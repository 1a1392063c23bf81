use burn::{module::Ignored, prelude::*};
use tracing::{debug, info};

pub mod layers;
mod interpolate;

pub use interpolate::{InterpolationMethod, resize_bilinear, resize_linear};
pub use layers::{
    attention::{SeaAttention, SqueezeAxialPositionalEmbedding},
    conv::{Activation, Conv2dBn, Conv2dBnConfig, h_sigmoid},
    drop::{DropPath, ForwardMode},
    light_head::{FusionBlock, LightHead},
    mlp::Mlp,
    mobile::{InvertedResidual, MobileBlockConfig, StackedMv2Block, make_divisible},
    transformer::{BasicLayer, BasicLayerConfig, Block, linspace},
};

use crate::error::{Result, SeaFormerError};

/// Index of the convolutional stage whose output is always reported.
const DETAIL_STAGE: usize = 1;

#[derive(Config, Debug)]
pub struct SeaFormerConfig {
    /// One list of inverted residual blocks per convolutional stage.
    pub cfgs: Vec<Vec<MobileBlockConfig>>,
    /// Input width of each convolutional stage (`channels[0]` is the stem width).
    pub channels: Vec<usize>,
    pub emb_dims: Vec<usize>,
    pub key_dims: Vec<usize>,
    #[config(default = "vec![2, 2]")]
    pub depths: Vec<usize>,
    #[config(default = "8")]
    pub num_heads: usize,
    #[config(default = "2")]
    pub attn_ratios: usize,
    #[config(default = "vec![2.0, 4.0]")]
    pub mlp_ratios: Vec<f64>,
    #[config(default = "0.0")]
    pub drop_path_rate: f64,
    /// Activation inside the transformer stages.
    #[config(default = "Activation::Relu6")]
    pub activation: Activation,
    /// Activation inside the convolutional stages.
    #[config(default = "Activation::Relu")]
    pub mobile_activation: Activation,
    #[config(default = "1.0")]
    pub width_mult: f64,
    #[config(default = "1000")]
    pub num_classes: usize,
    /// Fusion widths of the light segmentation head; `None` builds no head.
    #[config(default = "None")]
    pub decoder_embed_dims: Option<Vec<usize>>,
    #[config(default = "InterpolationMethod::Custom")]
    pub interpolation: InterpolationMethod,
}

impl Default for SeaFormerConfig {
    fn default() -> Self {
        Self::base()
    }
}

impl SeaFormerConfig {
    /// The five-stage, three-transformer layout producing 128, 192, 256 and
    /// 320 channel features at strides 8, 16, 32 and 64.
    pub fn base() -> Self {
        let stage = |blocks: &[[usize; 4]]| {
            blocks
                .iter()
                .copied()
                .map(MobileBlockConfig::from_array)
                .collect::<Vec<_>>()
        };

        Self {
            cfgs: vec![
                stage(&[[3, 3, 32, 1], [3, 4, 64, 2], [3, 4, 64, 1]]),
                stage(&[[5, 4, 128, 2], [5, 4, 128, 1]]),
                stage(&[[3, 4, 192, 2], [3, 4, 192, 1]]),
                stage(&[[5, 4, 256, 2]]),
                stage(&[[3, 6, 320, 2]]),
            ],
            channels: vec![32, 64, 128, 192, 256, 320],
            emb_dims: vec![192, 256, 320],
            key_dims: vec![16, 20, 24],
            depths: vec![3, 3, 3],
            num_heads: 8,
            attn_ratios: 2,
            mlp_ratios: vec![2.0, 4.0, 6.0],
            drop_path_rate: 0.1,
            activation: Activation::Relu6,
            mobile_activation: Activation::Relu,
            width_mult: 1.0,
            num_classes: 2,
            decoder_embed_dims: Some(vec![128, 160, 192]),
            interpolation: InterpolationMethod::Custom,
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<SeaFormer<B>> {
        SeaFormer::new(device, self.clone())
    }

    fn stage_out_channels(&self, stage: usize) -> usize {
        self.cfgs[stage]
            .last()
            .map(|cfg| make_divisible(cfg.out_channels as f64 * self.width_mult, 8, None))
            .unwrap_or(self.channels[stage])
    }

    fn stage_stride(&self, stage: usize) -> usize {
        let stem = if stage == 0 { 2 } else { 1 };
        stem * self.cfgs[stage].iter().map(|cfg| cfg.stride).product::<usize>()
    }

    /// Index of the transformer stage that follows convolutional stage `stage`.
    fn transformer_slot(&self, stage: usize) -> Option<usize> {
        (self.depths.len() + stage >= self.cfgs.len())
            .then(|| stage + self.depths.len() - self.cfgs.len())
    }

    /// Channel count of every backbone output, in order.
    pub fn output_channels(&self) -> Vec<usize> {
        self.collect_outputs(|config, stage| config.stage_out_channels(stage))
    }

    /// Total stride relative to the input of every backbone output, in order.
    pub fn output_strides(&self) -> Vec<usize> {
        let mut cumulative = Vec::with_capacity(self.cfgs.len());
        let mut stride = 1;
        for stage in 0..self.cfgs.len() {
            stride *= self.stage_stride(stage);
            cumulative.push(stride);
        }
        self.collect_outputs(|_, stage| cumulative[stage])
    }

    fn collect_outputs(&self, value: impl Fn(&Self, usize) -> usize) -> Vec<usize> {
        let mut outputs = Vec::new();
        for stage in 0..self.cfgs.len() {
            if stage == DETAIL_STAGE {
                outputs.push(value(self, stage));
            }
            if self.transformer_slot(stage).is_some() {
                outputs.push(value(self, stage));
            }
        }
        outputs
    }

    pub fn validate(&self) -> Result<()> {
        let stages = self.cfgs.len();
        let transformers = self.depths.len();

        if stages == 0 {
            return Err(SeaFormerError::config("at least one convolutional stage is required"));
        }
        if self.channels.len() < stages {
            return Err(SeaFormerError::config(format!(
                "{stages} convolutional stages need {stages} input widths, got {}",
                self.channels.len()
            )));
        }
        if transformers > stages {
            return Err(SeaFormerError::config(format!(
                "{transformers} transformer stages cannot follow {stages} convolutional stages"
            )));
        }
        for (name, len) in [
            ("emb_dims", self.emb_dims.len()),
            ("key_dims", self.key_dims.len()),
            ("mlp_ratios", self.mlp_ratios.len()),
        ] {
            if len != transformers {
                return Err(SeaFormerError::config(format!(
                    "{name} has {len} entries for {transformers} transformer stages"
                )));
            }
        }
        if self.num_heads == 0 {
            return Err(SeaFormerError::config("num_heads must be positive"));
        }
        if self.attn_ratios == 0 || self.key_dims.contains(&0) {
            return Err(SeaFormerError::config(
                "key dimensions and attention ratio must be positive",
            ));
        }
        if self.width_mult <= 0.0 {
            return Err(SeaFormerError::config("width_mult must be positive"));
        }
        for (slot, (&dim, &ratio)) in self.emb_dims.iter().zip(&self.mlp_ratios).enumerate() {
            if !ratio.is_finite() || dim as f64 * ratio < 1.0 {
                return Err(SeaFormerError::config(format!(
                    "transformer stage {slot}: mlp ratio {ratio} leaves no hidden width for {dim} channels"
                )));
            }
        }

        for stage in 1..stages {
            let produced = self.stage_out_channels(stage - 1);
            if self.channels[stage] != produced {
                return Err(SeaFormerError::config(format!(
                    "stage {stage} expects {} input channels but stage {} produces {produced}",
                    self.channels[stage],
                    stage - 1
                )));
            }
        }

        for stage in 0..stages {
            if let Some(slot) = self.transformer_slot(stage) {
                let produced = self.stage_out_channels(stage);
                if self.emb_dims[slot] != produced {
                    return Err(SeaFormerError::config(format!(
                        "transformer stage {slot} embeds {} channels but follows a {produced} channel stage",
                        self.emb_dims[slot]
                    )));
                }
            }
        }

        if let Some(embed_dims) = &self.decoder_embed_dims {
            let outputs = self.output_channels().len();
            if embed_dims.len() + 1 != outputs {
                return Err(SeaFormerError::config(format!(
                    "light head needs {} fusion widths for {outputs} backbone outputs, got {}",
                    outputs.saturating_sub(1),
                    embed_dims.len()
                )));
            }
        }

        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageKind {
    Convolutional,
    Transformer,
}

/// One entry of the backbone's ordered stage list.
#[derive(Module, Debug)]
pub enum SeaFormerStage<B: Backend> {
    Convolutional(StackedMv2Block<B>),
    Transformer(BasicLayer<B>),
}

impl<B: Backend> SeaFormerStage<B> {
    pub fn kind(&self) -> StageKind {
        match self {
            Self::Convolutional(_) => StageKind::Convolutional,
            Self::Transformer(_) => StageKind::Transformer,
        }
    }

    fn forward(&self, x: Tensor<B, 4>, mode: ForwardMode) -> Tensor<B, 4> {
        match self {
            Self::Convolutional(block) => block.forward(x),
            Self::Transformer(layer) => layer.forward(x, mode),
        }
    }
}

#[derive(Module, Debug)]
pub struct SeaFormer<B: Backend> {
    stages: Vec<SeaFormerStage<B>>,
    /// Parallel to `stages`: whether a stage's output is returned by `forward`.
    emits_output: Ignored<Vec<bool>>,
    light_head: Option<LightHead<B>>,
    output_channels: Ignored<Vec<usize>>,
    interpolation: Ignored<InterpolationMethod>,
}

impl<B: Backend> SeaFormer<B> {
    pub fn new(device: &B::Device, config: SeaFormerConfig) -> Result<Self> {
        config.validate()?;

        let mut stages = Vec::with_capacity(config.cfgs.len() + config.depths.len());
        let mut emits_output = Vec::with_capacity(stages.capacity());
        for (index, cfgs) in config.cfgs.iter().enumerate() {
            let block = StackedMv2Block::new(
                device,
                cfgs,
                index == 0,
                config.channels[index],
                config.mobile_activation,
                config.width_mult,
            )
            .map_err(|err| match err {
                SeaFormerError::InvalidConfiguration(message) => {
                    SeaFormerError::config(format!("convolutional stage {index}: {message}"))
                }
                other => other,
            })?;
            debug!(
                stage = stages.len(),
                kind = ?StageKind::Convolutional,
                out_channels = block.out_channels(),
                stride = block.stride(),
                "built stage"
            );
            stages.push(SeaFormerStage::Convolutional(block));
            emits_output.push(index == DETAIL_STAGE);

            if let Some(slot) = config.transformer_slot(index) {
                let depth = config.depths[slot];
                let layer = BasicLayerConfig::new(
                    depth,
                    config.emb_dims[slot],
                    config.key_dims[slot],
                    config.num_heads,
                )
                .with_mlp_ratio(config.mlp_ratios[slot])
                .with_attn_ratio(config.attn_ratios)
                .with_drop_path(linspace(0.0, config.drop_path_rate, depth))
                .with_activation(config.activation)
                .init(device);
                debug!(
                    stage = stages.len(),
                    kind = ?StageKind::Transformer,
                    blocks = depth,
                    embedding_dim = config.emb_dims[slot],
                    "built stage"
                );
                stages.push(SeaFormerStage::Transformer(layer));
                emits_output.push(true);
            }
        }

        let output_channels = config.output_channels();
        let light_head = config.decoder_embed_dims.as_ref().map(|embed_dims| {
            LightHead::new(
                device,
                &output_channels,
                embed_dims,
                config.num_classes,
                config.interpolation,
            )
        });

        info!(
            stages = stages.len(),
            outputs = ?output_channels,
            light_head = light_head.is_some(),
            "constructed SeaFormer"
        );

        Ok(Self {
            stages,
            emits_output: Ignored(emits_output),
            light_head,
            output_channels: Ignored(output_channels),
            interpolation: Ignored(config.interpolation),
        })
    }

    /// Runs the backbone and returns the detail feature followed by every
    /// transformer stage output.
    pub fn forward(&self, mut x: Tensor<B, 4>, mode: ForwardMode) -> Vec<Tensor<B, 4>> {
        let mut outputs = Vec::with_capacity(self.output_channels.0.len());
        for (stage, &emits) in self.stages.iter().zip(&self.emits_output.0) {
            x = stage.forward(x, mode);
            if emits {
                outputs.push(x.clone());
            }
        }
        outputs
    }

    /// Class logits from the light head at the resolution of the first
    /// backbone output, or `None` when the model was built without a head.
    pub fn forward_head(
        &self,
        features: &[Tensor<B, 4>],
        mode: ForwardMode,
    ) -> Option<Tensor<B, 4>> {
        self.light_head
            .as_ref()
            .map(|head| head.forward(features, mode))
    }

    /// Per-pixel class logits at the input resolution.
    pub fn segment(&self, x: Tensor<B, 4>, mode: ForwardMode) -> Option<Tensor<B, 4>> {
        let [_, _, height, width] = x.dims();
        let features = self.forward(x, mode);
        self.forward_head(&features, mode)
            .map(|logits| resize_bilinear(logits, [height, width], self.interpolation.0))
    }

    pub fn stages(&self) -> &[SeaFormerStage<B>] {
        &self.stages
    }

    /// Whether each stage, in order, contributes to the output of [`Self::forward`].
    pub fn emitting_stages(&self) -> &[bool] {
        &self.emits_output.0
    }

    pub fn output_channels(&self) -> &[usize] {
        &self.output_channels.0
    }

    pub fn has_light_head(&self) -> bool {
        self.light_head.is_some()
    }

    pub fn interpolation_method(&self) -> InterpolationMethod {
        self.interpolation.0
    }
}
