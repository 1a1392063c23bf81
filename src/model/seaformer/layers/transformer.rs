use burn::{module::Ignored, prelude::*};

use super::{
    attention::SeaAttention,
    conv::Activation,
    drop::{DropPath, ForwardMode},
    mlp::Mlp,
};

#[derive(Config, Debug)]
pub struct BasicLayerConfig {
    pub block_num: usize,
    pub embedding_dim: usize,
    pub key_dim: usize,
    pub num_heads: usize,
    #[config(default = "4.0")]
    pub mlp_ratio: f64,
    #[config(default = "2")]
    pub attn_ratio: usize,
    #[config(default = "0.0")]
    pub drop: f64,
    /// Stochastic depth rate per block; shorter lists repeat their last rate.
    #[config(default = "Vec::new()")]
    pub drop_path: Vec<f64>,
    #[config(default = "Activation::Relu6")]
    pub activation: Activation,
}

impl BasicLayerConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> BasicLayer<B> {
        BasicLayer::new(device, self)
    }

    fn drop_path_at(&self, index: usize) -> f64 {
        self.drop_path
            .get(index)
            .or(self.drop_path.last())
            .copied()
            .unwrap_or(0.0)
    }
}

/// Attention and feed-forward residual pair.
#[derive(Module, Debug)]
pub struct Block<B: Backend> {
    attn: SeaAttention<B>,
    mlp: Mlp<B>,
    drop_path: Ignored<DropPath>,
}

impl<B: Backend> Block<B> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: &B::Device,
        dim: usize,
        key_dim: usize,
        num_heads: usize,
        mlp_ratio: f64,
        attn_ratio: usize,
        drop: f64,
        drop_path: f64,
        activation: Activation,
    ) -> Self {
        let mlp_hidden_dim = (dim as f64 * mlp_ratio) as usize;
        Self {
            attn: SeaAttention::new(device, dim, key_dim, num_heads, attn_ratio, activation),
            mlp: Mlp::new(device, dim, Some(mlp_hidden_dim), None, drop),
            drop_path: Ignored(DropPath::new(drop_path)),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>, mode: ForwardMode) -> Tensor<B, 4> {
        let drop_path = self.drop_path.0;
        let x = x.clone() + drop_path.forward(self.attn.forward(x), mode);
        x.clone() + drop_path.forward(self.mlp.forward(x, mode), mode)
    }

    pub fn drop_path(&self) -> DropPath {
        self.drop_path.0
    }
}

/// A stack of transformer [`Block`]s at one resolution.
#[derive(Module, Debug)]
pub struct BasicLayer<B: Backend> {
    blocks: Vec<Block<B>>,
    embedding_dim: usize,
}

impl<B: Backend> BasicLayer<B> {
    pub fn new(device: &B::Device, config: &BasicLayerConfig) -> Self {
        let blocks = (0..config.block_num)
            .map(|index| {
                Block::new(
                    device,
                    config.embedding_dim,
                    config.key_dim,
                    config.num_heads,
                    config.mlp_ratio,
                    config.attn_ratio,
                    config.drop,
                    config.drop_path_at(index),
                    config.activation,
                )
            })
            .collect();

        Self {
            blocks,
            embedding_dim: config.embedding_dim,
        }
    }

    pub fn forward(&self, mut x: Tensor<B, 4>, mode: ForwardMode) -> Tensor<B, 4> {
        for block in &self.blocks {
            x = block.forward(x, mode);
        }
        x
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    pub fn drop_paths(&self) -> Vec<DropPath> {
        self.blocks.iter().map(Block::drop_path).collect()
    }
}

/// `steps` evenly spaced values from `start` to `end`, both included.
pub fn linspace(start: f64, end: f64, steps: usize) -> Vec<f64> {
    match steps {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (steps as f64 - 1.0);
            (0..steps).map(|i| start + step * i as f64).collect()
        }
    }
}
