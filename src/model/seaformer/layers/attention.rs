use burn::{
    module::{Ignored, Param},
    nn::Initializer,
    prelude::*,
    tensor::activation::softmax,
};

use super::conv::{Activation, Conv2dBn, Conv2dBnConfig, h_sigmoid};
use crate::model::seaformer::interpolate::resize_linear;

/// Nominal length of the learned axial position tables.
pub const AXIAL_EMBEDDING_LENGTH: usize = 16;

/// Learned 1-D positional bias along one spatial axis, resampled to the
/// length of whatever axis it is added to.
#[derive(Module, Debug)]
pub struct SqueezeAxialPositionalEmbedding<B: Backend> {
    pos_embed: Param<Tensor<B, 3>>,
}

impl<B: Backend> SqueezeAxialPositionalEmbedding<B> {
    /// The table is Xavier-uniform initialized with fans computed over the
    /// `(1, dim, length)` shape: `fan_in = dim * length`, `fan_out = length`.
    pub fn new(device: &B::Device, dim: usize, length: usize) -> Self {
        let pos_embed = Initializer::XavierUniform { gain: 1.0 }.init_with(
            [1, dim, length],
            Some(dim * length),
            Some(length),
            device,
        );

        Self { pos_embed }
    }

    /// The positional bias for an axis of `length` samples, shaped `(1, dim, length)`.
    pub fn embedding(&self, length: usize) -> Tensor<B, 3> {
        resize_linear(self.pos_embed.val(), length)
    }

    /// `x` is `(batch, dim, length)`.
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, dim, length] = x.dims();
        x + self.embedding(length).expand([batch, dim, length])
    }
}

/// One direction of the squeeze-axial attention: pooled queries and keys
/// attend along a single spatial axis.
#[derive(Module, Debug)]
struct AxialBranch<B: Backend> {
    pos_emb_q: SqueezeAxialPositionalEmbedding<B>,
    pos_emb_k: SqueezeAxialPositionalEmbedding<B>,
    proj_encode: Conv2dBn<B>,
}

impl<B: Backend> AxialBranch<B> {
    fn new(device: &B::Device, nh_kd: usize, dh: usize) -> Self {
        Self {
            pos_emb_q: SqueezeAxialPositionalEmbedding::new(device, nh_kd, AXIAL_EMBEDDING_LENGTH),
            pos_emb_k: SqueezeAxialPositionalEmbedding::new(device, nh_kd, AXIAL_EMBEDDING_LENGTH),
            proj_encode: Conv2dBn::pointwise(device, dh, dh),
        }
    }

    /// `q`, `k` are `(batch, nh_kd, length)` and `v` is `(batch, dh, length)`.
    /// Returns `(batch, dh, length)`.
    fn forward(
        &self,
        q: Tensor<B, 3>,
        k: Tensor<B, 3>,
        v: Tensor<B, 3>,
        shape: &AttentionShape,
        activation: Activation,
    ) -> Tensor<B, 3> {
        let [batch, _, length] = q.dims();
        let heads = shape.num_heads;

        let q = self
            .pos_emb_q
            .forward(q)
            .reshape([batch, heads, shape.key_dim, length])
            .swap_dims(2, 3);
        let k = self
            .pos_emb_k
            .forward(k)
            .reshape([batch, heads, shape.key_dim, length]);
        let v = v.reshape([batch, heads, shape.d, length]).swap_dims(2, 3);

        let attn = softmax(q.matmul(k).mul_scalar(shape.scale), 3);
        let out = attn
            .matmul(v)
            .swap_dims(2, 3)
            .reshape([batch, shape.dh, length, 1]);

        let out = self.proj_encode.forward(activation.forward(out));
        out.reshape([batch, shape.dh, length])
    }
}

#[derive(Clone, Copy, Debug)]
struct AttentionShape {
    num_heads: usize,
    key_dim: usize,
    d: usize,
    dh: usize,
    scale: f64,
}

/// Squeeze-enhanced axial attention.
///
/// Global context comes from row and column attention over axis-pooled
/// queries and keys, at `O(H^2 + W^2)` cost. It is turned into a hard-sigmoid
/// gate over a locally mixed projection of the same queries, keys and values.
#[derive(Module, Debug)]
pub struct SeaAttention<B: Backend> {
    to_q: Conv2dBn<B>,
    to_k: Conv2dBn<B>,
    to_v: Conv2dBn<B>,
    row: AxialBranch<B>,
    column: AxialBranch<B>,
    proj: Conv2dBn<B>,
    dwconv: Conv2dBn<B>,
    pwconv: Conv2dBn<B>,
    activation: Ignored<Activation>,
    shape: Ignored<AttentionShape>,
}

impl<B: Backend> SeaAttention<B> {
    pub fn new(
        device: &B::Device,
        dim: usize,
        key_dim: usize,
        num_heads: usize,
        attn_ratio: usize,
        activation: Activation,
    ) -> Self {
        let nh_kd = key_dim * num_heads;
        let d = attn_ratio * key_dim;
        let dh = d * num_heads;
        let qkv_channels = 2 * nh_kd + dh;

        let dwconv = Conv2dBnConfig::new([qkv_channels, qkv_channels])
            .with_kernel_size(3)
            .with_padding(1)
            .with_groups(qkv_channels)
            .init(device);

        Self {
            to_q: Conv2dBn::pointwise(device, dim, nh_kd),
            to_k: Conv2dBn::pointwise(device, dim, nh_kd),
            to_v: Conv2dBn::pointwise(device, dim, dh),
            row: AxialBranch::new(device, nh_kd, dh),
            column: AxialBranch::new(device, nh_kd, dh),
            proj: Conv2dBn::pointwise(device, dh, dim),
            dwconv,
            pwconv: Conv2dBn::pointwise(device, qkv_channels, dim),
            activation: Ignored(activation),
            shape: Ignored(AttentionShape {
                num_heads,
                key_dim,
                d,
                dh,
                scale: (key_dim as f64).powf(-0.5),
            }),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, _, height, width] = x.dims();
        let shape = self.shape.0;
        let activation = self.activation.0;
        let nh_kd = shape.num_heads * shape.key_dim;

        let q = self.to_q.forward(x.clone());
        let k = self.to_k.forward(x.clone());
        let v = self.to_v.forward(x);

        let qkv = Tensor::cat(vec![q.clone(), k.clone(), v.clone()], 1);
        let qkv = activation.forward(self.dwconv.forward(qkv));
        let qkv = self.pwconv.forward(qkv);

        let row = self.row.forward(
            q.clone().mean_dim(3).reshape([batch, nh_kd, height]),
            k.clone().mean_dim(3).reshape([batch, nh_kd, height]),
            v.clone().mean_dim(3).reshape([batch, shape.dh, height]),
            &shape,
            activation,
        );
        let column = self.column.forward(
            q.mean_dim(2).reshape([batch, nh_kd, width]),
            k.mean_dim(2).reshape([batch, nh_kd, width]),
            v.clone().mean_dim(2).reshape([batch, shape.dh, width]),
            &shape,
            activation,
        );

        let full = [batch, shape.dh, height, width];
        let row = row.reshape([batch, shape.dh, height, 1]).expand(full);
        let column = column.reshape([batch, shape.dh, 1, width]).expand(full);

        let xx = v + row + column;
        let xx = self.proj.forward(activation.forward(xx));
        h_sigmoid(xx) * qkv
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;

    type TestBackend = crate::InferenceBackend;

    #[test]
    fn positional_embedding_preserves_shape() {
        let device = <TestBackend as Backend>::Device::default();
        let embedding = SqueezeAxialPositionalEmbedding::<TestBackend>::new(&device, 8, 16);

        for length in [1, 7, 16, 40] {
            let input = Tensor::<TestBackend, 3>::zeros([2, 8, length], &device);
            assert_eq!(embedding.forward(input).dims(), [2, 8, length]);
        }
    }

    #[test]
    fn positional_embedding_is_xavier_bounded() {
        let device = <TestBackend as Backend>::Device::default();
        let (dim, length) = (8, AXIAL_EMBEDDING_LENGTH);
        let embedding = SqueezeAxialPositionalEmbedding::<TestBackend>::new(&device, dim, length);

        let bound = (6.0 / (dim * length + length) as f32).sqrt();
        let values = embedding
            .pos_embed
            .val()
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .unwrap();
        assert!(values.iter().all(|value| value.abs() <= bound + 1e-6));
        assert!(values.iter().any(|value| *value != 0.0));
    }

    #[test]
    fn positional_embedding_at_nominal_length_is_the_parameter() {
        let device = <TestBackend as Backend>::Device::default();
        let embedding = SqueezeAxialPositionalEmbedding::<TestBackend>::new(&device, 4, 16);
        let input = Tensor::<TestBackend, 3>::zeros([1, 4, 16], &device);

        let output = embedding.forward(input);
        assert!(output.all_close(embedding.pos_embed.val(), Some(1e-6), Some(1e-6)));
    }

    #[test]
    fn positional_embedding_is_resampled_per_length() {
        let device = <TestBackend as Backend>::Device::default();
        let embedding = SqueezeAxialPositionalEmbedding::<TestBackend>::new(&device, 4, 16);
        let table = embedding.pos_embed.val();

        let short = embedding.embedding(8);
        let long = embedding.embedding(32);
        assert_eq!(short.dims(), [1, 4, 8]);
        assert_eq!(long.dims(), [1, 4, 32]);

        // Halving the length averages neighbouring table entries.
        let pairwise_mean = table
            .clone()
            .reshape([1, 4, 8, 2])
            .mean_dim(3)
            .reshape([1, 4, 8]);
        assert!(short.clone().all_close(pairwise_mean, Some(1e-5), Some(1e-5)));

        let truncated = table.slice([0..1, 0..4, 0..8]);
        assert!(
            !short.all_close(truncated, Some(1e-4), Some(1e-4)),
            "resampling must not reduce to truncation"
        );
    }

    #[test]
    fn sea_attention_preserves_input_shape() {
        let device = <TestBackend as Backend>::Device::default();
        let attention = SeaAttention::<TestBackend>::new(&device, 32, 8, 4, 2, Activation::Relu6);

        for (height, width) in [(8, 8), (5, 11), (1, 9), (7, 1), (1, 1)] {
            let input = Tensor::<TestBackend, 4>::random(
                [2, 32, height, width],
                Distribution::Normal(0.0, 1.0),
                &device,
            );
            let output = attention.forward(input);
            assert_eq!(output.dims(), [2, 32, height, width]);
        }
    }

    #[test]
    fn sea_attention_supports_uneven_attention_ratio() {
        let device = <TestBackend as Backend>::Device::default();
        let attention = SeaAttention::<TestBackend>::new(&device, 24, 4, 2, 3, Activation::Relu);

        let input = Tensor::<TestBackend, 4>::ones([1, 24, 6, 4], &device);
        assert_eq!(attention.forward(input).dims(), [1, 24, 6, 4]);
    }

    #[test]
    fn sea_attention_gate_scales_local_branch() {
        let device = <TestBackend as Backend>::Device::default();
        let attention = SeaAttention::<TestBackend>::new(&device, 16, 4, 2, 2, Activation::Relu6);
        let input = Tensor::<TestBackend, 4>::random(
            [1, 16, 6, 6],
            Distribution::Normal(0.0, 1.0),
            &device,
        );

        let output = attention.forward(input.clone());
        let q = attention.to_q.forward(input.clone());
        let k = attention.to_k.forward(input.clone());
        let v = attention.to_v.forward(input);
        let qkv = Tensor::cat(vec![q, k, v], 1);
        let local = attention
            .pwconv
            .forward(Activation::Relu6.forward(attention.dwconv.forward(qkv)));

        // The gate lies in [0, 1] and the local branch is non-negative.
        let excess = (output.clone() - local.clone()).max().into_scalar().elem::<f32>();
        assert!(excess <= 1e-5, "gated output exceeded local branch by {excess}");
        let min = output.min().into_scalar().elem::<f32>();
        assert!(min >= 0.0);
    }
}
