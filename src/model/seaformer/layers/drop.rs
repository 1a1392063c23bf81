use burn::{prelude::*, tensor::Distribution};

/// Whether stochastic regularizers are active for a forward pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ForwardMode {
    Training,
    #[default]
    Inference,
}

impl ForwardMode {
    pub fn is_training(self) -> bool {
        matches!(self, Self::Training)
    }
}

/// Stochastic depth over the residual branch of a block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DropPath {
    Identity,
    Stochastic { drop_prob: f64 },
}

impl DropPath {
    pub fn new(drop_prob: f64) -> Self {
        if drop_prob > 0.0 {
            Self::Stochastic {
                drop_prob: drop_prob.min(1.0),
            }
        } else {
            Self::Identity
        }
    }

    pub fn drop_prob(&self) -> f64 {
        match self {
            Self::Identity => 0.0,
            Self::Stochastic { drop_prob } => *drop_prob,
        }
    }

    /// Zeroes whole samples with probability `drop_prob` and rescales the kept
    /// ones by `1 / (1 - drop_prob)`.
    pub fn forward<B: Backend, const D: usize>(
        &self,
        x: Tensor<B, D>,
        mode: ForwardMode,
    ) -> Tensor<B, D> {
        let drop_prob = match self {
            Self::Stochastic { drop_prob } if mode.is_training() => *drop_prob,
            _ => return x,
        };
        if drop_prob >= 1.0 {
            return x.zeros_like();
        }

        let keep_prob = 1.0 - drop_prob;
        let mut mask_shape = [1usize; D];
        mask_shape[0] = x.dims()[0];
        let mask = Tensor::<B, D>::random(
            mask_shape,
            Distribution::Bernoulli(keep_prob),
            &x.device(),
        )
        .expand(x.shape());

        x.div_scalar(keep_prob).mul(mask)
    }
}

/// Element-wise dropout with rate `prob`, active only in [`ForwardMode::Training`].
pub(crate) fn dropout<B: Backend, const D: usize>(
    prob: f64,
    x: Tensor<B, D>,
    mode: ForwardMode,
) -> Tensor<B, D> {
    if !mode.is_training() || prob <= 0.0 {
        return x;
    }
    if prob >= 1.0 {
        return x.zeros_like();
    }

    let keep_prob = 1.0 - prob;
    let mask = Tensor::<B, D>::random(
        x.shape(),
        Distribution::Bernoulli(keep_prob),
        &x.device(),
    );
    x.div_scalar(keep_prob).mul(mask)
}
