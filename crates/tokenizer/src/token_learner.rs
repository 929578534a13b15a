use candle_core::Tensor;
use candle_nn::ops::softmax_last_dim;
use candle_nn::{Dropout, LayerNorm, Linear, Module, VarBuilder};

use crate::config::TokenLearnerConfig;
use crate::errors::{invalid_input, Result};

/// Reduces a variable number of input tokens to `num_tokens` learned
/// weighted averages.
#[derive(Debug)]
pub struct TokenLearner {
    num_tokens: usize,
    norm: LayerNorm,
    hidden: Linear,
    out: Linear,
    dropout: Dropout,
}

impl TokenLearner {
    pub fn new(num_tokens: usize, embed_dim: usize, config: &TokenLearnerConfig, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            num_tokens,
            norm: candle_nn::layer_norm(embed_dim, 1e-6, vb.pp("layer_norm"))?,
            hidden: candle_nn::linear(embed_dim, config.bottleneck_dim, vb.pp("mlp").pp("dense_in"))?,
            out: candle_nn::linear(config.bottleneck_dim, num_tokens, vb.pp("mlp").pp("dense_out"))?,
            dropout: Dropout::new(config.dropout_rate),
        })
    }

    pub fn num_tokens(&self) -> usize {
        self.num_tokens
    }

    /// Accepts `[batch, n, d]` or `[batch, t, n, d]` and returns the same
    /// layout with `n` replaced by `num_tokens`.
    pub fn forward(&self, inputs: &Tensor, train: bool) -> Result<Tensor> {
        let (flat, restore) = match inputs.dims() {
            &[b, n, d] => (inputs.clone(), (b, None, n, d)),
            &[b, t, n, d] => (inputs.reshape((b * t, n, d))?, (b, Some(t), n, d)),
            dims => {
                return Err(invalid_input(format!(
                    "token learner expects rank-3 or rank-4 tokens, got {dims:?}"
                )))
            }
        };

        let x = self.norm.forward(&flat)?;
        let x = self.hidden.forward(&x)?.gelu()?;
        let x = self.dropout.forward(&x, train)?;
        let x = self.out.forward(&x)?;
        let x = self.dropout.forward(&x, train)?;

        // [B, n, num_tokens] -> attention over the n inputs per output token
        let weights = softmax_last_dim(&x.transpose(1, 2)?.contiguous()?)?;
        let pooled = weights.matmul(&flat.contiguous()?)?;

        let (b, t, _, d) = restore;
        Ok(match t {
            Some(t) => pooled.reshape((b, t, self.num_tokens, d))?,
            None => pooled,
        })
    }
}
