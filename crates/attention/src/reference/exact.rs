//! Reference CPU-friendly attention kernel.
//!
//! The exact path prioritises numerical fidelity and mirrors the semantics
//! described by the [`Attention`](crate::core::Attention) trait. Hidden keys
//! are filled with [`MASKED_SCORE`] before the softmax and the resulting
//! weights are multiplied by the visibility mask afterwards, so hidden keys
//! contribute exactly zero and rows without any visible key produce zeros.

use std::sync::OnceLock;

use candle_core::{DType, Device, Tensor};
use candle_nn::ops::softmax_last_dim;

use crate::core::{Attention, AttentionError, Config};
use crate::dropout::DropoutStream;
use crate::masks::{MASKED_SCORE, MASK_DTYPE};

/// Numerically stable, portable attention kernel.
#[derive(Debug, Default)]
pub struct ExactAttention {
    first_call: OnceLock<()>,
}

impl ExactAttention {
    /// Construct a reference attention kernel.
    pub fn new() -> Self {
        Self {
            first_call: OnceLock::new(),
        }
    }
}

fn validate_mask(
    mask: &Tensor,
    device: &Device,
    batch: usize,
    heads: usize,
    q_len: usize,
    k_len: usize,
) -> Result<Tensor, AttentionError> {
    if !device.same_device(mask.device()) {
        return Err(AttentionError::InvalidShape {
            context: "mask must reside on the same device as q".to_string(),
        });
    }
    if mask.dtype() != MASK_DTYPE {
        return Err(AttentionError::UnsupportedDType {
            requested: format!(
                "mask expects dtype {MASK_DTYPE:?}, got {:?}",
                mask.dtype()
            ),
        });
    }
    let (mb, mh, mq, mk) = mask.dims4().map_err(|_| AttentionError::InvalidShape {
        context: "mask must have shape [batch, heads|1, q_len, k_len]".to_string(),
    })?;
    if mb != batch || mq != q_len || mk != k_len {
        return Err(AttentionError::InvalidShape {
            context: format!(
                "mask shape mismatch: expected [{batch}, 1|{heads}, {q_len}, {k_len}] got [{mb}, {mh}, {mq}, {mk}]"
            ),
        });
    }
    if mh != 1 && mh != heads {
        return Err(AttentionError::InvalidShape {
            context: format!("mask head dimension must be 1 or {heads}, got {mh}"),
        });
    }
    if mh == heads {
        Ok(mask.clone())
    } else {
        Ok(mask
            .broadcast_as((batch, heads, q_len, k_len))?
            .contiguous()?)
    }
}

impl Attention for ExactAttention {
    fn attend(
        &self,
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
        mask: Option<&Tensor>,
        dropout: Option<&DropoutStream>,
        config: &Config,
    ) -> Result<Tensor, AttentionError> {
        if self.first_call.set(()).is_ok() {
            log::debug!(
                "attention::reference init dropout_p={:?} masked={}",
                config.dropout_p,
                mask.is_some()
            );
        }

        let device = q.device();
        if !device.same_device(k.device()) || !device.same_device(v.device()) {
            return Err(AttentionError::InvalidShape {
                context: "q, k, v must reside on the same device".to_string(),
            });
        }

        let dtype = q.dtype();
        if dtype != k.dtype() || dtype != v.dtype() {
            return Err(AttentionError::InvalidShape {
                context: "q, k, v must share the same dtype".to_string(),
            });
        }

        if !matches!(dtype, DType::F32 | DType::F16 | DType::BF16) {
            return Err(AttentionError::UnsupportedDType {
                requested: format!("{dtype:?}"),
            });
        }

        let (batch, heads, q_len, head_dim) =
            q.dims4().map_err(|_| AttentionError::InvalidShape {
                context: "q must have shape [batch, heads, seq_len, head_dim]".to_string(),
            })?;
        let (kb, kh, k_len, kd) = k.dims4().map_err(|_| AttentionError::InvalidShape {
            context: "k must have shape [batch, heads, seq_len, head_dim]".to_string(),
        })?;
        let (vb, vh, vk, vd) = v.dims4().map_err(|_| AttentionError::InvalidShape {
            context: "v must have shape [batch, heads, seq_len, head_dim]".to_string(),
        })?;

        if kb != batch || kh != heads || kd != head_dim {
            return Err(AttentionError::InvalidShape {
                context: format!(
                    "k shape mismatch: expected [{batch}, {heads}, ?, {head_dim}] got [{kb}, {kh}, {k_len}, {kd}]"
                ),
            });
        }
        if vb != batch || vh != heads || vk != k_len || vd != head_dim {
            return Err(AttentionError::InvalidShape {
                context: format!(
                    "v shape mismatch: expected [{batch}, {heads}, {k_len}, {head_dim}] got [{vb}, {vh}, {vk}, {vd}]"
                ),
            });
        }

        let dropout_p = config.effective_dropout();
        if !(0.0..1.0).contains(&dropout_p) {
            return Err(AttentionError::InvalidShape {
                context: format!("dropout probability must be in [0, 1), got {dropout_p}"),
            });
        }

        let visible = mask
            .map(|mask| validate_mask(mask, device, batch, heads, q_len, k_len))
            .transpose()?;

        let merged = batch * heads;
        let q_view = q.to_dtype(DType::F32)?.contiguous()?.reshape((merged, q_len, head_dim))?;
        let k_view = k.to_dtype(DType::F32)?.contiguous()?.reshape((merged, k_len, head_dim))?;
        let v_view = v.to_dtype(DType::F32)?.contiguous()?.reshape((merged, k_len, head_dim))?;

        let scale = 1.0 / (head_dim as f64).sqrt();
        let scores = q_view
            .matmul(&k_view.t()?)?
            .affine(scale, 0.0)?
            .reshape((batch, heads, q_len, k_len))?;

        let scores = match &visible {
            Some(visible) => {
                let fill = Tensor::full(MASKED_SCORE, (batch, heads, q_len, k_len), device)?;
                visible.where_cond(&scores, &fill)?
            }
            None => scores,
        };

        let probs = softmax_last_dim(&scores.reshape((merged, q_len, k_len))?)?
            .reshape((batch, heads, q_len, k_len))?;
        let probs = match &visible {
            Some(visible) => probs.mul(&visible.to_dtype(DType::F32)?)?,
            None => probs,
        };

        let probs = match dropout {
            Some(stream) if dropout_p > 0.0 => {
                if stream.seq_len() != q_len || stream.seq_len() != k_len {
                    return Err(AttentionError::InvalidShape {
                        context: format!(
                            "dropout stream covers {} tokens, attention is {q_len}x{k_len}",
                            stream.seq_len()
                        ),
                    });
                }
                let keep = stream.pair_keep_mask(batch, heads, dropout_p, device)?;
                probs.mul(&keep)?
            }
            _ => probs,
        };

        let output = probs
            .reshape((merged, q_len, k_len))?
            .matmul(&v_view)?
            .reshape((batch, heads, q_len, head_dim))?;

        Ok(output.to_dtype(dtype)?)
    }
}
