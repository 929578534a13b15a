//! Builders for padding masks used to drop padded keys.
//!
//! All padding masks share the dtype and layout described in
//! [`super::MASK_DTYPE`](super::MASK_DTYPE).

use candle_core::{Result, Tensor};

use super::{broadcast_to_heads, MASK_DTYPE};

/// Expands per-key validity flags into a full visibility mask.
///
/// `key_valid` is shaped `[batch, k_len]` with non-zero entries marking keys
/// that may be attended to. The result is `[batch, num_heads, q_len, k_len]`:
/// every query row repeats the same key validity, so padded keys are hidden
/// from all queries while padded queries are left untouched.
pub fn key_padding_mask(key_valid: &Tensor, num_heads: usize, q_len: usize) -> Result<Tensor> {
    let (batch, k_len) = key_valid.dims2()?;
    let valid = key_valid.ne(&key_valid.zeros_like()?)?.to_dtype(MASK_DTYPE)?;
    let rows = valid
        .reshape((batch, 1, 1, k_len))?
        .broadcast_as((batch, 1, q_len, k_len))?;
    broadcast_to_heads(&rows, num_heads)
}
