//! Mask utilities shared by attention implementations.
//!
//! All masks handled here are boolean visibility tensors with dtype `u8`,
//! shaped `[batch, num_heads, q_len, k_len]` (or `[batch, 1, q_len, k_len]`
//! before head broadcasting). A value of `1` lets the query read the key and
//! `0` hides it.

pub mod padding;

use candle_core::{DType, Result, Tensor};

/// Dtype shared by all boolean masks.
pub const MASK_DTYPE: DType = DType::U8;

/// Score written into hidden positions before the softmax.
///
/// Finite so that rows with no visible key stay NaN-free; those rows are
/// zeroed after the softmax.
pub const MASKED_SCORE: f32 = f32::MIN;

pub use padding::key_padding_mask;

/// Logical AND of two boolean masks with broadcasting.
pub fn mask_and(lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
    lhs.to_dtype(MASK_DTYPE)?
        .broadcast_mul(&rhs.to_dtype(MASK_DTYPE)?)
}

/// Broadcasts a `[batch, 1, q_len, k_len]` mask to `num_heads` heads and
/// materialises it.
pub fn broadcast_to_heads(mask: &Tensor, num_heads: usize) -> Result<Tensor> {
    let (batch, _, q_len, k_len) = mask.dims4()?;
    mask.broadcast_as((batch, num_heads, q_len, k_len))?
        .contiguous()
}

#[cfg(test)]
mod tests;
