//! Masked exact attention primitives for block-structured transformers.
//!
//! The crate defines a portable API for computing multi-head self-attention
//! over tensors with layout `[batch, n_heads, seq_len, head_dim]`. The inputs
//! `Q`, `K`, and `V` share the same layout and dtype (bf16, f16, or f32).
//! Reductions are performed internally in `f32`, and the output tensor matches
//! the input dtype and shape.
//!
//! Masks are boolean (`u8`) visibility tensors rather than causal-only
//! builders: every query row states exactly which keys it may read, so
//! arbitrary group-structured patterns can be expressed. A key that is not
//! visible receives an attention weight of exactly zero, and a query with no
//! visible key produces a zero vector instead of a uniform average.
//!
//! Dropout is an optional, train-only concern. It is driven by a
//! [`dropout::DropoutStream`] whose randomness is keyed by token identity
//! rather than by flat sequence position.

pub mod core;
pub mod dropout;
pub mod masks;
pub mod reference;

pub use core::{Attention, AttentionError, Config};
pub use dropout::DropoutStream;
