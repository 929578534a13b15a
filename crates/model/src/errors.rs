//! Error types for token groups and the block transformer.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BlockTransformerError>;

/// Raised when a token group is constructed from a tensor of the wrong rank.
#[derive(Debug, Error)]
pub enum GroupError {
    #[error("{kind} group `{name}` expects rank-{expected} tokens, got shape {shape:?}")]
    Shape {
        name: String,
        kind: &'static str,
        expected: usize,
        shape: Vec<usize>,
    },
}

#[derive(Debug, Error)]
pub enum BlockTransformerError {
    /// Inputs to a forward call disagree with each other.
    #[error("precondition violated: {0}")]
    Precondition(String),

    #[error(transparent)]
    Group(#[from] GroupError),

    #[error("invalid configuration: {}", .0.join("; "))]
    Config(Vec<String>),

    #[error("attention failed: {0}")]
    Attention(#[from] attention::AttentionError),

    #[error("tensor backend error: {0}")]
    Backend(#[from] candle_core::Error),
}

impl BlockTransformerError {
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }
}
