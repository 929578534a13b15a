//! Configuration options shared by all attention implementations.
//!
//! The [`Config`] struct captures run-time knobs such as dropout that callers
//! can tune without swapping implementations.

/// Configuration driving attention behaviour.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    /// Probability for dropout applied to attention weights during training.
    ///
    /// When `None`, dropout is disabled and the computation is deterministic.
    /// Dropout is only ever applied when the caller also supplies a
    /// [`DropoutStream`](crate::dropout::DropoutStream).
    pub dropout_p: Option<f32>,
}

impl Config {
    /// Configuration with the given attention-weight dropout probability.
    pub fn with_dropout(dropout_p: f32) -> Self {
        Self {
            dropout_p: Some(dropout_p),
        }
    }

    /// Returns the effective dropout probability, treating `None` as zero.
    pub fn effective_dropout(&self) -> f32 {
        self.dropout_p.unwrap_or(0.0)
    }
}
