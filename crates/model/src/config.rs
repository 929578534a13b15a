use serde::Deserialize;

use crate::errors::{BlockTransformerError, Result};

/// Hyperparameters of the default transformer encoder.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BlockTransformerConfig {
    pub num_layers: usize,
    pub mlp_dim: usize,
    pub num_attention_heads: usize,
    pub dropout_rate: f32,
    pub attention_dropout_rate: f32,
}

impl Default for BlockTransformerConfig {
    fn default() -> Self {
        Self {
            num_layers: 4,
            mlp_dim: 1024,
            num_attention_heads: 8,
            dropout_rate: 0.1,
            attention_dropout_rate: 0.1,
        }
    }
}

impl BlockTransformerConfig {
    /// Checks every field and reports all violations at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        if self.num_layers == 0 {
            errors.push("num_layers must be greater than zero".to_string());
        }
        if self.mlp_dim == 0 {
            errors.push("mlp_dim must be greater than zero".to_string());
        }
        if self.num_attention_heads == 0 {
            errors.push("num_attention_heads must be greater than zero".to_string());
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            errors.push(format!(
                "dropout_rate must be in [0, 1), got {}",
                self.dropout_rate
            ));
        }
        if !(0.0..1.0).contains(&self.attention_dropout_rate) {
            errors.push(format!(
                "attention_dropout_rate must be in [0, 1), got {}",
                self.attention_dropout_rate
            ));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(BlockTransformerError::Config(errors))
        }
    }

    /// Checks that an embedding width splits evenly across the heads.
    pub fn validate_width(&self, embed_dim: usize) -> Result<()> {
        self.validate()?;
        if embed_dim == 0 || embed_dim % self.num_attention_heads != 0 {
            return Err(BlockTransformerError::Config(vec![format!(
                "embedding width {embed_dim} is not divisible by {} attention heads",
                self.num_attention_heads
            )]));
        }
        Ok(())
    }

    pub fn head_dim(&self, embed_dim: usize) -> usize {
        embed_dim / self.num_attention_heads.max(1)
    }
}
