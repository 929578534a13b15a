use candle_core::Tensor;
use candle_nn::{Linear, Module, VarBuilder};

use crate::config::LanguageTokenizerConfig;
use crate::errors::{invalid_input, unsupported, Result, TokenizerError};
use crate::TensorDict;

/// Task key holding the language instruction (embeddings or encoder inputs).
pub const LANGUAGE_KEY: &str = "language_instruction";

/// Pretrained text model turning an instruction into `[batch, tokens, d]`
/// embeddings. Supplied by the caller; the tokenizer never loads one.
pub trait TextEncoder: Send + Sync {
    fn encode(&self, instruction: &Tensor) -> Result<Tensor>;

    /// Width of the produced embeddings.
    fn output_dim(&self) -> usize;
}

/// Embeds the task's language instruction, optionally through a text
/// encoder and a bias-free projection.
pub struct LanguageTokenizer {
    config: LanguageTokenizerConfig,
    encoder: Option<Box<dyn TextEncoder>>,
    projection: Option<Linear>,
}

impl std::fmt::Debug for LanguageTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageTokenizer")
            .field("config", &self.config)
            .field("text_encoder", &self.encoder.is_some())
            .finish()
    }
}

fn build_projection(config: &LanguageTokenizerConfig, input_dim: Option<usize>, vb: VarBuilder) -> Result<Option<Linear>> {
    match (config.projection_dim, input_dim) {
        (None, _) => Ok(None),
        (Some(out), Some(input)) => Ok(Some(candle_nn::linear_no_bias(input, out, vb.pp("projection"))?)),
        (Some(_), None) => Err(unsupported(
            "language projection needs the width of the instruction embeddings",
        )),
    }
}

impl LanguageTokenizer {
    /// Uses `tasks["language_instruction"]` as precomputed embeddings of
    /// width `input_dim` (only needed when projecting).
    pub fn new(config: LanguageTokenizerConfig, input_dim: Option<usize>, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let projection = build_projection(&config, input_dim, vb)?;
        Ok(Self {
            config,
            encoder: None,
            projection,
        })
    }

    /// Runs `encoder` on the instruction; its outputs are detached from the
    /// gradient graph.
    pub fn with_text_encoder(config: LanguageTokenizerConfig, encoder: Box<dyn TextEncoder>, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let projection = build_projection(&config, Some(encoder.output_dim()), vb)?;
        Ok(Self {
            config,
            encoder: Some(encoder),
            projection,
        })
    }

    pub fn config(&self) -> &LanguageTokenizerConfig {
        &self.config
    }

    pub fn tokenize(&self, tasks: &TensorDict) -> Result<Tensor> {
        let instruction = tasks
            .get(LANGUAGE_KEY)
            .ok_or_else(|| TokenizerError::MissingKey(LANGUAGE_KEY.to_string()))?;

        let tokens = match &self.encoder {
            Some(encoder) => encoder.encode(instruction)?.detach(),
            None => match instruction.rank() {
                2 => instruction.unsqueeze(1)?,
                3 => instruction.clone(),
                rank => {
                    return Err(invalid_input(format!(
                        "language embeddings must be rank 2 or 3, got rank {rank}"
                    )))
                }
            },
        };

        match &self.projection {
            Some(projection) => Ok(projection.forward(&tokens)?),
            None => Ok(tokens),
        }
    }
}
