use candle_core::Tensor;
use candle_nn::VarBuilder;

use crate::bin::BinTokenizer;
use crate::config::TokenizerConfig;
use crate::errors::{unsupported, Result, TokenizerError};
use crate::image::{ImageTokenizer, VisualEncoder};
use crate::language::{LanguageTokenizer, TextEncoder};
use crate::TensorDict;

/// Pretrained collaborators a tokenizer may need.
#[derive(Default)]
pub struct Encoders {
    pub visual: Option<Box<dyn VisualEncoder>>,
    pub text: Option<Box<dyn TextEncoder>>,
    /// Width of precomputed language embeddings when no text encoder is set.
    pub language_dim: Option<usize>,
}

/// One tokenizer per modality, chosen by [`TokenizerConfig`].
#[derive(Debug)]
pub enum ModalityTokenizer {
    Image(ImageTokenizer),
    Language(LanguageTokenizer),
    Bin(BinTokenizer),
}

impl ModalityTokenizer {
    pub fn new(config: TokenizerConfig, encoders: Encoders, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        log::debug!("building {} tokenizer", config.kind());
        match config {
            TokenizerConfig::Image(cfg) => {
                let encoder = encoders
                    .visual
                    .ok_or_else(|| unsupported("image tokenizer requires a visual encoder"))?;
                Ok(Self::Image(ImageTokenizer::new(cfg, encoder, vb)?))
            }
            TokenizerConfig::Language(cfg) => match encoders.text {
                Some(text) => Ok(Self::Language(LanguageTokenizer::with_text_encoder(cfg, text, vb)?)),
                None => Ok(Self::Language(LanguageTokenizer::new(cfg, encoders.language_dim, vb)?)),
            },
            TokenizerConfig::Bin(cfg) => Ok(Self::Bin(BinTokenizer::new(cfg)?)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ModalityTokenizer::Image(_) => "image",
            ModalityTokenizer::Language(_) => "language",
            ModalityTokenizer::Bin(_) => "bin",
        }
    }

    /// Tokenizes the inputs this tokenizer is configured for. Bin tokenizers
    /// read their key from the observations first, then from the tasks.
    pub fn tokenize(&self, observations: &TensorDict, tasks: Option<&TensorDict>, train: bool) -> Result<Tensor> {
        match self {
            ModalityTokenizer::Image(tokenizer) => tokenizer.tokenize(observations, tasks, train),
            ModalityTokenizer::Language(tokenizer) => {
                let tasks = tasks.ok_or_else(|| {
                    TokenizerError::MissingKey(crate::language::LANGUAGE_KEY.to_string())
                })?;
                tokenizer.tokenize(tasks)
            }
            ModalityTokenizer::Bin(tokenizer) => {
                let key = &tokenizer.config().key;
                let inputs = observations
                    .get(key)
                    .or_else(|| tasks.and_then(|tasks| tasks.get(key)))
                    .ok_or_else(|| TokenizerError::MissingKey(key.clone()))?;
                tokenizer.encode(inputs)
            }
        }
    }
}
