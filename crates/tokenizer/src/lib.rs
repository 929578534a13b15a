//! Observation and task tokenizers.
//!
//! Each modality has one tokenizer type and one configuration variant:
//! images ([`image::ImageTokenizer`]), language instructions
//! ([`language::LanguageTokenizer`]) and binned continuous values
//! ([`bin::BinTokenizer`]). [`ModalityTokenizer`] dispatches over the closed
//! set. Inputs are passed as [`TensorDict`]s keyed by field name; which
//! fields a tokenizer reads is decided by ordered regex patterns compiled
//! into a [`KeyMatcher`].
//!
//! Pretrained visual and text encoders are supplied by the caller through
//! the [`VisualEncoder`] and [`TextEncoder`] traits.

use std::collections::BTreeMap;

use candle_core::Tensor;

pub mod bin;
pub mod config;
pub mod errors;
pub mod image;
pub mod language;
pub mod matcher;
pub mod modality;
pub mod token_learner;

pub use bin::BinTokenizer;
pub use config::{
    BinTokenizerConfig, BinType, ImageTokenizerConfig, LanguageTokenizerConfig, TokenLearnerConfig,
    TokenizerConfig,
};
pub use errors::{Result, TokenizerError};
pub use image::{ImageTokenizer, VisualEncoder};
pub use language::{LanguageTokenizer, TextEncoder};
pub use matcher::KeyMatcher;
pub use modality::{Encoders, ModalityTokenizer};
pub use token_learner::TokenLearner;

/// Named input tensors, iterated in key order.
pub type TensorDict = BTreeMap<String, Tensor>;
