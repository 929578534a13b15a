use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{unsupported, Result, TokenizerError};
use crate::matcher::KeyMatcher;

/// Configuration of one modality tokenizer, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TokenizerConfig {
    Image(ImageTokenizerConfig),
    Language(LanguageTokenizerConfig),
    Bin(BinTokenizerConfig),
}

impl TokenizerConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            TokenizerConfig::Image(_) => "image",
            TokenizerConfig::Language(_) => "language",
            TokenizerConfig::Bin(_) => "bin",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            TokenizerConfig::Image(cfg) => cfg.validate(),
            TokenizerConfig::Language(cfg) => cfg.validate(),
            TokenizerConfig::Bin(cfg) => cfg.validate(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenLearnerConfig {
    pub bottleneck_dim: usize,
    pub dropout_rate: f32,
}

impl Default for TokenLearnerConfig {
    fn default() -> Self {
        Self {
            bottleneck_dim: 128,
            dropout_rate: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageTokenizerConfig {
    /// Fuse cameras and task images channel-wise before encoding. When
    /// false, each image is encoded separately and a TokenLearner reduces
    /// the result.
    pub early_fusion: bool,
    pub num_tokens: usize,
    /// Patterns selecting spatial observation inputs.
    pub obs_stack_keys: Vec<String>,
    /// Patterns selecting spatial task inputs (goal images).
    pub task_stack_keys: Vec<String>,
    /// Patterns selecting non-spatial task inputs used as FiLM conditioning.
    pub task_film_keys: Vec<String>,
    pub token_learner: TokenLearnerConfig,
}

impl Default for ImageTokenizerConfig {
    fn default() -> Self {
        Self {
            early_fusion: true,
            num_tokens: 8,
            obs_stack_keys: vec!["image_.*".to_string(), "depth_.*".to_string()],
            task_stack_keys: Vec::new(),
            task_film_keys: Vec::new(),
            token_learner: TokenLearnerConfig::default(),
        }
    }
}

impl ImageTokenizerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_tokens == 0 {
            return Err(unsupported("image tokenizer num_tokens must be greater than zero"));
        }
        if self.obs_stack_keys.is_empty() {
            return Err(unsupported("image tokenizer needs at least one observation key"));
        }
        if !self.early_fusion {
            if self.token_learner.bottleneck_dim == 0 {
                return Err(unsupported("token learner bottleneck_dim must be greater than zero"));
            }
            if !(0.0..1.0).contains(&self.token_learner.dropout_rate) {
                return Err(unsupported("token learner dropout_rate must be in [0, 1)"));
            }
        }
        for keys in [&self.obs_stack_keys, &self.task_stack_keys, &self.task_film_keys] {
            KeyMatcher::new(keys)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageTokenizerConfig {
    /// Expected number of output tokens; informational, not enforced.
    pub num_tokens: usize,
    pub projection_dim: Option<usize>,
}

impl Default for LanguageTokenizerConfig {
    fn default() -> Self {
        Self {
            num_tokens: 1,
            projection_dim: None,
        }
    }
}

impl LanguageTokenizerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.projection_dim == Some(0) {
            return Err(unsupported("language projection_dim must be greater than zero"));
        }
        Ok(())
    }
}

/// How bin thresholds are spread over the value range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BinType {
    #[default]
    Uniform,
    /// Quantiles of the standard normal distribution.
    Normal,
}

impl FromStr for BinType {
    type Err = TokenizerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "uniform" => Ok(BinType::Uniform),
            "normal" => Ok(BinType::Normal),
            other => Err(unsupported(format!(
                "binning type `{other}` is not supported by the bin tokenizer"
            ))),
        }
    }
}

impl TryFrom<String> for BinType {
    type Error = TokenizerError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<BinType> for String {
    fn from(value: BinType) -> Self {
        value.to_string()
    }
}

impl fmt::Display for BinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinType::Uniform => f.write_str("uniform"),
            BinType::Normal => f.write_str("normal"),
        }
    }
}

fn default_bin_key() -> String {
    "action".to_string()
}

fn default_high() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinTokenizerConfig {
    pub n_bins: usize,
    #[serde(default)]
    pub bin_type: BinType,
    #[serde(default)]
    pub low: f32,
    #[serde(default = "default_high")]
    pub high: f32,
    /// Input consumed when dispatched through a modality tokenizer.
    #[serde(default = "default_bin_key")]
    pub key: String,
}

impl BinTokenizerConfig {
    pub fn new(n_bins: usize, bin_type: BinType) -> Self {
        Self {
            n_bins,
            bin_type,
            low: 0.0,
            high: default_high(),
            key: default_bin_key(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_bins == 0 {
            return Err(unsupported("bin tokenizer n_bins must be greater than zero"));
        }
        if self.bin_type == BinType::Uniform && self.low >= self.high {
            return Err(unsupported(format!(
                "uniform bins need low < high, got [{}, {}]",
                self.low, self.high
            )));
        }
        Ok(())
    }
}
