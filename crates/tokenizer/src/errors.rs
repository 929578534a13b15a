use thiserror::Error;

pub type Result<T> = std::result::Result<T, TokenizerError>;

#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("missing input `{0}`")]
    MissingKey(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid key pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("tensor backend error: {0}")]
    Backend(#[from] candle_core::Error),
}

pub(crate) fn invalid_input<S: Into<String>>(msg: S) -> TokenizerError {
    TokenizerError::InvalidInput(msg.into())
}

pub(crate) fn unsupported<S: Into<String>>(msg: S) -> TokenizerError {
    TokenizerError::UnsupportedConfiguration(msg.into())
}
