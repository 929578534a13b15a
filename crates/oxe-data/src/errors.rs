use thiserror::Error;

pub type Result<T> = std::result::Result<T, MixtureError>;

#[derive(Error, Debug)]
pub enum MixtureError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse {0}")]
    Format(String),

    #[error("invalid mixture configuration: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("dataset `{0}` is not registered")]
    UnknownDataset(String),

    #[error("unknown dataset mixture `{0}`")]
    UnknownMix(String),
}

impl From<toml::de::Error> for MixtureError {
    fn from(value: toml::de::Error) -> Self {
        MixtureError::Format(value.to_string())
    }
}

impl From<serde_json::Error> for MixtureError {
    fn from(value: serde_json::Error) -> Self {
        MixtureError::Format(value.to_string())
    }
}
