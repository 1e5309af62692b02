use thiserror::Error;

#[derive(Error, Debug)]
pub enum DictionaryError {
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DictionaryError>;
