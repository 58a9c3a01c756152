use thiserror::Error;

/// Main error type for pagewatch operations
#[derive(Error, Debug)]
pub enum PagewatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("URL list error: {0}")]
    UrlList(String),

    #[error("State store error: {0}")]
    Store(String),

    #[error("Notification failed: {0}")]
    Notification(String),
}

pub type Result<T> = std::result::Result<T, PagewatchError>;
