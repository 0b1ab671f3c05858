//! Classbook error type.

/// Errors surfaced by the core crate and propagated by the others.
#[derive(Debug, thiserror::Error)]
pub enum ClassbookError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Driver error: {0}")]
    Driver(String),
}

pub type Result<T> = std::result::Result<T, ClassbookError>;
