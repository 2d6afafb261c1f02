//! Error types for fleetcheck

use thiserror::Error;

/// Main error type for fleetcheck
#[derive(Error, Debug)]
pub enum FleetcheckError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Inventory error: {0}")]
    InventoryError(String),

    #[error("Render error: {0}")]
    RenderError(String),

    #[error("Transfer error: {0}")]
    TransferError(String),

    #[error("Not supported: {0}")]
    Unsupported(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for FleetcheckError {
    fn from(err: anyhow::Error) -> Self {
        FleetcheckError::Internal(err.to_string())
    }
}
