use std::io;

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("failed to extract tables: {0}")]
    Pdf(String),
    #[error("{0}")]
    Config(String),
    #[error("address not cached: {0}")]
    KeyNotFound(String),
    #[error("geocoding quota exceeded")]
    QuotaExceeded,
    #[error("geocoding failed for {address:?}: {status}")]
    ResolutionFailed { address: String, status: String },
}

impl AppError {
    /// Quota exhaustion halts the whole batch; every other error is row-scoped.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, AppError::QuotaExceeded)
    }
}
