// src/error.rs

use reqwest::Error as ReqwestError;
use serde_json::Error as SerdeError;
use std::io;
use thiserror::Error;

/// Custom error types for the application
#[derive(Error, Debug)]
pub enum AppError {
    /// Request text is not a usable link
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// User has no quota left in the current window
    #[error("Quota exceeded, resets in {seconds_until_reset} seconds")]
    QuotaExceeded { seconds_until_reset: u64 },

    /// Feature is reserved for VIP users
    #[error("VIP required: {0}")]
    VipRequired(String),

    /// External downloader reported a failure
    #[error("Download failed: {0}")]
    DownloadFailure(String),

    /// External audio converter reported a failure
    #[error("Conversion failed: {0}")]
    ConversionFailure(String),

    /// The scoped working directory could not be allocated
    #[error("Workspace unavailable: {0}")]
    WorkspaceUnavailable(#[source] io::Error),

    /// Chat transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O related errors
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    HttpError(#[from] ReqwestError),

    /// JSON parsing errors
    #[error("JSON parsing error: {0}")]
    JsonError(#[from] SerdeError),

    /// Invalid startup configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// General application errors
    #[error("Application error: {0}")]
    General(String),
}

impl AppError {
    /// Whether the error signals resource exhaustion of the host rather than
    /// a problem with a single request.
    pub fn is_degradation(&self) -> bool {
        matches!(self, AppError::WorkspaceUnavailable(_))
    }
}

/// Convert a string error to AppError::General
impl From<String> for AppError {
    fn from(error: String) -> Self {
        AppError::General(error)
    }
}

/// Convert a &str error to AppError::General
impl From<&str> for AppError {
    fn from(error: &str) -> Self {
        AppError::General(error.to_string())
    }
}
