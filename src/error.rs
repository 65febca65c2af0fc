//! Error types and result alias for the DefectDojo integration.

use thiserror::Error;

/// Crate result type alias
pub type Result<T> = std::result::Result<T, DojoError>;

/// Errors raised while talking to DefectDojo or preparing a request
#[derive(Error, Debug)]
pub enum DojoError {
    /// Configuration error (missing host or key, malformed URL, bad option combination)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authentication or connectivity failure while establishing the connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// A name-or-ID reference could not be resolved
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// Test creation was rejected
    #[error("Test creation failed: {0}")]
    Creation(String),

    /// Report upload was rejected or could not be sent
    #[error("Upload failed{}: {message}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Upload {
        status: Option<u16>,
        message: String,
    },

    /// Non-success response from an API endpoint
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Transport-level failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML config file error
    #[error("Config file error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
