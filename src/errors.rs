//! Error types for the update engine

use thiserror::Error;

/// Main error type for pulsepatch
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP error: status {status} from {url}")]
    Http { status: u16, url: String },

    #[error("Too many redirects (max {0})")]
    TooManyRedirects(u32),

    #[error("Digest mismatch for channel '{channel}': expected {expected}, got {actual}")]
    Integrity {
        channel: String,
        expected: String,
        actual: String,
    },

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Restart orchestration error: {0}")]
    Orchestration(String),

    #[error("An update is already being applied")]
    Busy,
}

pub type Result<T> = std::result::Result<T, UpdateError>;
