//! Unified error type for the streak-bot.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Dispatch to {destination} failed: {message}")]
    Dispatch { destination: String, message: String },

    #[error("Dispatch to {destination} timed out after {timeout_ms}ms")]
    DispatchTimeout { destination: String, timeout_ms: u64 },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}
