use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the library can surface.
///
/// Local misuse (`Validation`, `State`) is raised before any network activity.
/// Only `Transport` is retried automatically; everything else reaches the
/// caller on first occurrence.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("state error: {0}")]
    State(String),

    #[error("format error: {0}")]
    Format(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("experiment {experiment_id} did not complete within {}s", timeout.as_secs_f64())]
    Timeout {
        experiment_id: String,
        timeout: Duration,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("cache error: {0}")]
    Cache(String),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn state(message: impl Into<String>) -> Self {
        Error::State(message.into())
    }

    pub fn format(message: impl Into<String>) -> Self {
        Error::Format(message.into())
    }

    /// Stable snake_case code, used by command line consumers.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::State(_) => "state_error",
            Error::Format(_) => "format_error",
            Error::Authentication(_) => "authentication_error",
            Error::Transport(_) => "transport_error",
            Error::Server { .. } => "server_error",
            Error::Timeout { .. } => "timeout_error",
            Error::Config(_) => "config_error",
            Error::Cache(_) => "cache_error",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Format(err.to_string())
    }
}
