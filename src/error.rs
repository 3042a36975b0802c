use thiserror::Error;

/// Failure reported by a remote store call.
///
/// The engine only distinguishes success from failure; the variants exist so the
/// underlying cause can be logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),
    #[error("remote rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("remote entity not found: {0}")]
    NotFound(String),
}

impl RemoteError {
    pub fn network(message: impl Into<String>) -> Self {
        RemoteError::Network(message.into())
    }

    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        RemoteError::Rejected {
            status,
            message: message.into(),
        }
    }
}

/// Failure of a durable cache read or write.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache serialization error: {0}")]
    Serde(String),
    #[error("cache storage error: {0}")]
    Storage(String),
    #[error("cache quota exceeded writing {key} ({needed} bytes, {available} available)")]
    QuotaExceeded {
        key: String,
        needed: usize,
        available: usize,
    },
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serde(err.to_string())
    }
}

impl From<bitcode::Error> for CacheError {
    fn from(err: bitcode::Error) -> Self {
        CacheError::Serde(err.to_string())
    }
}

impl From<base64::DecodeError> for CacheError {
    fn from(err: base64::DecodeError) -> Self {
        CacheError::Serde(err.to_string())
    }
}

/// Configuration loading failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Umbrella error for callers that want a single type.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
