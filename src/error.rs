use std::path::PathBuf;
use thiserror::Error;

/// Failure surfaced by a [`Transport`](crate::transport::Transport) for a single request.
///
/// The variants are the distinguishable failure classes the retry layer needs;
/// messages are kept as strings so the error stays `Clone`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("malformed URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if e.is_builder() {
            TransportError::InvalidUrl(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

/// Retries exhausted, or a non-retryable transport fault.
#[derive(Debug, Clone, Error)]
#[error("fetching {url} failed after {attempts} attempt(s): {source}")]
pub struct FetchError {
    pub url: String,
    pub attempts: u32,
    #[source]
    pub source: TransportError,
}

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("asset unavailable {url}: {reason}")]
    AssetUnavailable { url: String, reason: String },

    #[error("no variation of {url} could be fetched")]
    PageUnreachable { url: String },

    #[error("storage error at {path:?}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize site map: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to serialize document: {0}")]
    Parse(String),
}

impl MirrorError {
    pub(crate) fn invalid_url(url: &str, reason: impl Into<String>) -> Self {
        MirrorError::InvalidUrl {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MirrorError::Storage {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = MirrorError> = std::result::Result<T, E>;
