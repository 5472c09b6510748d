use crate::config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("state lock poisoned")]
    StateLock,
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to build http client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// A failed read of the document store. Every variant fails the whole cycle.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("document store responded with status {status}")]
    Status { status: u16 },
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl FetchError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            FetchError::Status { status } => Some(*status),
            FetchError::Transport(err) => err.status().map(|status| status.as_u16()),
            FetchError::MalformedResponse(_) => None,
        }
    }
}
