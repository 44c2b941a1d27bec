//! Error types for catalog search, asset download and export upload.

use thiserror::Error;

/// Errors produced by the cloud layer.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed STAC response: {0}")]
    Stac(String),

    #[error("item '{item}' has no asset '{asset}'")]
    MissingAsset { item: String, asset: String },

    #[error("invalid destination '{0}' (expected a directory or gs://bucket/folder)")]
    InvalidDestination(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("core error: {0}")]
    Core(#[from] lcmap_core::Error),
}

impl CloudError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            CloudError::Http(e) => e.is_timeout() || e.is_connect(),
            CloudError::Status { status, .. } => *status == 429 || *status >= 500,
            CloudError::Network(_) => true,
            _ => false,
        }
    }
}

/// Result alias for cloud operations.
pub type Result<T> = std::result::Result<T, CloudError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> CloudError {
        CloudError::Status {
            status: code,
            url: "https://example.com".into(),
            body: String::new(),
        }
    }

    #[test]
    fn client_errors_are_final() {
        assert!(!status(404).is_transient());
        assert!(!status(403).is_transient());
        assert!(status(429).is_transient());
        assert!(status(503).is_transient());
        assert!(!CloudError::Auth("denied".into()).is_transient());
    }
}
