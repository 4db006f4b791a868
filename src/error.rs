//! Error types for the offline-shell library.

use thiserror::Error;

/// Errors that can occur while intercepting requests or managing partitions.
#[derive(Error, Debug)]
pub enum Error {
    /// The network transport could not produce a response.
    #[error("network failure: {0}")]
    Network(String),

    /// HTTP client error from the underlying transport.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A cache partition operation failed.
    #[error("cache storage error: {0}")]
    Storage(String),

    /// Configuration is missing or invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A URL could not be parsed or resolved.
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl {
        /// The offending input.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// I/O error during storage or config file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A stored cache entry could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true if this error came from the network side of a request.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Http(_))
    }
}

/// A specialized `Result` type for offline-shell operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_errors_are_classified() {
        assert!(Error::Network("connection refused".into()).is_network());
        assert!(!Error::Storage("quota exceeded".into()).is_network());
        assert!(!Error::Config("empty version".into()).is_network());
    }

    #[test]
    fn invalid_url_message_names_input() {
        let err = Error::InvalidUrl {
            url: "::nope".into(),
            reason: "relative URL without a base".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid URL ::nope: relative URL without a base"
        );
    }
}
