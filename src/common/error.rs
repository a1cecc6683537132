//! Error types for shardmesh

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Change-feed Errors ===
    #[error("Subscription error: {0}")]
    Subscription(String),

    #[error("Malformed shard document for {database}: {reason}")]
    MalformedShardDoc { database: String, reason: String },

    // === Shard-table Errors ===
    #[error("Shard table corrupted: {0}")]
    TableCorrupted(String),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Is this a fatal error? Fatal errors terminate the shard-map cache;
    /// everything else is absorbed by the subscriber's retry loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::TableCorrupted(_))
    }

    /// Is this a retryable error?
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Subscription(_) | Error::Io(_))
    }
}

// Implement From for common error types
impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::TableCorrupted("poisoned".into()).is_fatal());
        assert!(!Error::Subscription("reset by peer".into()).is_fatal());
        assert!(!Error::MalformedShardDoc {
            database: "orders".into(),
            reason: "missing shards".into(),
        }
        .is_fatal());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Subscription("timeout".into()).is_retryable());
        assert!(!Error::TableCorrupted("poisoned".into()).is_retryable());
    }
}
