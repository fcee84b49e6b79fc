//! Error types for `HostPrint`
//!
//! Only unrecoverable or boundary failures become an [`Error`]. Anything
//! a reconnaissance run can survive, like an unreachable plugin API or a
//! probe timeout, is recorded as a data field on the corresponding result
//! instead.

use thiserror::Error;

/// Error type for discovery and verification operations
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// A discovery plugin name was registered twice
    #[error("discovery plugin '{0}' is already registered")]
    PluginConflict(String),

    /// A fingerprint file failed validation
    #[error("invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    /// HTTP client construction or transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Filesystem failure outside the cache layer (cache I/O degrades to a miss)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding failure on an input or output document
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV export failure
    #[error("CSV export error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type for discovery and verification operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_conflict_display() {
        let err = Error::PluginConflict("shodan".to_string());
        assert_eq!(
            err.to_string(),
            "discovery plugin 'shodan' is already registered"
        );
    }

    #[test]
    fn test_invalid_fingerprint_display() {
        let err = Error::InvalidFingerprint("probe orders not increasing".to_string());
        assert!(err.to_string().contains("probe orders not increasing"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = Error::from(io);
        assert!(matches!(err, Error::Io(_)));
    }
}
