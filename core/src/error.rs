//! Error types shared across the importer

use thiserror::Error;

/// Result type alias for importer operations
pub type Result<T> = std::result::Result<T, ImporterError>;

/// Error type for importer setup and lifecycle operations
///
/// Per-record failures never surface here: a rejected or malformed record is
/// visible only through the rate-limited log and the stats failure signal.
/// This type covers the failures that end a scope - an endpoint that cannot
/// be configured, a resource id nobody registered, an IO failure that needs
/// propagating to the caller.
#[derive(Error, Debug)]
pub enum ImporterError {
    /// Invalid or conflicting endpoint configuration, surfaced at startup
    #[error("configuration error: {0}")]
    Config(String),

    /// No endpoint registered under the given resource identifier
    #[error("no endpoint configured for resource '{resource}'")]
    NotFound {
        /// The resource identifier that was looked up
        resource: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
