//! Error types for CourtScout.
//!
//! Library crates use [`CourtScoutError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all CourtScout operations.
#[derive(Debug, thiserror::Error)]
pub enum CourtScoutError {
    /// A page, content or model call failed or timed out. The current item or
    /// round is skipped; the run continues.
    #[error("transient fetch error: {0}")]
    TransientFetch(String),

    /// A model response did not contain a parseable record array.
    #[error("malformed response: {message}")]
    MalformedResponse { message: String },

    /// A candidate record is missing the fields its natural key needs.
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// The long-lived fetch session is unusable and must be reopened.
    #[error("fetch session unusable: {0}")]
    TerminalDriver(String),

    /// A store read or write failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Tabular export failed.
    #[error("export error: {0}")]
    Export(String),

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input validation error (bad location, bad URL, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CourtScoutError>;

impl CourtScoutError {
    /// Create a transient fetch error from any displayable message.
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::TransientFetch(msg.into())
    }

    /// Create a malformed-response error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: msg.into(),
        }
    }

    /// Create a schema-mismatch error.
    pub fn schema_mismatch(msg: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: msg.into(),
        }
    }

    /// Create a persistence error.
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error ends the whole run rather than a single item.
    ///
    /// Only an unrecoverable fetch session and bad configuration qualify.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(self, Self::TerminalDriver(_) | Self::Config { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = CourtScoutError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = CourtScoutError::transient("https://example.com: HTTP 503");
        assert!(err.to_string().contains("HTTP 503"));
    }

    #[test]
    fn only_driver_and_config_errors_are_fatal() {
        assert!(CourtScoutError::TerminalDriver("closed".into()).is_fatal_for_run());
        assert!(CourtScoutError::config("bad").is_fatal_for_run());
        assert!(!CourtScoutError::transient("timeout").is_fatal_for_run());
        assert!(!CourtScoutError::persistence("locked").is_fatal_for_run());
        assert!(!CourtScoutError::malformed("no array").is_fatal_for_run());
    }
}
