//! Error taxonomy for the summarization pipeline.
//!
//! Failures scoped to one unit or one chunk ([`Error::Parse`],
//! [`Error::Chunking`], per-unit [`Error::SourceAccess`], [`Error::Backend`])
//! are recorded in the report and do not stop the run. Only a top-level
//! listing failure is fatal and aborts the run.

use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while harvesting, extracting, chunking, or
/// summarizing source units.
#[derive(Error, Debug)]
pub enum Error {
    /// Listing or fetch failure against a source (local or remote).
    ///
    /// For remote sources the HTTP status code and the response body are
    /// carried verbatim for diagnostics.
    #[error("source access failed: {message}")]
    SourceAccess {
        message: String,
        status: Option<u16>,
    },

    /// The source text could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// Degenerate input to the chunk builder (empty or unchunkable text).
    #[error("chunking error: {0}")]
    Chunking(String),

    /// A summarization call failed. `retryable` distinguishes transient
    /// conditions (timeout, rate limit, server error) from permanent ones
    /// (authentication, malformed request).
    #[error("backend error: {message}")]
    Backend { message: String, retryable: bool },

    /// IO error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Create a source access error without an HTTP status.
    pub fn source_access(msg: impl Into<String>) -> Self {
        Self::SourceAccess {
            message: msg.into(),
            status: None,
        }
    }

    /// Create a source access error from a non-success HTTP response,
    /// surfacing the status code and response body verbatim.
    pub fn http(context: impl AsRef<str>, status: u16, body: &str) -> Self {
        Self::SourceAccess {
            message: format!("{} (HTTP {}): {}", context.as_ref(), status, body.trim()),
            status: Some(status),
        }
    }

    /// Create a retryable backend error (timeout, 429, 5xx, network).
    pub fn backend_transient(msg: impl Into<String>) -> Self {
        Self::Backend {
            message: msg.into(),
            retryable: true,
        }
    }

    /// Create a permanent backend error (auth failure, malformed request).
    pub fn backend_permanent(msg: impl Into<String>) -> Self {
        Self::Backend {
            message: msg.into(),
            retryable: false,
        }
    }

    /// Whether this error is worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend { retryable: true, .. })
    }

    /// The HTTP status carried by a source access error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::SourceAccess { status, .. } => *status,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_carries_status_and_body() {
        let err = Error::http("GitHub listing failed", 404, "{\"message\":\"Not Found\"}");
        assert_eq!(err.status(), Some(404));
        let msg = err.to_string();
        assert!(msg.contains("404"));
        assert!(msg.contains("Not Found"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::backend_transient("timeout").is_retryable());
        assert!(!Error::backend_permanent("401 unauthorized").is_retryable());
        assert!(!Error::source_access("no such root").is_retryable());
        assert!(!Error::Parse("bad syntax".into()).is_retryable());
    }
}
