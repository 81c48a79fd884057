//! Error taxonomy for the documentation pipeline.
//!
//! Fatal errors ([`Error::InvalidSource`], non-retryable [`Error::Backend`])
//! propagate to the caller unchanged. Everything else is absorbed inside the
//! pipeline: retryable backend failures are handled by the retry controller,
//! a failed chunk becomes a placeholder section in the merged output, and an
//! unreachable cache store degrades to a miss.

use thiserror::Error;

/// Classification of a documentation-backend failure.
///
/// The retry decision lives in [`BackendErrorKind::is_retryable`] as an
/// explicit policy table, so it can be reviewed and extended without touching
/// the HTTP client or any call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// HTTP 429 — the backend asked us to slow down.
    RateLimited,
    /// HTTP 5xx / 529 — transient server unavailability.
    Overloaded,
    /// A single attempt exceeded its timeout budget.
    Timeout,
    /// Connection-level failure before a response arrived.
    Network,
    /// HTTP 401/403 — bad or missing credentials.
    Auth,
    /// HTTP 4xx other than 429 — the request itself is malformed.
    InvalidRequest,
}

impl BackendErrorKind {
    /// Retry policy table.
    pub fn is_retryable(self) -> bool {
        match self {
            Self::RateLimited | Self::Overloaded | Self::Timeout | Self::Network => true,
            Self::Auth | Self::InvalidRequest => false,
        }
    }
}

/// A failure reported by the documentation backend.
#[derive(Debug, Clone, Error)]
#[error("backend error ({kind:?}): {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(kind: BackendErrorKind, status: u16, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Top-level error type for pipeline operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The source could not be parsed into syntactic units. Raised before
    /// any backend call; never produces partial chunks.
    #[error("invalid source: {0}")]
    InvalidSource(String),

    /// A non-retryable backend failure on the unchunked path, or a
    /// retryable one whose retry budget was exhausted.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Configuration problem (missing key, invalid value).
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
