//! FriendlyEats error types
//!
//! Provides a single error type for every operation in the data-access layer.
//!
//! # Design
//! Uses thiserror for ergonomic error definitions. Transport errors from
//! reqwest and serde_json convert into [`EatsError`] via `From`, so store
//! adapters can propagate them with `?`.

use thiserror::Error;

/// Result alias used throughout the crate
pub type EatsResult<T> = Result<T, EatsError>;

/// Errors surfaced by the data-access layer
///
/// The first five variants form the caller-facing taxonomy. The remaining
/// variants come from the store engines and are either consumed internally
/// (`Aborted` drives transaction retries) or surfaced as-is.
///
/// # Example
/// ```
/// use friendlyeats_store::EatsError;
///
/// let err = EatsError::invalid_argument("restaurant id is empty");
/// assert!(!err.is_retryable());
/// ```
#[derive(Debug, Error)]
pub enum EatsError {
    /// Missing or empty required argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Lookup by id found no record
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transaction retry budget exhausted under contention
    #[error("Transaction conflict: gave up after {attempts} attempts")]
    TransactionConflict {
        /// Number of attempts made before giving up
        attempts: u32,
    },

    /// Stored document is missing an expected field or has the wrong type
    #[error("Malformed record {path}: {reason}")]
    MalformedRecord {
        /// Document path of the offending record
        path: String,
        /// What was wrong with it
        reason: String,
    },

    /// Underlying connectivity or service failure
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A commit lost an optimistic-concurrency race
    #[error("Transaction aborted: {0}")]
    Aborted(String),

    /// Caller lacks permission for the operation
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Network/HTTP errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Subscription was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EatsError {
    /// Create an invalid argument error from a string
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a not found error from a string
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a malformed record error
    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error from a string
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if error is transient and worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::StoreUnavailable(_) | Self::Aborted(_) => true,
            Self::Network(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Check if error is a commit conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }

    /// Create from a Firestore REST `error.status` string
    ///
    /// Statuses follow `google.rpc.Code` names.
    pub fn from_status(status: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            "ABORTED" => Self::Aborted(message),
            "NOT_FOUND" => Self::NotFound(message),
            "INVALID_ARGUMENT" | "FAILED_PRECONDITION" | "OUT_OF_RANGE" => {
                Self::InvalidArgument(message)
            }
            "PERMISSION_DENIED" | "UNAUTHENTICATED" => Self::PermissionDenied(message),
            "UNAVAILABLE" | "DEADLINE_EXCEEDED" | "RESOURCE_EXHAUSTED" => {
                Self::StoreUnavailable(message)
            }
            "CANCELLED" => Self::Cancelled,
            _ => Self::Internal(format!("{}: {}", status, message)),
        }
    }
}
