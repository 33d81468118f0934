//! Error types and failure classification
//!
//! Raw collaborator failures ([`FetchError`]) are mapped onto a small closed
//! taxonomy ([`ErrorKind`]) with fixed user-facing messages by the
//! [`classify`] function. Request-level faults use [`SearchError`].

mod classifier;

pub use classifier::{classify, classify_message, PATTERN_TABLE_VERSION};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Typed failure surfaced by a flight fetch collaborator.
///
/// Variants carry stable signals; only [`FetchError::Other`] falls back to
/// text matching during classification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("tooling missing: {0}")]
    ToolingMissing(String),

    #[error("blocked by upstream: {0}")]
    Blocked(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no flights returned")]
    NoResults,

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("{0}")]
    Other(String),
}

/// Closed set of failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    ConnectionFailure,
    ToolingMissing,
    AntiBotBlocked,
    InvalidInput,
    NoResults,
    MalformedResponse,
    Unknown,
}

impl ErrorKind {
    /// Fixed user-facing message for this kind.
    ///
    /// [`ErrorKind::Unknown`] messages also carry the raw text and are built
    /// by the classifier instead.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Timeout => "The flight search request timed out.",
            Self::ConnectionFailure => {
                "Failed to connect to the flight data service. Please ensure it's properly configured."
            }
            Self::ToolingMissing => {
                "The flight search tooling could not be found. Please check the transport setup."
            }
            Self::AntiBotBlocked => {
                "The flight data source blocked the request, likely due to anti-bot measures. Please try again in a few minutes."
            }
            Self::InvalidInput => "The flight search parameters were invalid.",
            Self::NoResults => "No flights were found for this route and date.",
            Self::MalformedResponse => "The flight data source did not return structured flight data.",
            Self::Unknown => "An unexpected error occurred during flight search.",
        }
    }

    /// Failure class this kind belongs to
    pub fn failure_class(&self) -> FailureClass {
        match self {
            Self::Timeout | Self::ConnectionFailure => FailureClass::TransientFetchError,
            Self::ToolingMissing => FailureClass::TransportUnavailable,
            Self::AntiBotBlocked
            | Self::InvalidInput
            | Self::NoResults
            | Self::MalformedResponse
            | Self::Unknown => FailureClass::PermanentFetchError,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Timeout => "timeout",
            Self::ConnectionFailure => "connection_failure",
            Self::ToolingMissing => "tooling_missing",
            Self::AntiBotBlocked => "anti_bot_blocked",
            Self::InvalidInput => "invalid_input",
            Self::NoResults => "no_results",
            Self::MalformedResponse => "malformed_response",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Coarse failure classes used for propagation decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    DecompositionFailure,
    TransportUnavailable,
    TransientFetchError,
    PermanentFetchError,
}

/// A raw failure mapped to a kind and a deterministic message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ClassifiedError {
    /// Build a classified error carrying the fixed message for `kind`.
    pub fn from_kind(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: kind.message().to_string(),
        }
    }

    pub fn timeout() -> Self {
        Self::from_kind(ErrorKind::Timeout)
    }
}

impl std::fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Request-level errors.
///
/// Per-search failures never surface here; they are contained in the
/// search's own result.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The travel request could not be broken down into searches.
    #[error("decomposition failed: {0}")]
    Decomposition(String),

    /// Two searches in one batch share an id.
    #[error("duplicate search id in batch: {0}")]
    DuplicateSpecId(String),

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl SearchError {
    pub fn failure_class(&self) -> Option<FailureClass> {
        match self {
            Self::Decomposition(_) | Self::DuplicateSpecId(_) => {
                Some(FailureClass::DecompositionFailure)
            }
            Self::Config(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds_are_transient() {
        assert_eq!(
            ErrorKind::Timeout.failure_class(),
            FailureClass::TransientFetchError
        );
        assert_eq!(
            ErrorKind::ConnectionFailure.failure_class(),
            FailureClass::TransientFetchError
        );
        assert_eq!(
            ErrorKind::ToolingMissing.failure_class(),
            FailureClass::TransportUnavailable
        );
        assert_eq!(
            ErrorKind::NoResults.failure_class(),
            FailureClass::PermanentFetchError
        );
    }

    #[test]
    fn classified_error_uses_fixed_message() {
        let err = ClassifiedError::from_kind(ErrorKind::AntiBotBlocked);
        assert_eq!(err.message, ErrorKind::AntiBotBlocked.message());
        assert!(err.to_string().starts_with("anti_bot_blocked: "));
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ConnectionFailure).unwrap();
        assert_eq!(json, "\"connection_failure\"");
    }

    #[test]
    fn search_error_display() {
        let err = SearchError::Decomposition("empty query".into());
        assert_eq!(err.to_string(), "decomposition failed: empty query");
        assert_eq!(
            err.failure_class(),
            Some(FailureClass::DecompositionFailure)
        );
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SearchError>();
        assert_send_sync::<FetchError>();
    }
}
