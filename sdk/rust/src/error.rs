//! Strongly typed error system for the recordql SDK.
//!
//! Three layers of errors exist:
//! - [`BuildError`]: the operation could not be built; nothing was sent.
//! - [`SdkError`]: the transport failed; the operation may not have run.
//! - [`OperationError`]: everything a finished operation can report,
//!   carried as data in an `OperationResult` rather than returned as `Err`.

use crate::transport::GraphQLError;
use recordql_runtime::{HydrateError, RecordError};
use recordql_syntax::CompileError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Typed error codes for transport-level failures.
///
/// The client raises `Timeout`, `Aborted`, `NoData`, `InvalidResponse`,
/// `UnsupportedOperation` and `InternalError` itself. The network, HTTP
/// and auth codes are for [`Transport`](crate::Transport) implementations
/// to report what their wire layer saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorCode {
    // Network errors
    NetworkError,
    Timeout,
    Aborted,

    // Protocol errors
    HttpError,
    InvalidResponse,
    TooManyRequests,

    // GraphQL errors
    NoData,
    UnsupportedOperation,

    // Auth errors
    Unauthorized,
    Forbidden,

    // Internal errors
    InternalError,
}

impl ErrorCode {
    /// Returns the string representation of the error code.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkError => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Aborted => "ABORTED",
            Self::HttpError => "HTTP_ERROR",
            Self::InvalidResponse => "INVALID_RESPONSE",
            Self::TooManyRequests => "TOO_MANY_REQUESTS",
            Self::NoData => "NO_DATA",
            Self::UnsupportedOperation => "UNSUPPORTED_OPERATION",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Returns true if a transport could reasonably retry this failure.
    ///
    /// The SDK itself never retries; this is a hint for transports.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::Timeout | Self::TooManyRequests
        )
    }

    /// Returns true if the failure was caused by the caller.
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::Aborted | Self::Unauthorized | Self::Forbidden)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Strongly typed transport error.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("[{code}] {message}")]
pub struct SdkError {
    /// Typed error code.
    pub code: ErrorCode,
    /// Human-readable error message.
    pub message: String,
    /// Extension data for debugging.
    pub extensions: Option<HashMap<String, serde_json::Value>>,
}

impl SdkError {
    /// Creates a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            extensions: None,
        }
    }

    /// Adds extension data.
    #[must_use]
    pub fn with_extension(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let extensions = self.extensions.get_or_insert_with(HashMap::new);
        if let Ok(v) = serde_json::to_value(value) {
            extensions.insert(key.into(), v);
        }
        self
    }

    // Convenience constructors

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NetworkError, message)
    }

    /// Creates a timeout error.
    pub fn timeout() -> Self {
        Self::new(ErrorCode::Timeout, "Request timed out")
    }

    /// Creates the error reported when the caller aborts a request.
    pub fn aborted() -> Self {
        Self::new(ErrorCode::Aborted, "Request was aborted")
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Returns true if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Returns true if this is a client error.
    pub fn is_client_error(&self) -> bool {
        self.code.is_client_error()
    }

    /// Returns true if the caller aborted the request.
    pub fn is_aborted(&self) -> bool {
        self.code == ErrorCode::Aborted
    }
}

impl Serialize for SdkError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("SdkError", 3)?;
        state.serialize_field("code", &self.code)?;
        state.serialize_field("message", &self.message)?;
        if let Some(ref ext) = self.extensions {
            state.serialize_field("extensions", ext)?;
        }
        state.end()
    }
}

/// Type alias for SDK results.
pub type SdkResult<T> = std::result::Result<T, SdkError>;

/// The operation could not be built. Raised before anything is sent.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Flat variables passed to an action whose model has a field that
    /// shadows a parameter name.
    #[error(
        "invalid arguments found in variables: {}. Did you mean to use {operation}({{ {model}: {{ ... }} }})?",
        .unexpected.join(", ")
    )]
    VariableMismatch {
        operation: String,
        model: String,
        unexpected: Vec<String>,
    },

    #[error("variables for `{operation}` must be an object, found {found}")]
    VariablesNotAnObject {
        operation: String,
        found: &'static str,
    },

    /// Paging past the first or last page.
    #[error("cannot request the {direction} page because there isn't one")]
    PageUnavailable { direction: &'static str },
}

/// Type alias for build results.
pub type BuildResult<T> = std::result::Result<T, BuildError>;

/// Everything a dispatched operation can report.
#[derive(Error, Debug, Clone)]
pub enum OperationError {
    /// The transport failed; the operation may not have run.
    #[error("transport failed: {0}")]
    Transport(#[from] SdkError),

    /// The response carried a top-level `errors` array.
    #[error("GraphQL request failed: {}", join_messages(.0))]
    GraphQL(Vec<GraphQLError>),

    /// The operation ran but reported errors for its record(s).
    #[error("operation reported errors: {0}")]
    Record(RecordError),

    /// No record matched.
    #[error("{model} record not found ({lookup})")]
    NotFound { model: String, lookup: String },

    /// A lookup expected to be unique matched several records.
    #[error("{model} lookup ({lookup}) matched {count} records, expected at most one")]
    NonUniqueData {
        model: String,
        lookup: String,
        count: usize,
    },

    /// The response did not match the selection's shape.
    #[error("failed to hydrate response: {0}")]
    Hydrate(#[from] HydrateError),
}

impl OperationError {
    /// Returns false when the operation may not have reached the backend.
    pub fn ran(&self) -> bool {
        !matches!(self, Self::Transport(_))
    }

    /// Returns true when no record matched.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true when the operation ran but reported record errors.
    pub fn is_partial_failure(&self) -> bool {
        matches!(self, Self::Record(_))
    }

    /// The record error, if this is one.
    pub fn record_error(&self) -> Option<&RecordError> {
        match self {
            Self::Record(error) => Some(error),
            _ => None,
        }
    }
}

fn join_messages(errors: &[GraphQLError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_properties() {
        assert!(ErrorCode::Timeout.is_retryable());
        assert!(!ErrorCode::Aborted.is_retryable());
        assert!(ErrorCode::Aborted.is_client_error());
        assert!(!ErrorCode::InternalError.is_client_error());
        assert!(ErrorCode::TooManyRequests.is_retryable());
        assert!(ErrorCode::Forbidden.is_client_error());
    }

    #[test]
    fn test_error_construction() {
        let err = SdkError::network("socket closed").with_extension("attempt", 2);

        assert_eq!(err.code, ErrorCode::NetworkError);
        assert_eq!(err.to_string(), "[NETWORK_ERROR] socket closed");
        assert_eq!(err.extensions.unwrap()["attempt"], 2);
        assert!(SdkError::aborted().is_aborted());
    }

    #[test]
    fn test_error_serialization() {
        let json = serde_json::to_string(&SdkError::timeout()).unwrap();
        assert!(json.contains("TIMEOUT"));
        assert!(json.contains("Request timed out"));
    }

    #[test]
    fn test_variable_mismatch_message() {
        let err = BuildError::VariableMismatch {
            operation: "updateUser".into(),
            model: "user".into(),
            unexpected: vec!["name".into(), "email".into()],
        };
        assert_eq!(
            err.to_string(),
            "invalid arguments found in variables: name, email. Did you mean to use updateUser({ user: { ... } })?"
        );
    }

    #[test]
    fn test_operation_error_classification() {
        let transport = OperationError::from(SdkError::timeout());
        assert!(!transport.ran());

        let partial = OperationError::Record(RecordError::new("GGT_INVALID_RECORD", "invalid"));
        assert!(partial.ran());
        assert!(partial.is_partial_failure());
        assert_eq!(partial.record_error().unwrap().code, "GGT_INVALID_RECORD");
    }
}
