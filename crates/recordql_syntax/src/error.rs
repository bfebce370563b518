//! Compile errors.

use thiserror::Error;

/// Errors raised while turning a selection into a document.
///
/// These are caller mistakes and are never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// A selection leaf was not a boolean, an object or a field call.
    #[error("invalid selection for field `{field}`: expected a boolean, an object or a field call, found {found}")]
    InvalidSelection { field: String, found: &'static str },

    /// A selection root was not an object.
    #[error("a field selection must be an object, found {found}")]
    NotAnObject { found: &'static str },

    /// Two different variables claimed the same explicit name.
    #[error("variable `${name}` is declared twice with different types or values")]
    DuplicateVariable { name: String },
}

/// Type alias for compile results.
pub type CompileResult<T> = std::result::Result<T, CompileError>;

/// Describes a JSON value's shape for error messages.
pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
