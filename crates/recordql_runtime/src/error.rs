//! Hydration and record errors.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Code used when several record errors are reported together.
pub const ERROR_GROUP_CODE: &str = "ERROR_GROUP";

/// Code the backend uses for records that failed validation.
pub const INVALID_RECORD_CODE: &str = "GGT_INVALID_RECORD";

/// A response payload did not have the shape the selection promised.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HydrateError {
    #[error("expected an object at `{path}`, found {found}")]
    NotAnObject { path: String, found: &'static str },

    #[error("expected a list at `{path}`, found {found}")]
    NotAList { path: String, found: &'static str },

    #[error("failed to read field `{field}`: {message}")]
    Deserialize { field: String, message: String },
}

/// Type alias for hydration results.
pub type HydrateResult<T> = std::result::Result<T, HydrateError>;

/// A single invalid field reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub api_identifier: String,
    pub message: String,
}

/// An error a mutation reported for a record while the response itself
/// succeeded.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("[{code}] {message}")]
#[serde(rename_all = "camelCase")]
pub struct RecordError {
    pub code: String,
    pub message: String,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub validation_errors: Vec<ValidationError>,
    /// Member errors when this error groups several.
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub errors: Vec<RecordError>,
}

impl RecordError {
    /// Creates an error with no validation details.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            validation_errors: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Builds an error from a payload `errors` array.
    ///
    /// Returns `None` for an empty array. Several entries become a group.
    pub fn from_payload(errors: &[Value]) -> HydrateResult<Option<Self>> {
        let mut parsed = errors
            .iter()
            .map(|e| {
                serde_json::from_value::<RecordError>(e.clone()).map_err(|err| {
                    HydrateError::Deserialize {
                        field: "errors".into(),
                        message: err.to_string(),
                    }
                })
            })
            .collect::<HydrateResult<Vec<_>>>()?;

        Ok(match parsed.len() {
            0 => None,
            1 => parsed.pop(),
            n => {
                let summary = parsed
                    .iter()
                    .map(|e| e.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; ");
                Some(Self {
                    code: ERROR_GROUP_CODE.into(),
                    message: format!("{n} errors occurred: {summary}"),
                    validation_errors: Vec::new(),
                    errors: parsed,
                })
            }
        })
    }

    /// Returns true if the backend rejected the record's field values.
    pub fn is_invalid_record(&self) -> bool {
        self.code == INVALID_RECORD_CODE || self.errors.iter().any(Self::is_invalid_record)
    }

    /// Names of fields reported invalid, including those of grouped errors.
    pub fn invalid_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = self
            .validation_errors
            .iter()
            .map(|v| v.api_identifier.as_str())
            .collect();
        for member in &self.errors {
            fields.extend(member.invalid_fields());
        }
        fields
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_detail_lists() {
        let error = RecordError::from_payload(&[json!({
            "code": "GGT_INTERNAL_ERROR",
            "message": "boom",
            "validationErrors": null,
            "errors": null
        })])
        .unwrap()
        .unwrap();

        assert_eq!(error, RecordError::new("GGT_INTERNAL_ERROR", "boom"));
        assert!(error.invalid_fields().is_empty());
    }

    #[test]
    fn test_single_error() {
        let error = RecordError::from_payload(&[json!({
            "code": "GGT_INVALID_RECORD",
            "message": "name is required",
            "validationErrors": [{ "apiIdentifier": "name", "message": "is required" }]
        })])
        .unwrap()
        .unwrap();

        assert!(error.is_invalid_record());
        assert_eq!(error.invalid_fields(), ["name"]);
        assert_eq!(error.to_string(), "[GGT_INVALID_RECORD] name is required");
    }

    #[test]
    fn test_error_group() {
        let error = RecordError::from_payload(&[
            json!({ "code": "GGT_PERMISSION_DENIED", "message": "denied" }),
            json!({
                "code": "GGT_INVALID_RECORD",
                "message": "invalid",
                "validationErrors": [{ "apiIdentifier": "email", "message": "is taken" }]
            }),
        ])
        .unwrap()
        .unwrap();

        assert_eq!(error.code, ERROR_GROUP_CODE);
        assert_eq!(error.errors.len(), 2);
        assert!(error.message.starts_with("2 errors occurred"));
        assert!(error.is_invalid_record());
        assert_eq!(error.invalid_fields(), ["email"]);
    }

    #[test]
    fn test_empty_and_malformed() {
        assert_eq!(RecordError::from_payload(&[]).unwrap(), None);
        assert!(RecordError::from_payload(&[json!("boom")]).is_err());
    }
}
