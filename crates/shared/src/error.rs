use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Error body returned by the remote service: `{"detail": ...}`.
///
/// `detail` is a plain string for handled errors and an array of field
/// errors for request validation failures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl ApiErrorBody {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(Value::String(detail.into())),
        }
    }

    /// The server-provided message, only when `detail` is a string.
    pub fn message(&self) -> Option<&str> {
        match &self.detail {
            Some(Value::String(message)) if !message.trim().is_empty() => Some(message.as_str()),
            _ => None,
        }
    }
}

/// A profile field outside the range the service accepts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field} must be between {min} and {max}")]
pub struct FieldRangeError {
    pub field: &'static str,
    pub min: i64,
    pub max: i64,
}

impl FieldRangeError {
    pub fn new(field: &'static str, min: i64, max: i64) -> Self {
        Self { field, min, max }
    }
}
