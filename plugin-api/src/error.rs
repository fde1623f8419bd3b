use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stable error codes carried on every RPC failure.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Input/output/config/context/event-data schema mismatch.
    Validation,
    /// Unknown event type on emit, or a listener id that is not registered.
    NotFound,
    /// An RPC call failed.
    Transport,
    /// Any uncaught failure; carries a cause when one is available.
    Unknown,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::Validation => "Validation",
            ErrorCode::NotFound => "NotFound",
            ErrorCode::Transport => "Transport",
            ErrorCode::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// The structured error record of the wire protocol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorObject {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Value>,
}

impl ErrorObject {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Transport, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unknown, message)
    }

    pub fn with_cause(mut self, cause: impl Into<Value>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorObject {}

/// A two-element tagged RPC response: `[error, null]` or `[null, value]`.
///
/// The array form is the transport contract; in-process code should convert
/// with [`WireResult::into_result`] as soon as possible.
#[derive(Clone, Debug, PartialEq)]
pub enum WireResult {
    Ok(Value),
    Err(ErrorObject),
}

impl WireResult {
    pub fn ok(value: impl Into<Value>) -> Self {
        WireResult::Ok(value.into())
    }

    pub fn into_result(self) -> Result<Value, ErrorObject> {
        match self {
            WireResult::Ok(value) => Ok(value),
            WireResult::Err(err) => Err(err),
        }
    }
}

impl From<Result<Value, ErrorObject>> for WireResult {
    fn from(result: Result<Value, ErrorObject>) -> Self {
        match result {
            Ok(value) => WireResult::Ok(value),
            Err(err) => WireResult::Err(err),
        }
    }
}

impl Serialize for WireResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            WireResult::Ok(value) => (None::<&ErrorObject>, Some(value)).serialize(serializer),
            WireResult::Err(err) => (Some(err), None::<&Value>).serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for WireResult {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (err, value) = <(Option<ErrorObject>, Option<Value>)>::deserialize(deserializer)?;
        Ok(match err {
            Some(err) => WireResult::Err(err),
            None => WireResult::Ok(value.unwrap_or(Value::Null)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_result_round_trips() {
        let ok = WireResult::ok(json!({"n": 1}));
        let encoded = serde_json::to_value(&ok).unwrap();
        assert_eq!(encoded, json!([null, {"n": 1}]));
        assert_eq!(serde_json::from_value::<WireResult>(encoded).unwrap(), ok);

        let err = WireResult::Err(ErrorObject::not_found("no such listener"));
        let encoded = serde_json::to_value(&err).unwrap();
        assert_eq!(
            encoded,
            json!([{"code": "NotFound", "message": "no such listener"}, null])
        );
        assert_eq!(serde_json::from_value::<WireResult>(encoded).unwrap(), err);
    }

    #[test]
    fn error_codes_use_wire_names() {
        let encoded = serde_json::to_string(&ErrorCode::Validation).unwrap();
        assert_eq!(encoded, "\"Validation\"");
    }
}
