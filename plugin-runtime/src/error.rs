use plugin_api::schema::SchemaError;
use plugin_api::{ErrorCode, ErrorObject};
use thiserror::Error;

use crate::transport::TransportError;

/// Failures surfaced by the runtime to in-process callers. On the wire, each
/// maps to an [`ErrorObject`] with the matching [`ErrorCode`].
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("validation failed: {0}")]
    Validation(#[from] SchemaError),
    #[error("unknown event type `{0}`")]
    UnknownEvent(String),
    #[error("event data supplied for `{0}`, which declares no data schema")]
    UnexpectedData(String),
    #[error("listener `{0}` is not registered")]
    UnknownListener(String),
    #[error("unknown method `{0}`")]
    UnknownMethod(String),
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error("{0}")]
    Unknown(String),
}

impl RuntimeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RuntimeError::Validation(_) | RuntimeError::UnexpectedData(_) => ErrorCode::Validation,
            RuntimeError::UnknownEvent(_)
            | RuntimeError::UnknownListener(_)
            | RuntimeError::UnknownMethod(_) => ErrorCode::NotFound,
            RuntimeError::Transport(_) => ErrorCode::Transport,
            RuntimeError::Unknown(_) => ErrorCode::Unknown,
        }
    }

    pub fn into_object(self) -> ErrorObject {
        let object = ErrorObject::new(self.code(), self.to_string());
        match self {
            RuntimeError::Validation(schema_error) => object.with_cause(schema_error.to_value()),
            _ => object,
        }
    }
}

impl From<RuntimeError> for ErrorObject {
    fn from(error: RuntimeError) -> Self {
        error.into_object()
    }
}
