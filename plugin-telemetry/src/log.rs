//! Structured logs.

use std::backtrace::Backtrace;

use serde_json::{Map, Value};

use plugin_api::signal::{ErrorDetail, LogLevel, LogRecord};

use crate::span::{ambient_span, SpanHandle};
use crate::TelemetryClient;

/// Input to a log call. At least one of `message` or `error.message` must be
/// non-empty; an empty input is rejected with a self-error instead of a
/// panic.
#[derive(Clone, Debug, Default)]
pub struct LogInput {
    pub message: Option<String>,
    pub error: Option<ErrorDetail>,
    pub attributes: Map<String, Value>,
}

impl LogInput {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn error(error: ErrorDetail) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    /// Captures a standard error as the log's error detail.
    pub fn from_error(error: &(dyn std::error::Error + '_)) -> Self {
        Self::error(ErrorDetail {
            name: None,
            message: error.to_string(),
            stack: None,
        })
    }

    pub fn with_error(mut self, error: ErrorDetail) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

impl From<&str> for LogInput {
    fn from(message: &str) -> Self {
        LogInput::message(message)
    }
}

impl From<String> for LogInput {
    fn from(message: String) -> Self {
        LogInput::message(message)
    }
}

/// Level-method log handle. Obtained from
/// [`TelemetryClient::log`](crate::TelemetryClient::log) (unbound) or
/// [`SpanHandle::log`] (span-bound).
#[derive(Clone)]
pub struct LogHandle {
    client: TelemetryClient,
    span: Option<SpanHandle>,
}

impl LogHandle {
    pub(crate) fn new(client: TelemetryClient) -> Self {
        Self { client, span: None }
    }

    pub(crate) fn span_bound(client: TelemetryClient, span: SpanHandle) -> Self {
        Self {
            client,
            span: Some(span),
        }
    }

    pub fn debug(&self, input: impl Into<LogInput>) {
        self.emit(LogLevel::Debug, input.into());
    }

    pub fn info(&self, input: impl Into<LogInput>) {
        self.emit(LogLevel::Info, input.into());
    }

    pub fn warn(&self, input: impl Into<LogInput>) {
        self.emit(LogLevel::Warn, input.into());
    }

    pub fn error(&self, input: impl Into<LogInput>) {
        self.emit(LogLevel::Error, input.into());
    }

    pub fn fatal(&self, input: impl Into<LogInput>) {
        self.emit(LogLevel::Fatal, input.into());
    }

    fn emit(&self, level: LogLevel, mut input: LogInput) {
        let message = input.message.take().unwrap_or_default();
        let error_message = input
            .error
            .as_ref()
            .map(|err| err.message.as_str())
            .unwrap_or_default();
        if message.is_empty() && error_message.is_empty() {
            self.client
                .self_error("log rejected: neither `message` nor `error.message` is set".into());
            return;
        }
        let message = if message.is_empty() {
            error_message.to_owned()
        } else {
            message
        };

        // The error's own stack wins; otherwise synthesize one here.
        let stack = match input.error.as_ref().and_then(|err| err.stack.clone()) {
            Some(stack) => stack,
            None => Backtrace::force_capture().to_string(),
        };
        if let Some(error) = input.error.as_mut() {
            if error.stack.is_none() {
                error.stack = Some(stack.clone());
            }
        }

        let (trace_id, span_id) = match &self.span {
            Some(span) => {
                let ctx = span.context();
                (Some(ctx.trace_id), Some(ctx.span_id))
            }
            None => match ambient_span() {
                Some(ctx) => (Some(ctx.trace_id), Some(ctx.span_id)),
                None => (None, None),
            },
        };

        let record = LogRecord {
            level,
            message_unstyled: message.clone(),
            message,
            attributes: input.attributes,
            timestamp: self.client.now_ms(),
            stack,
            trace_id,
            span_id,
            error: input.error,
        };

        if let Some(span) = &self.span {
            if !span.append_log(&record) {
                self.client.self_error(format!(
                    "span `{}` already ended; log rejected",
                    span.name()
                ));
                return;
            }
        }

        self.client.send_log(record);
    }
}
