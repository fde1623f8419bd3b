//! Method definitions.
//!
//! Invocation is wrapped by the server: each call opens a span named
//! `plugin.<name>.methods.<m>()`, validates the input, runs the body with a
//! writable context and an emitter, and validates the output. Validation
//! failures surface as `Validation` errors carrying the schema diagnostic.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use plugin_api::schema::Schema;
use plugin_api::ErrorObject;
use plugin_telemetry::SpanHandle;

use crate::context::ContextHandle;
use crate::events::EventEmitter;

/// Context handed to a method body for one invocation. `input` has already
/// been validated against the method's input schema.
pub struct MethodCtx {
    pub input: Value,
    pub config: Value,
    pub context: ContextHandle,
    pub events: EventEmitter,
    pub telemetry: SpanHandle,
}

pub type MethodFn =
    Arc<dyn Fn(MethodCtx) -> BoxFuture<'static, Result<Value, ErrorObject>> + Send + Sync>;

#[derive(Clone)]
pub struct MethodDef {
    pub input_schema: Schema,
    pub output_schema: Schema,
    pub run: MethodFn,
}
