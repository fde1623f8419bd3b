//! Spans: timed, named, nestable regions carrying attributes and logs.
//!
//! Parent tracking uses an *ambient span*: a task-local scope installed for
//! the duration of a traced body, threading through `.await` suspensions
//! within the same logical task. Work handed to `tokio::spawn` starts a new
//! logical task and does not inherit the ambient span; pass an explicit
//! parent through [`TraceOptions`] there.

use std::future::Future;
use std::sync::Arc;

use serde_json::{Map, Value};

use plugin_api::signal::{LogRecord, SpanRecord, PENDING_NS};

use crate::log::LogHandle;
use crate::sync::Mutex;
use crate::TelemetryClient;

tokio::task_local! {
    static ACTIVE_SPAN: SpanContext;
}

/// The ids identifying a span as a parent: its own id and its trace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpanContext {
    pub trace_id: String,
    pub span_id: String,
}

/// The ambient span of the current task, if a traced body is running.
pub fn ambient_span() -> Option<SpanContext> {
    ACTIVE_SPAN.try_with(|ctx| ctx.clone()).ok()
}

pub(crate) async fn with_ambient<F: Future>(ctx: SpanContext, fut: F) -> F::Output {
    ACTIVE_SPAN.scope(ctx, fut).await
}

pub(crate) fn with_ambient_sync<T>(ctx: SpanContext, f: impl FnOnce() -> T) -> T {
    ACTIVE_SPAN.sync_scope(ctx, f)
}

/// Options accepted by [`TelemetryClient::trace`].
#[derive(Clone, Debug, Default)]
pub struct TraceOptions {
    pub attributes: Map<String, Value>,
    /// Overrides the ambient parent.
    pub parent: Option<SpanContext>,
}

impl TraceOptions {
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn parent(mut self, parent: SpanContext) -> Self {
        self.parent = Some(parent);
        self
    }
}

#[derive(Debug)]
pub(crate) struct SpanData {
    pub(crate) id: String,
    pub(crate) trace_id: String,
    pub(crate) parent_span_id: Option<String>,
    pub(crate) name: String,
    pub(crate) start_ns: i64,
    pub(crate) attributes: Map<String, Value>,
    pub(crate) logs: Vec<LogRecord>,
    pub(crate) ended: bool,
}

/// Cloneable handle to a span. A span ends exactly once; attribute and log
/// mutation after the end is rejected and self-reported as a telemetry
/// error.
#[derive(Clone)]
pub struct SpanHandle {
    data: Arc<Mutex<SpanData>>,
    client: TelemetryClient,
}

impl SpanHandle {
    pub(crate) fn new(client: TelemetryClient, data: SpanData) -> Self {
        Self {
            data: Arc::new(Mutex::new(data)),
            client,
        }
    }

    pub fn id(&self) -> String {
        self.data.lock().id.clone()
    }

    pub fn trace_id(&self) -> String {
        self.data.lock().trace_id.clone()
    }

    pub fn name(&self) -> String {
        self.data.lock().name.clone()
    }

    pub fn context(&self) -> SpanContext {
        let data = self.data.lock();
        SpanContext {
            trace_id: data.trace_id.clone(),
            span_id: data.id.clone(),
        }
    }

    pub fn is_ended(&self) -> bool {
        self.data.lock().ended
    }

    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<Value>) {
        let rejected = {
            let mut data = self.data.lock();
            if data.ended {
                Some(data.name.clone())
            } else {
                data.attributes.insert(key.into(), value.into());
                None
            }
        };
        if let Some(name) = rejected {
            self.client
                .self_error(format!("span `{name}` already ended; attribute rejected"));
        }
    }

    pub fn set_attributes(&self, attributes: Map<String, Value>) {
        let rejected = {
            let mut data = self.data.lock();
            if data.ended {
                Some(data.name.clone())
            } else {
                data.attributes.extend(attributes);
                None
            }
        };
        if let Some(name) = rejected {
            self.client
                .self_error(format!("span `{name}` already ended; attributes rejected"));
        }
    }

    /// A log handle bound to this span: logs are stamped with the span's
    /// ids and appended to the span's log buffer.
    pub fn log(&self) -> LogHandle {
        LogHandle::span_bound(self.client.clone(), self.clone())
    }

    /// Appends a log record; `false` when the span has already ended.
    pub(crate) fn append_log(&self, record: &LogRecord) -> bool {
        let mut data = self.data.lock();
        if data.ended {
            return false;
        }
        data.logs.push(record.clone());
        true
    }

    /// Ends the span and emits its signal. A second call is a no-op.
    pub fn end(&self) {
        let (id, record) = {
            let mut data = self.data.lock();
            if data.ended {
                return;
            }
            data.ended = true;
            let end_ns = self.client.now_ns();
            let record = SpanRecord {
                trace_id: data.trace_id.clone(),
                parent_span_id: data.parent_span_id.clone(),
                name: data.name.clone(),
                start_ns: data.start_ns,
                end_ns,
                duration_ns: end_ns - data.start_ns,
                attributes: data.attributes.clone(),
                logs: data.logs.clone(),
            };
            (data.id.clone(), record)
        };
        self.client.send_span(id, record);
    }

    /// The span's wire record as it stands; end fields hold [`PENDING_NS`]
    /// until the span ends.
    pub fn snapshot(&self) -> SpanRecord {
        let data = self.data.lock();
        SpanRecord {
            trace_id: data.trace_id.clone(),
            parent_span_id: data.parent_span_id.clone(),
            name: data.name.clone(),
            start_ns: data.start_ns,
            end_ns: PENDING_NS,
            duration_ns: PENDING_NS,
            attributes: data.attributes.clone(),
            logs: data.logs.clone(),
        }
    }
}

impl std::fmt::Debug for SpanHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.data.lock();
        f.debug_struct("SpanHandle")
            .field("id", &data.id)
            .field("name", &data.name)
            .field("ended", &data.ended)
            .finish()
    }
}

/// Ends the span when dropped, so traced bodies end their span on every
/// exit path, panics included.
pub(crate) struct SpanGuard(pub(crate) SpanHandle);

impl Drop for SpanGuard {
    fn drop(&mut self) {
        self.0.end();
    }
}
