//! The telemetry core of the plugin runtime.
//!
//! A [`TelemetryClient`] provides structured logs, spans with ambient parent
//! tracking, and metrics to the rest of the runtime, and fans every signal
//! out to registered [`Consumer`]s over per-consumer async queues. Signals
//! are validated, stamped with client attributes, and size-checked on the
//! sending path; failures are self-reported as telemetry errors and never
//! thrown to callers.
//!
//! ```
//! # #[tokio::main(flavor = "current_thread")] async fn main() {
//! let telemetry = plugin_telemetry::TelemetryClient::builder()
//!     .scope("runtime.host")
//!     .build();
//!
//! let total = telemetry
//!     .trace("load", Default::default(), |span| async move {
//!         span.set_attribute("source", "disk");
//!         span.log().info("loading");
//!         21 + 21
//!     })
//!     .await;
//! assert_eq!(total, 42);
//! # }
//! ```

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering::*};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use plugin_api::schema::{Schema, SchemaError};
use plugin_api::signal::{
    required_attributes, signal_schema, LogRecord, MetricKind, MetricRecord, MetricValue,
    Resource, Signal, SignalMeta, SpanRecord, MAX_SIGNAL_BYTES, SCHEMA_VERSION,
};

mod consumer;
mod log;
mod metric;
pub mod queue;
mod recorder;
mod span;
mod summary;
pub(crate) mod sync;

pub use consumer::{Consumer, ConsumerRegistration};
pub use log::{LogHandle, LogInput};
pub use metric::{Counter, Histogram, UpDown};
pub use queue::AsyncQueue;
pub use recorder::Recorder;
pub use span::{ambient_span, SpanContext, SpanHandle, TraceOptions};
pub use summary::HistogramSummary;

use span::{SpanData, SpanGuard};

static SIGNAL_SCHEMA: Lazy<Schema> = Lazy::new(signal_schema);

/// Handle to the telemetry pipeline. Cloning is cheap; clones and
/// [children](TelemetryClient::child) share the consumer set and resource
/// description.
#[derive(Clone)]
pub struct TelemetryClient {
    shared: Arc<Shared>,
    scope: String,
    attributes: Arc<sync::RwLock<Map<String, Value>>>,
}

pub(crate) struct Shared {
    resource: Resource,
    consumers: sync::RwLock<Vec<consumer::ConsumerEntry>>,
    next_consumer_id: AtomicU64,
    anchor: TimeAnchor,
    flush_poll_interval: Duration,
    in_self_error: AtomicBool,
}

/// Anchors monotonic readings to a base `SystemTime`, producing wall-clock
/// timestamps that cannot run backwards.
struct TimeAnchor {
    base_time: SystemTime,
    base_instant: Instant,
}

impl TimeAnchor {
    fn new() -> Self {
        Self {
            base_time: SystemTime::now(),
            base_instant: Instant::now(),
        }
    }

    fn now(&self) -> SystemTime {
        self.base_time + self.base_instant.elapsed()
    }

    fn now_ns(&self) -> i64 {
        self.now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0)
    }

    fn now_ms(&self) -> u64 {
        self.now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

#[derive(Debug, Error)]
enum SendError {
    #[error("signal failed schema validation: {0}")]
    Schema(#[from] SchemaError),
    #[error("unknown telemetry scope `{0}`")]
    UnknownScope(String),
    #[error("scope `{scope}` requires attribute `{key}`")]
    MissingAttribute { scope: String, key: &'static str },
    #[error("signal is not serializable: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("signal did not survive a serialization round trip")]
    RoundTrip,
    #[error("serialized signal is {0} bytes, above the {MAX_SIGNAL_BYTES} byte cap")]
    TooLarge(usize),
}

impl TelemetryClient {
    /// Default cadence at which [`flush_consumers`](Self::flush_consumers)
    /// polls consumer queues.
    pub const DEFAULT_FLUSH_POLL_INTERVAL: Duration = Duration::from_millis(50);

    /// Returns a `TelemetryClient` built with the default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> Builder {
        Builder::default()
    }

    fn build(builder: Builder) -> Self {
        tracing::debug!(
            scope = %builder.scope,
            ?builder.flush_poll_interval,
            ?builder.recording_path,
            "configured telemetry client"
        );
        let client = Self {
            shared: Arc::new(Shared {
                resource: builder.resource,
                consumers: sync::RwLock::new(Vec::new()),
                next_consumer_id: AtomicU64::new(0),
                anchor: TimeAnchor::new(),
                flush_poll_interval: builder.flush_poll_interval,
                in_self_error: AtomicBool::new(false),
            }),
            scope: builder.scope,
            attributes: Arc::new(sync::RwLock::new(builder.attributes)),
        };
        if let Some(path) = &builder.recording_path {
            match Recorder::new(path) {
                Ok(recorder) => {
                    // Dropping the registration leaves the recorder attached
                    // for the client's lifetime.
                    let _ = client.register_consumer(Arc::new(recorder));
                }
                Err(error) => {
                    eprintln!("failed to create signal recorder at {path:?}: {error}");
                }
            }
        }
        client
    }

    /// Derives a client with a new scope. The given attributes — typically
    /// the ones the scope requires — are merged over this client's.
    pub fn child(
        &self,
        scope: impl Into<String>,
        required_attributes: impl IntoIterator<Item = (String, Value)>,
    ) -> TelemetryClient {
        let mut attributes = self.attributes.read().clone();
        attributes.extend(required_attributes);
        TelemetryClient {
            shared: Arc::clone(&self.shared),
            scope: scope.into(),
            attributes: Arc::new(sync::RwLock::new(attributes)),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Sets a client-level attribute, merged into every outgoing signal.
    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.write().insert(key.into(), value.into());
    }

    pub fn set_attributes(&self, attributes: Map<String, Value>) {
        self.attributes.write().extend(attributes);
    }

    /// An unbound log handle.
    pub fn log(&self) -> LogHandle {
        LogHandle::new(self.clone())
    }

    pub fn counter(&self, name: impl Into<String>) -> Counter {
        Counter::new(self.clone(), name.into())
    }

    pub fn updown(&self, name: impl Into<String>) -> UpDown {
        UpDown::new(self.clone(), name.into())
    }

    pub fn histogram(&self, name: impl Into<String>) -> Histogram {
        Histogram::new(self.clone(), name.into())
    }

    /// Starts a span without installing it as the ambient span. Most callers
    /// want [`trace`](Self::trace) or [`trace_sync`](Self::trace_sync).
    pub fn start_span(&self, name: impl Into<String>, options: TraceOptions) -> SpanHandle {
        let parent = options.parent.or_else(span::ambient_span);
        let (trace_id, parent_span_id) = match parent {
            Some(ctx) => (ctx.trace_id, Some(ctx.span_id)),
            None => (Uuid::new_v4().to_string(), None),
        };
        SpanHandle::new(
            self.clone(),
            SpanData {
                id: Uuid::new_v4().to_string(),
                trace_id,
                parent_span_id,
                name: name.into(),
                start_ns: self.now_ns(),
                attributes: options.attributes,
                logs: Vec::new(),
                ended: false,
            },
        )
    }

    /// Runs `f` under a new span, installed as the ambient span for the
    /// duration of the returned future. The span ends when the future
    /// settles; panics propagate after the span has ended.
    pub async fn trace<F, Fut, T>(&self, name: impl Into<String>, options: TraceOptions, f: F) -> T
    where
        F: FnOnce(SpanHandle) -> Fut,
        Fut: Future<Output = T>,
    {
        let span = self.start_span(name, options);
        let ctx = span.context();
        let _guard = SpanGuard(span.clone());
        span::with_ambient(ctx, f(span)).await
    }

    /// [`trace`](Self::trace) for synchronous bodies.
    pub fn trace_sync<F, T>(&self, name: impl Into<String>, options: TraceOptions, f: F) -> T
    where
        F: FnOnce(SpanHandle) -> T,
    {
        let span = self.start_span(name, options);
        let ctx = span.context();
        let _guard = SpanGuard(span.clone());
        span::with_ambient_sync(ctx, || f(span))
    }

    /// Attaches a sink. Signals are enqueued on the consumer's own queue and
    /// drained by a dedicated task; registration therefore requires a tokio
    /// runtime.
    pub fn register_consumer(&self, consumer: Arc<dyn Consumer>) -> ConsumerRegistration {
        let id = self.shared.next_consumer_id.fetch_add(1, Relaxed);
        let queue = Arc::new(AsyncQueue::new());
        tracing::debug!(consumer = consumer.name(), id, "consumer registered");
        self.shared
            .consumers
            .write()
            .push(consumer::ConsumerEntry {
                id,
                queue: Arc::clone(&queue),
                consumer: Arc::clone(&consumer),
            });
        spawn_named(
            consumer::drain(queue, consumer),
            "plugin-telemetry/consumer",
        );
        ConsumerRegistration {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Polls every consumer's queue depth and
    /// [`is_processing`](Consumer::is_processing) on a 50 ms cadence until
    /// all report idle or the timeout expires. Returns whether everything
    /// drained in time; expiry is not an error.
    pub async fn flush_consumers(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let idle = {
                let consumers = self.shared.consumers.read();
                consumers
                    .iter()
                    .all(|entry| entry.queue.is_empty() && !entry.consumer.is_processing())
            };
            if idle {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let wait = self.shared.flush_poll_interval.min(deadline - now);
            tokio::time::sleep(wait).await;
        }
    }

    /// Enqueues a signal from another process verbatim, bypassing every
    /// check of the sending pipeline. Out of reach of ordinary callers; used
    /// only when forwarding already-validated signals.
    #[doc(hidden)]
    pub fn _unsafe_send_signal(&self, signal: Signal) {
        self.enqueue(signal);
    }

    // === internals ===

    pub(crate) fn now_ns(&self) -> i64 {
        self.shared.anchor.now_ns()
    }

    pub(crate) fn now_ms(&self) -> u64 {
        self.shared.anchor.now_ms()
    }

    fn meta(&self, id: String) -> SignalMeta {
        SignalMeta {
            id,
            schema_version: SCHEMA_VERSION.to_owned(),
            scope: self.scope.clone(),
            resource: self.shared.resource.clone(),
        }
    }

    pub(crate) fn send_log(&self, record: LogRecord) {
        let signal = Signal::Log {
            meta: self.meta(Uuid::new_v4().to_string()),
            record,
        };
        self.send_signal(signal);
    }

    pub(crate) fn send_span(&self, span_id: String, record: SpanRecord) {
        let signal = Signal::Span {
            meta: self.meta(span_id),
            record,
        };
        self.send_signal(signal);
    }

    pub(crate) fn send_metric(
        &self,
        kind: MetricKind,
        name: String,
        value: MetricValue,
        attributes: Map<String, Value>,
    ) {
        let signal = Signal::Metric {
            meta: self.meta(Uuid::new_v4().to_string()),
            record: MetricRecord {
                kind,
                name,
                value,
                attributes,
            },
        };
        self.send_signal(signal);
    }

    fn send_signal(&self, mut signal: Signal) {
        if let Err(error) = self.try_send(&mut signal) {
            self.self_error(error.to_string());
        }
    }

    fn try_send(&self, signal: &mut Signal) -> Result<(), SendError> {
        // Structural validation first, on the record as produced.
        let value = serde_json::to_value(&*signal)?;
        SIGNAL_SCHEMA.validate(&value)?;

        let required = required_attributes(signal.scope())
            .ok_or_else(|| SendError::UnknownScope(signal.scope().to_owned()))?;

        // Client attributes merge under the record's own.
        {
            let client_attributes = self.attributes.read();
            let attributes = signal.attributes_mut();
            for (key, attr) in client_attributes.iter() {
                if !attributes.contains_key(key) {
                    attributes.insert(key.clone(), attr.clone());
                }
            }
        }
        for key in required {
            if !signal.attributes().contains_key(*key) {
                return Err(SendError::MissingAttribute {
                    scope: signal.scope().to_owned(),
                    key,
                });
            }
        }

        let text = serde_json::to_string(&*signal)?;
        let round_tripped: Signal = serde_json::from_str(&text)?;
        if round_tripped != *signal {
            return Err(SendError::RoundTrip);
        }
        if text.len() >= MAX_SIGNAL_BYTES {
            return Err(SendError::TooLarge(text.len()));
        }

        self.enqueue(signal.clone());
        Ok(())
    }

    fn enqueue(&self, signal: Signal) {
        let consumers = self.shared.consumers.read();
        match consumers.len() {
            0 => {}
            1 => consumers[0].queue.push(signal),
            _ => {
                for entry in consumers.iter() {
                    entry.queue.push(signal.clone());
                }
            }
        }
    }

    /// Reports an internal telemetry failure as an error log signal. A
    /// failure while already reporting one falls back to stderr instead of
    /// recursing.
    pub(crate) fn self_error(&self, message: String) {
        if self.shared.in_self_error.swap(true, AcqRel) {
            eprintln!("telemetry self-error (suppressed): {message}");
            return;
        }
        tracing::warn!(%message, "telemetry self-error");
        let record = LogRecord {
            level: plugin_api::signal::LogLevel::Error,
            message_unstyled: message.clone(),
            message,
            attributes: Map::new(),
            timestamp: self.now_ms(),
            stack: std::backtrace::Backtrace::force_capture().to_string(),
            trace_id: None,
            span_id: None,
            error: None,
        };
        let signal = Signal::Log {
            meta: SignalMeta {
                id: Uuid::new_v4().to_string(),
                schema_version: SCHEMA_VERSION.to_owned(),
                scope: "telemetry".to_owned(),
                resource: self.shared.resource.clone(),
            },
            record,
        };
        self.enqueue(signal);
        self.shared.in_self_error.store(false, Release);
    }
}

impl Default for TelemetryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TelemetryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryClient")
            .field("scope", &self.scope)
            .field("consumers", &self.shared.consumers.read().len())
            .finish()
    }
}

/// Builder for configuring a [`TelemetryClient`].
#[derive(Clone, Debug)]
pub struct Builder {
    scope: String,
    resource: Resource,
    attributes: Map<String, Value>,
    flush_poll_interval: Duration,
    recording_path: Option<PathBuf>,
    filter_env_var: String,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            scope: "runtime.host".to_owned(),
            resource: Resource::host(),
            attributes: Map::new(),
            flush_poll_interval: TelemetryClient::DEFAULT_FLUSH_POLL_INTERVAL,
            recording_path: None,
            filter_env_var: "RUST_LOG".to_owned(),
        }
    }
}

impl Builder {
    /// Sets the scope stamped on every signal this client sends.
    pub fn scope(self, scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            ..self
        }
    }

    /// Overrides the detected host resource description.
    pub fn resource(self, resource: Resource) -> Self {
        Self { resource, ..self }
    }

    /// Adds a client-level attribute.
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Sets the cadence at which [`TelemetryClient::flush_consumers`] polls.
    pub fn flush_poll_interval(self, flush_poll_interval: Duration) -> Self {
        Self {
            flush_poll_interval,
            ..self
        }
    }

    /// Sets the path to record signals to the file system.
    pub fn recording_path(self, path: impl Into<PathBuf>) -> Self {
        Self {
            recording_path: Some(path.into()),
            ..self
        }
    }

    /// Sets the environment variable used to configure which `tracing`
    /// events [`init`](Self::init) logs to stdout.
    pub fn filter_env_var(self, filter_env_var: impl Into<String>) -> Self {
        Self {
            filter_env_var: filter_env_var.into(),
            ..self
        }
    }

    /// Configures this builder from a standard set of environment variables:
    ///
    /// | **Environment Variable**       | **Purpose**                              | **Default Value** |
    /// |--------------------------------|------------------------------------------|-------------------|
    /// | `PLUGIN_TELEMETRY_RECORD_PATH` | The file path to save a signal recording | None              |
    /// | `PLUGIN_TELEMETRY_FLUSH_POLL`  | Flush polling cadence, such as `50ms`    | 50ms              |
    pub fn with_default_env(mut self) -> Self {
        if let Ok(path) = std::env::var("PLUGIN_TELEMETRY_RECORD_PATH") {
            self.recording_path = Some(path.into());
        }
        if let Some(interval) = duration_from_env("PLUGIN_TELEMETRY_FLUSH_POLL") {
            self.flush_poll_interval = interval;
        }
        self
    }

    /// Completes the builder, returning a [`TelemetryClient`].
    pub fn build(self) -> TelemetryClient {
        TelemetryClient::build(self)
    }

    /// Completes the builder and additionally installs a
    /// [`tracing_subscriber::fmt`] layer logging the runtime's own
    /// diagnostics to stdout, filtered by the configured environment
    /// variable.
    ///
    /// # Panics
    ///
    /// If the default `tracing` subscriber has already been set.
    pub fn init(self) -> TelemetryClient {
        use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt, Layer};

        let fmt_filter = std::env::var(&self.filter_env_var)
            .ok()
            .and_then(|log_filter| match log_filter.parse::<filter::Targets>() {
                Ok(targets) => Some(targets),
                Err(e) => {
                    eprintln!(
                        "failed to parse filter environment variable `{}={:?}`: {}",
                        &self.filter_env_var, log_filter, e
                    );
                    None
                }
            })
            .unwrap_or_else(|| {
                "error"
                    .parse::<filter::Targets>()
                    .expect("`error` filter should always parse successfully")
            });

        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_filter(fmt_filter))
            .init();

        self.build()
    }
}

fn duration_from_env(var_name: &str) -> Option<Duration> {
    let var = std::env::var(var_name).ok()?;
    match var.parse::<humantime::Duration>() {
        Ok(dur) => Some(dur.into()),
        Err(e) => {
            eprintln!("failed to parse a duration from `{var_name}={var:?}`: {e}");
            None
        }
    }
}

#[track_caller]
pub(crate) fn spawn_named<T>(
    task: impl Future<Output = T> + Send + 'static,
    _name: &str,
) -> tokio::task::JoinHandle<T>
where
    T: Send + 'static,
{
    #[cfg(tokio_unstable)]
    return tokio::task::Builder::new()
        .name(_name)
        .spawn(task)
        .expect("spawning should not fail");

    #[cfg(not(tokio_unstable))]
    tokio::spawn(task)
}
