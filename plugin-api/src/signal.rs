//! Telemetry signal wire forms.
//!
//! Three discriminated variants — `log`, `span`, and `metric` — share the
//! common fields `{id, schemaVersion, scope, resource}`. The format is
//! stable and versioned by [`SCHEMA_VERSION`]; signals whose serialized form
//! reaches [`MAX_SIGNAL_BYTES`] are dropped at the sender.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::Schema;

/// Version tag carried by every signal.
pub const SCHEMA_VERSION: &str = "1";

/// Serialized signals at or above this size are dropped with a self-logged
/// validation error.
pub const MAX_SIGNAL_BYTES: usize = 1024 * 1024;

/// Sentinel for `endNs`/`durationNs` on a span that has not ended.
pub const PENDING_NS: i64 = -1;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Updown,
    Histogram,
}

/// A metric measurement: integer, unsigned, or floating point.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    UInt(u64),
    Int(i64),
    Float(f64),
}

impl MetricValue {
    pub fn is_negative(&self) -> bool {
        match self {
            MetricValue::UInt(_) => false,
            MetricValue::Int(v) => *v < 0,
            MetricValue::Float(v) => *v < 0.0,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            MetricValue::UInt(v) => *v as f64,
            MetricValue::Int(v) => *v as f64,
            MetricValue::Float(v) => *v,
        }
    }

    pub fn negated(&self) -> MetricValue {
        match self {
            MetricValue::UInt(v) => MetricValue::Int(-(*v as i64)),
            MetricValue::Int(v) => MetricValue::Int(-v),
            MetricValue::Float(v) => MetricValue::Float(-v),
        }
    }
}

impl From<u64> for MetricValue {
    fn from(v: u64) -> Self {
        MetricValue::UInt(v)
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Int(v)
    }
}

impl From<i32> for MetricValue {
    fn from(v: i32) -> Self {
        MetricValue::Int(v.into())
    }
}

impl From<u32> for MetricValue {
    fn from(v: u32) -> Self {
        MetricValue::UInt(v.into())
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Float(v)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// A server-side host process.
    Node,
    /// A browser-hosted mirror; kept for wire compatibility.
    Browser,
}

/// Description of the process producing signals.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub platform: Platform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpus: Option<u32>,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

impl Resource {
    /// Describes the current host process.
    pub fn host() -> Self {
        Self {
            platform: Platform::Node,
            os: Some(std::env::consts::OS.to_owned()),
            arch: Some(std::env::consts::ARCH.to_owned()),
            cpus: std::thread::available_parallelism()
                .ok()
                .map(|n| n.get() as u32),
            extra: Map::new(),
        }
    }
}

/// A captured error attached to a log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    pub message_unstyled: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
    /// Unix milliseconds.
    pub timestamp: u64,
    pub stack: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanRecord {
    pub trace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    pub name: String,
    pub start_ns: i64,
    /// [`PENDING_NS`] until the span ends.
    pub end_ns: i64,
    /// [`PENDING_NS`] until the span ends.
    pub duration_ns: i64,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<LogRecord>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRecord {
    pub kind: MetricKind,
    pub name: String,
    pub value: MetricValue,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}

/// Fields shared by every signal variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalMeta {
    pub id: String,
    pub schema_version: String,
    pub scope: String,
    pub resource: Resource,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "lowercase")]
pub enum Signal {
    Log {
        #[serde(flatten)]
        meta: SignalMeta,
        #[serde(flatten)]
        record: LogRecord,
    },
    Span {
        #[serde(flatten)]
        meta: SignalMeta,
        #[serde(flatten)]
        record: SpanRecord,
    },
    Metric {
        #[serde(flatten)]
        meta: SignalMeta,
        #[serde(flatten)]
        record: MetricRecord,
    },
}

impl Signal {
    pub fn meta(&self) -> &SignalMeta {
        match self {
            Signal::Log { meta, .. } | Signal::Span { meta, .. } | Signal::Metric { meta, .. } => {
                meta
            }
        }
    }

    pub fn id(&self) -> &str {
        &self.meta().id
    }

    pub fn scope(&self) -> &str {
        &self.meta().scope
    }

    /// The variant's attribute map; client attributes are merged here on the
    /// sending path.
    pub fn attributes_mut(&mut self) -> &mut Map<String, Value> {
        match self {
            Signal::Log { record, .. } => &mut record.attributes,
            Signal::Span { record, .. } => &mut record.attributes,
            Signal::Metric { record, .. } => &mut record.attributes,
        }
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        match self {
            Signal::Log { record, .. } => &record.attributes,
            Signal::Span { record, .. } => &record.attributes,
            Signal::Metric { record, .. } => &record.attributes,
        }
    }
}

/// Known signal scopes and the attribute keys each one requires.
pub const SCOPES: &[(&str, &[&str])] = &[
    ("runtime.host", &[]),
    ("plugin.server", &["plugin.name", "agent.id"]),
    ("plugin.client", &["plugin.name"]),
    ("telemetry", &[]),
    ("telemetry.consumer", &[]),
];

/// The attribute keys a scope requires, or `None` for an unknown scope.
pub fn required_attributes(scope: &str) -> Option<&'static [&'static str]> {
    SCOPES
        .iter()
        .find(|(name, _)| *name == scope)
        .map(|(_, required)| *required)
}

/// Structural schema every outgoing signal is validated against.
pub fn signal_schema() -> Schema {
    let attributes = Schema::map(Schema::Any);
    let resource = Schema::object()
        .field("platform", Schema::one_of(["node", "browser"]))
        .allow_unknown()
        .build();
    let meta = |schema: crate::schema::ObjectSchema| {
        schema
            .field("id", Schema::String)
            .field("schemaVersion", Schema::literal(SCHEMA_VERSION))
            .field("scope", Schema::String)
            .field("resource", resource.clone())
            .optional_field("attributes", attributes.clone())
    };
    let error_detail = Schema::object()
        .optional_field("name", Schema::String)
        .field("message", Schema::String)
        .optional_field("stack", Schema::String)
        .build();
    let log_fields = |schema: crate::schema::ObjectSchema| {
        schema
            .field("level", Schema::one_of(["debug", "info", "warn", "error", "fatal"]))
            .field("message", Schema::String)
            .field("messageUnstyled", Schema::String)
            .field("timestamp", Schema::Integer)
            .field("stack", Schema::String)
            .optional_field("traceId", Schema::String)
            .optional_field("spanId", Schema::String)
            .optional_field("error", error_detail.clone())
    };
    let log = log_fields(meta(Schema::object()).field("signal", Schema::literal("log"))).build();
    let span_log = log_fields(
        Schema::object().optional_field("attributes", attributes.clone()),
    )
    .build();
    let span = meta(Schema::object())
        .field("signal", Schema::literal("span"))
        .field("traceId", Schema::String)
        .optional_field("parentSpanId", Schema::String)
        .field("name", Schema::String)
        .field("startNs", Schema::Integer)
        .field("endNs", Schema::Integer)
        .field("durationNs", Schema::Integer)
        .optional_field("logs", Schema::array(span_log))
        .build();
    let metric = meta(Schema::object())
        .field("signal", Schema::literal("metric"))
        .field("kind", Schema::one_of(["counter", "updown", "histogram"]))
        .field("name", Schema::String)
        .field("value", Schema::Number)
        .build();
    Schema::union([log, span, metric])
}
