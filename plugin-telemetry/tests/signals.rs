//! End-to-end tests for the telemetry pipeline: spans, logs, metrics, the
//! sending-path validation, and consumer flushing.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map};

use plugin_api::signal::{LogLevel, MetricKind, MetricValue, Signal};
use plugin_telemetry::{HistogramSummary, LogInput, TelemetryClient, TraceOptions};

mod support;
use support::{collected_client, flush, Collector};

#[tokio::test]
async fn spans_nest_through_async_suspensions() {
    let (client, collector) = collected_client();

    client
        .trace("outer", TraceOptions::default(), |_outer| {
            let client = client.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                client.trace_sync("inner-sync", TraceOptions::default(), |_span| {});
            }
        })
        .await;

    flush(&client).await;
    let spans = collector.spans();
    assert_eq!(spans.len(), 2);

    let inner = spans.iter().find(|s| s.name == "inner-sync").unwrap();
    let outer = spans.iter().find(|s| s.name == "outer").unwrap();

    let outer_id = {
        let signals = collector.signals();
        signals
            .iter()
            .find_map(|signal| match signal {
                Signal::Span { meta, record } if record.name == "outer" => Some(meta.id.clone()),
                _ => None,
            })
            .unwrap()
    };

    assert_eq!(inner.parent_span_id.as_deref(), Some(outer_id.as_str()));
    assert_eq!(inner.trace_id, outer.trace_id);
    assert!(outer.end_ns > inner.end_ns);
    assert!(outer.duration_ns == outer.end_ns - outer.start_ns);
    assert!(inner.end_ns >= inner.start_ns);
}

#[tokio::test]
async fn explicit_parent_wins_over_ambient() {
    let (client, collector) = collected_client();

    let root = client.start_span("root", TraceOptions::default());
    let options = TraceOptions::default().parent(root.context());
    client
        .trace("child", options, |_span| async move {})
        .await;
    root.end();

    flush(&client).await;
    let spans = collector.spans();
    let child = spans.iter().find(|s| s.name == "child").unwrap();
    assert_eq!(child.trace_id, root.trace_id());
    assert_eq!(child.parent_span_id.as_deref(), Some(root.id().as_str()));
}

#[tokio::test]
async fn each_span_is_emitted_exactly_once() {
    let (client, collector) = collected_client();

    let span = client.start_span("once", TraceOptions::default());
    span.end();
    span.end();

    flush(&client).await;
    assert_eq!(collector.spans().len(), 1);
}

#[tokio::test]
async fn mutating_an_ended_span_self_reports() {
    let (client, collector) = collected_client();

    let span = client.start_span("done", TraceOptions::default());
    span.end();
    span.set_attribute("late", 1);
    span.log().info("too late");

    flush(&client).await;
    let spans = collector.spans();
    assert_eq!(spans.len(), 1);
    assert!(spans[0].attributes.is_empty());
    assert!(spans[0].logs.is_empty());

    let errors = collector.logs();
    assert!(errors
        .iter()
        .any(|log| log.level == LogLevel::Error && log.message.contains("already ended")));
}

#[tokio::test]
async fn span_bound_logs_are_buffered_on_the_span() {
    let (client, collector) = collected_client();

    client
        .trace("work", TraceOptions::default(), |span| async move {
            span.log().info("step one");
            span.log().warn("step two");
        })
        .await;

    flush(&client).await;
    let spans = collector.spans();
    assert_eq!(spans[0].logs.len(), 2);
    assert_eq!(spans[0].logs[0].message, "step one");
    // The same logs also flow as standalone signals, stamped with the span.
    let logs = collector.logs();
    assert_eq!(logs.len(), 2);
    assert!(logs.iter().all(|log| log.span_id.is_some()));
}

#[tokio::test]
async fn empty_log_input_is_rejected() {
    let (client, collector) = collected_client();

    client.log().info(LogInput::default());

    flush(&client).await;
    let logs = collector.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].level, LogLevel::Error);
    assert!(logs[0].message.contains("log rejected"));
}

#[tokio::test]
async fn logs_synthesize_a_stack() {
    let (client, collector) = collected_client();

    client.log().error(LogInput::from_error(
        &std::io::Error::new(std::io::ErrorKind::Other, "boom"),
    ));

    flush(&client).await;
    let logs = collector.logs();
    assert_eq!(logs[0].message, "boom");
    assert!(!logs[0].stack.is_empty());
    assert!(logs[0].error.as_ref().unwrap().stack.is_some());
}

#[tokio::test]
async fn metric_kinds_reach_consumers() {
    let (client, collector) = collected_client();

    client.counter("emitted").increment();
    client.counter("emitted").add(4u64);
    client.updown("in_flight").increment();
    client.updown("in_flight").remove(3i64);
    client.histogram("latency_ms").record(12u64);

    flush(&client).await;
    let metrics = collector.metrics();
    assert_eq!(metrics.len(), 5);
    assert_eq!(metrics[0].kind, MetricKind::Counter);
    assert_eq!(metrics[1].value, MetricValue::UInt(4));
    assert_eq!(metrics[3].kind, MetricKind::Updown);
    assert_eq!(metrics[3].value, MetricValue::Int(-3));
    assert_eq!(metrics[4].kind, MetricKind::Histogram);
}

#[tokio::test]
async fn negative_counter_values_are_accepted_but_logged() {
    let (client, collector) = collected_client();

    client.counter("oops").add(-2i64);

    flush(&client).await;
    let metrics = collector.metrics();
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].value, MetricValue::Int(-2));
    assert!(collector
        .logs()
        .iter()
        .any(|log| log.level == LogLevel::Warn && log.message.contains("negative")));
}

#[tokio::test]
async fn client_attributes_merge_under_record_attributes() {
    let (client, collector) = collected_client();
    client.set_attribute("deployment", "test");
    client.set_attribute("shared", "client");

    let mut attributes = Map::new();
    attributes.insert("shared".into(), json!("record"));
    client.counter("hits").add_with(1u64, attributes);

    flush(&client).await;
    let metrics = collector.metrics();
    assert_eq!(metrics[0].attributes["deployment"], json!("test"));
    assert_eq!(metrics[0].attributes["shared"], json!("record"));
}

#[tokio::test]
async fn oversized_signals_are_dropped_with_a_self_error() {
    let (client, collector) = collected_client();

    let huge = "x".repeat(plugin_api::signal::MAX_SIGNAL_BYTES);
    client.log().info(huge);

    flush(&client).await;
    let logs = collector.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].level, LogLevel::Error);
    assert!(logs[0].message.contains("byte cap"));
}

#[tokio::test]
async fn unknown_scopes_are_rejected_on_send() {
    let client = TelemetryClient::builder().scope("no.such.scope").build();
    let collector = Collector::new();
    let _ = client.register_consumer(collector.clone());

    client.log().info("hello");

    flush(&client).await;
    let logs = collector.logs();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].message.contains("unknown telemetry scope"));
}

#[tokio::test]
async fn child_scopes_require_their_attributes() {
    let (client, collector) = collected_client();

    // A plugin.server child without the required attributes: rejected.
    let bare = client.child("plugin.server", std::iter::empty());
    bare.log().info("hello");
    flush(&client).await;
    assert!(collector
        .logs()
        .iter()
        .any(|log| log.message.contains("requires attribute")));

    // With the attributes supplied, the signal goes through.
    let scoped = client.child(
        "plugin.server",
        [
            ("plugin.name".to_owned(), json!("chat")),
            ("agent.id".to_owned(), json!("agent-1")),
        ],
    );
    scoped.log().info("ready");
    flush(&client).await;
    let ready = collector
        .logs()
        .into_iter()
        .find(|log| log.message == "ready")
        .unwrap();
    assert_eq!(ready.attributes["plugin.name"], json!("chat"));
    assert_eq!(ready.attributes["agent.id"], json!("agent-1"));
}

#[tokio::test]
async fn flush_reports_expiry_without_error() {
    struct Stuck;
    impl plugin_telemetry::Consumer for Stuck {
        fn consume(&self, _signal: Signal) {}
        fn is_processing(&self) -> bool {
            true
        }
    }

    let client = TelemetryClient::builder().scope("telemetry").build();
    let _ = client.register_consumer(Arc::new(Stuck));
    assert!(!client.flush_consumers(Duration::from_millis(120)).await);
}

#[tokio::test]
async fn unregistering_detaches_the_consumer() {
    let client = TelemetryClient::builder().scope("telemetry").build();
    let collector = Collector::new();
    let registration = client.register_consumer(collector.clone());

    client.log().info("before");
    flush(&client).await;
    registration.unregister();

    client.log().info("after");
    flush(&client).await;
    let logs = collector.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].message, "before");
}

#[tokio::test]
async fn histogram_summary_answers_percentiles() {
    let client = TelemetryClient::builder().scope("telemetry").build();
    let summary = Arc::new(HistogramSummary::new());
    let _ = client.register_consumer(summary.clone());

    for value in [1u64, 2, 3, 4, 100] {
        client.histogram("latency_ms").record(value);
    }

    flush(&client).await;
    assert_eq!(summary.count("latency_ms"), 5);
    assert!(summary.percentile("latency_ms", 1.0).unwrap() >= 100);
    assert!(summary.percentile("latency_ms", 0.5).unwrap() <= 4);
    assert_eq!(summary.count("unknown"), 0);
}

#[tokio::test]
async fn recorder_writes_newline_delimited_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("signals.ndjson");

    let client = TelemetryClient::builder()
        .scope("telemetry")
        .recording_path(&path)
        .build();
    client.log().info("recorded");
    flush(&client).await;

    // The IO worker flushes after each drain; give it a moment.
    let mut contents = String::new();
    for _ in 0..50 {
        contents = std::fs::read_to_string(&path).unwrap_or_default();
        if contents.lines().count() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let mut lines = contents.lines();
    let header: serde_json::Value = serde_json::from_str(lines.next().unwrap()).unwrap();
    assert_eq!(header["v"], json!(1));
    let signal: Signal = serde_json::from_str(lines.next().unwrap()).unwrap();
    match signal {
        Signal::Log { record, .. } => assert_eq!(record.message, "recorded"),
        other => panic!("expected a log signal, got {other:?}"),
    }
}
