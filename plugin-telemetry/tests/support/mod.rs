use std::sync::{Arc, Mutex};
use std::time::Duration;

use plugin_api::signal::{LogRecord, MetricRecord, Signal, SpanRecord};
use plugin_telemetry::{Consumer, TelemetryClient};

/// A consumer that keeps every signal it receives, for assertions.
#[derive(Default)]
pub struct Collector {
    signals: Mutex<Vec<Signal>>,
}

impl Collector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.signals.lock().unwrap().clone()
    }

    pub fn spans(&self) -> Vec<SpanRecord> {
        self.signals()
            .into_iter()
            .filter_map(|signal| match signal {
                Signal::Span { record, .. } => Some(record),
                _ => None,
            })
            .collect()
    }

    pub fn logs(&self) -> Vec<LogRecord> {
        self.signals()
            .into_iter()
            .filter_map(|signal| match signal {
                Signal::Log { record, .. } => Some(record),
                _ => None,
            })
            .collect()
    }

    pub fn metrics(&self) -> Vec<MetricRecord> {
        self.signals()
            .into_iter()
            .filter_map(|signal| match signal {
                Signal::Metric { record, .. } => Some(record),
                _ => None,
            })
            .collect()
    }
}

impl Consumer for Collector {
    fn name(&self) -> &str {
        "collector"
    }

    fn consume(&self, signal: Signal) {
        self.signals.lock().unwrap().push(signal);
    }
}

/// A telemetry client with an attached [`Collector`].
pub fn collected_client() -> (TelemetryClient, Arc<Collector>) {
    let client = TelemetryClient::builder().scope("telemetry").build();
    let collector = Collector::new();
    let _ = client.register_consumer(collector.clone());
    (client, collector)
}

/// Flushes and panics if the consumers do not drain promptly.
pub async fn flush(client: &TelemetryClient) {
    assert!(
        client.flush_consumers(Duration::from_secs(5)).await,
        "telemetry consumers did not drain within the timeout"
    );
}
