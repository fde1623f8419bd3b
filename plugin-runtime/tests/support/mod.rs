#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use plugin_api::signal::{LogLevel, LogRecord, Signal, SpanRecord};
use plugin_runtime::{Host, LoopbackTransport};
use plugin_telemetry::{Consumer, TelemetryClient};

/// Records strings from callbacks so tests can assert ordering.
#[derive(Clone, Default)]
pub struct Probe {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Probe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    /// Polls until at least `count` entries are recorded; panics after two
    /// seconds.
    pub async fn wait_for(&self, count: usize) -> Vec<String> {
        for _ in 0..200 {
            let entries = self.entries();
            if entries.len() >= count {
                return entries;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "probe never reached {count} entries; got {:?}",
            self.entries()
        );
    }

    /// Polls until the entry set stops growing for a few ticks.
    pub async fn settled(&self) -> Vec<String> {
        let mut last = self.entries();
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(15)).await;
            let now = self.entries();
            if now.len() == last.len() {
                return now;
            }
            last = now;
        }
        last
    }
}

/// A telemetry consumer keeping every signal for assertions.
#[derive(Default)]
pub struct Collector {
    signals: Mutex<Vec<Signal>>,
}

impl Collector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn spans(&self) -> Vec<SpanRecord> {
        self.signals
            .lock()
            .unwrap()
            .iter()
            .filter_map(|signal| match signal {
                Signal::Span { record, .. } => Some(record.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn logs(&self) -> Vec<LogRecord> {
        self.signals
            .lock()
            .unwrap()
            .iter()
            .filter_map(|signal| match signal {
                Signal::Log { record, .. } => Some(record.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn error_logs(&self) -> Vec<LogRecord> {
        self.logs()
            .into_iter()
            .filter(|log| log.level >= LogLevel::Error)
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

/// A host over a loopback transport, with a signal collector attached.
pub fn test_host() -> (Arc<Host>, Arc<LoopbackTransport>, Arc<Collector>) {
    let telemetry = TelemetryClient::new();
    let collector = Collector::new();
    let _ = telemetry.register_consumer(collector.clone());
    let transport = LoopbackTransport::new();
    let host = Host::with_agent_id(transport.clone(), telemetry, "agent-test");
    (host, transport, collector)
}

/// Flushes the host's telemetry consumers.
pub async fn flush_telemetry(host: &Host) {
    assert!(
        host.telemetry()
            .flush_consumers(Duration::from_secs(5))
            .await,
        "telemetry consumers did not drain"
    );
}

/// Lets spawned pipeline tasks make progress.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(60)).await;
}
