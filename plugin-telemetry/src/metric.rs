//! Metric handles: monotonic counters, signed up-down counters, and
//! histograms.

use serde_json::{Map, Value};

use plugin_api::signal::{MetricKind, MetricValue};

use crate::TelemetryClient;

/// A monotonic counter. Negative values are accepted but logged; monotonicity
/// is not enforced.
#[derive(Clone, Debug)]
pub struct Counter {
    client: TelemetryClient,
    name: String,
}

impl Counter {
    pub(crate) fn new(client: TelemetryClient, name: String) -> Self {
        Self { client, name }
    }

    pub fn add(&self, value: impl Into<MetricValue>) {
        self.add_with(value, Map::new());
    }

    pub fn add_with(&self, value: impl Into<MetricValue>, attributes: Map<String, Value>) {
        let value = value.into();
        if value.is_negative() {
            self.client.log().warn(format!(
                "counter `{}` received a negative value ({})",
                self.name,
                value.as_f64()
            ));
        }
        self.client
            .send_metric(MetricKind::Counter, self.name.clone(), value, attributes);
    }

    pub fn increment(&self) {
        self.add(1u64);
    }

    pub fn increment_with(&self, attributes: Map<String, Value>) {
        self.add_with(1u64, attributes);
    }
}

/// A signed counter; `remove(n)` records `-n`.
#[derive(Clone, Debug)]
pub struct UpDown {
    client: TelemetryClient,
    name: String,
}

impl UpDown {
    pub(crate) fn new(client: TelemetryClient, name: String) -> Self {
        Self { client, name }
    }

    pub fn add(&self, value: impl Into<MetricValue>) {
        self.add_with(value, Map::new());
    }

    pub fn add_with(&self, value: impl Into<MetricValue>, attributes: Map<String, Value>) {
        self.client
            .send_metric(MetricKind::Updown, self.name.clone(), value.into(), attributes);
    }

    pub fn remove(&self, value: impl Into<MetricValue>) {
        self.add(value.into().negated());
    }

    pub fn increment(&self) {
        self.add(1i64);
    }

    pub fn decrement(&self) {
        self.add(-1i64);
    }
}

/// A histogram of recorded values.
#[derive(Clone, Debug)]
pub struct Histogram {
    client: TelemetryClient,
    name: String,
}

impl Histogram {
    pub(crate) fn new(client: TelemetryClient, name: String) -> Self {
        Self { client, name }
    }

    pub fn record(&self, value: impl Into<MetricValue>) {
        self.record_with(value, Map::new());
    }

    pub fn record_with(&self, value: impl Into<MetricValue>, attributes: Map<String, Value>) {
        self.client.send_metric(
            MetricKind::Histogram,
            self.name.clone(),
            value.into(),
            attributes,
        );
    }
}
