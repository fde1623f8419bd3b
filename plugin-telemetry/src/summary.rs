use std::collections::HashMap;

use hdrhistogram::Histogram;

use plugin_api::signal::{MetricKind, Signal};

use crate::consumer::Consumer;
use crate::sync::Mutex;

/// Two significant figures keeps per-name memory modest while staying well
/// within useful percentile accuracy.
const SIGFIG: u8 = 2;

/// A [`Consumer`] that folds `histogram` metric signals into per-name
/// [`hdrhistogram::Histogram`]s and answers percentile queries.
///
/// Negative and non-finite values cannot be represented and are dropped.
#[derive(Default)]
pub struct HistogramSummary {
    histograms: Mutex<HashMap<String, Histogram<u64>>>,
}

impl HistogramSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// The value at quantile `q` (`0.0..=1.0`) for the named histogram.
    pub fn percentile(&self, name: &str, q: f64) -> Option<u64> {
        self.histograms
            .lock()
            .get(name)
            .map(|histogram| histogram.value_at_quantile(q))
    }

    /// Total recorded values for the named histogram.
    pub fn count(&self, name: &str) -> u64 {
        self.histograms
            .lock()
            .get(name)
            .map(|histogram| histogram.len())
            .unwrap_or(0)
    }
}

impl Consumer for HistogramSummary {
    fn name(&self) -> &str {
        "histogram-summary"
    }

    fn consume(&self, signal: Signal) {
        let Signal::Metric { record, .. } = signal else {
            return;
        };
        if record.kind != MetricKind::Histogram {
            return;
        }
        let value = record.value.as_f64();
        if !value.is_finite() || value < 0.0 {
            tracing::debug!(
                metric = %record.name,
                value,
                "histogram value cannot be represented; dropped"
            );
            return;
        }
        let mut histograms = self.histograms.lock();
        let histogram = match histograms.entry(record.name) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => match Histogram::new(SIGFIG) {
                Ok(histogram) => entry.insert(histogram),
                Err(_) => return,
            },
        };
        if histogram.record(value as u64).is_err() {
            let _ = histogram.record(histogram.high());
        }
    }
}
