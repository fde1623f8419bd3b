//! Consumer fan-out.
//!
//! Every registered consumer owns its own [`AsyncQueue`] and a dedicated
//! drain task, so a slow sink never blocks the producing call site or its
//! peers. Signals are enqueued, not delivered synchronously.

use std::sync::{Arc, Weak};

use plugin_api::signal::Signal;

use crate::queue::AsyncQueue;
use crate::Shared;

/// A telemetry sink.
pub trait Consumer: Send + Sync + 'static {
    /// Short name used in diagnostics.
    fn name(&self) -> &str {
        "consumer"
    }

    /// Receives one signal from the consumer's queue, in enqueue order.
    fn consume(&self, signal: Signal);

    /// Whether the consumer is still working on signals it already dequeued.
    /// Consulted, together with queue depth, by
    /// [`TelemetryClient::flush_consumers`](crate::TelemetryClient::flush_consumers).
    fn is_processing(&self) -> bool {
        false
    }
}

pub(crate) struct ConsumerEntry {
    pub(crate) id: u64,
    pub(crate) queue: Arc<AsyncQueue<Signal>>,
    pub(crate) consumer: Arc<dyn Consumer>,
}

/// Detaches the consumer when asked. Dropping the registration without
/// calling [`unregister`](ConsumerRegistration::unregister) leaves the
/// consumer attached for the lifetime of the client.
#[must_use = "holds the handle needed to unregister the consumer"]
pub struct ConsumerRegistration {
    pub(crate) id: u64,
    pub(crate) shared: Weak<Shared>,
}

impl ConsumerRegistration {
    /// Removes the consumer and stops its queue; anything still queued for
    /// it is discarded.
    pub fn unregister(self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let mut consumers = shared.consumers.write();
        if let Some(index) = consumers.iter().position(|entry| entry.id == self.id) {
            let entry = consumers.swap_remove(index);
            entry.queue.stop();
            tracing::debug!(consumer = entry.consumer.name(), "consumer unregistered");
        }
    }
}

pub(crate) async fn drain(queue: Arc<AsyncQueue<Signal>>, consumer: Arc<dyn Consumer>) {
    while let Some(signal) = queue.recv().await {
        consumer.consume(signal);
    }
    tracing::debug!(consumer = consumer.name(), "consumer queue drained");
}
