//! Cross-plugin interception.
//!
//! When plugin C depends on plugin D, every interceptor C declares is
//! attached to D at start. Interceptors observe D's in-flight events in
//! registration order, strictly sequentially, inside C's telemetry scope.
//! An interceptor may replace the event for all later stages or drop it;
//! a drop takes effect after the current interceptor returns.

use std::sync::{Arc, Weak};

use plugin_api::event::EventEnvelope;
use plugin_telemetry::SpanHandle;

use crate::deps::DependencyView;
use crate::server::PluginServer;

pub type InterceptorFn = Arc<dyn Fn(&mut InterceptorScope<'_>) + Send + Sync>;

/// The interceptor's view of one in-flight event.
pub struct InterceptorScope<'a> {
    event: &'a EventEnvelope,
    outcome: &'a mut Interception,
    /// Read-only view of the plugin whose event this is.
    pub dependency: DependencyView,
    /// Read-only view of the intercepting plugin.
    pub current: DependencyView,
    /// Span in the intercepting plugin's telemetry scope.
    pub telemetry: SpanHandle,
}

impl<'a> InterceptorScope<'a> {
    pub(crate) fn new(
        event: &'a EventEnvelope,
        outcome: &'a mut Interception,
        dependency: DependencyView,
        current: DependencyView,
        telemetry: SpanHandle,
    ) -> Self {
        Self {
            event,
            outcome,
            dependency,
            current,
            telemetry,
        }
    }

    /// The event as this interceptor sees it (any earlier replacement
    /// already applied).
    pub fn event(&self) -> &EventEnvelope {
        self.event
    }

    /// Replaces the event for every later stage.
    pub fn next(&mut self, event: EventEnvelope) {
        self.outcome.replacement = Some(event);
    }

    /// Drops the event: later interceptors, effects, services, and
    /// listeners are all skipped once this interceptor returns.
    pub fn drop_event(&mut self, reason: impl Into<String>) {
        self.outcome.dropped.get_or_insert_with(|| reason.into());
    }
}

#[derive(Default)]
pub(crate) struct Interception {
    pub(crate) replacement: Option<EventEnvelope>,
    pub(crate) dropped: Option<String>,
}

/// An interceptor attached to a producer plugin by one of its consumers.
/// The consumer is held weakly; entries whose consumer is gone are skipped
/// and compacted at dispatch, so repeated start cycles do not accumulate.
#[derive(Clone)]
pub(crate) struct ExternalInterceptor {
    pub(crate) consumer: Weak<PluginServer>,
    pub(crate) handler: InterceptorFn,
}
