//! Event emission and listener bookkeeping.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use uuid::Uuid;

use plugin_api::event::{EmitRequest, EventEnvelope};
use plugin_api::selector::Selector;
use plugin_telemetry::AsyncQueue;

use crate::definition::PluginDefinition;
use crate::error::RuntimeError;

pub type ListenerId = String;

pub type EventCallbackFn = Arc<dyn Fn(EventEnvelope) -> BoxFuture<'static, ()> + Send + Sync>;

/// How a matched listener is invoked.
#[derive(Clone)]
pub(crate) enum ListenerCallback {
    Local(EventCallbackFn),
    /// Delivered via the `events.callback` transport push.
    Remote,
}

#[derive(Clone)]
pub(crate) struct EventListener {
    pub(crate) selector: Selector,
    pub(crate) callback: ListenerCallback,
    pub(crate) once: bool,
}

/// Emits events onto a plugin's queue, validating them against the plugin's
/// event definitions.
#[derive(Clone)]
pub struct EventEmitter {
    definition: Arc<PluginDefinition>,
    queue: Arc<AsyncQueue<EventEnvelope>>,
}

impl EventEmitter {
    pub(crate) fn new(
        definition: Arc<PluginDefinition>,
        queue: Arc<AsyncQueue<EventEnvelope>>,
    ) -> Self {
        Self { definition, queue }
    }

    /// Validates, assigns an id, and enqueues. Urgent events go to the front
    /// of the queue but never preempt an in-flight event.
    pub fn emit(&self, request: EmitRequest) -> Result<String, RuntimeError> {
        let event_def = self
            .definition
            .events()
            .get(&request.event_type)
            .ok_or_else(|| RuntimeError::UnknownEvent(request.event_type.clone()))?;

        match (&request.data, &event_def.data_schema) {
            (Some(data), Some(schema)) => {
                schema.validate(data)?;
            }
            (Some(_), None) => {
                return Err(RuntimeError::UnexpectedData(request.event_type));
            }
            _ => {}
        }

        let id = Uuid::new_v4().to_string();
        let event = EventEnvelope {
            id: id.clone(),
            event_type: request.event_type,
            data: request.data,
            urgent: request.urgent,
        };
        if event.urgent {
            self.queue.push_first(event);
        } else {
            self.queue.push(event);
        }
        Ok(id)
    }

    /// Shorthand for a non-urgent emit.
    pub fn emit_type(&self, event_type: &str, data: Option<Value>) -> Result<String, RuntimeError> {
        self.emit(EmitRequest {
            event_type: event_type.to_owned(),
            data,
            urgent: false,
        })
    }
}

/// Removes its listener when asked; the listener also dies with its plugin.
#[must_use = "dropping a subscription without unsubscribing leaves the listener installed"]
pub struct Subscription {
    pub(crate) id: ListenerId,
    pub(crate) cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
