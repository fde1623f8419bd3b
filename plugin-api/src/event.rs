use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::selector::Selector;

/// A dispatched event instance.
///
/// The `id` is assigned by the owning plugin when the event is emitted;
/// producers never supply one. Effects, services, and listeners each receive
/// an independent deep clone of the envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub urgent: bool,
}

/// Request payload for `plugin.<name>.events.emit`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmitRequest {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default)]
    pub urgent: bool,
}

impl EmitRequest {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: None,
            urgent: false,
        }
    }

    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn urgent(mut self) -> Self {
        self.urgent = true;
        self
    }
}

/// Response payload for `plugin.<name>.events.emit`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmitResponse {
    pub id: String,
}

/// Request payload for `plugin.<name>.events.subscribe`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub listener_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<Selector>,
}

/// Request payload for `plugin.<name>.events.unsubscribe`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeRequest {
    pub listener_id: String,
}

/// Server-push payload for `plugin.<name>.events.callback`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCallback {
    pub listener_id: String,
    pub event: EventEnvelope,
}

/// Dotted endpoint names, `plugin.<pluginName>.<group>.<op>`.
pub mod endpoint {
    pub fn method(plugin: &str, method: &str) -> String {
        format!("plugin.{plugin}.methods.{method}")
    }

    pub fn events_emit(plugin: &str) -> String {
        format!("plugin.{plugin}.events.emit")
    }

    pub fn events_subscribe(plugin: &str) -> String {
        format!("plugin.{plugin}.events.subscribe")
    }

    pub fn events_unsubscribe(plugin: &str) -> String {
        format!("plugin.{plugin}.events.unsubscribe")
    }

    pub fn events_callback(plugin: &str) -> String {
        format!("plugin.{plugin}.events.callback")
    }

    pub fn context_get(plugin: &str) -> String {
        format!("plugin.{plugin}.context.get")
    }

    pub fn context_changed(plugin: &str) -> String {
        format!("plugin.{plugin}.context.changed")
    }
}
