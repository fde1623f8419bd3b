use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload for `plugin.<name>.context.get` responses and
/// `plugin.<name>.context.changed` pushes.
///
/// `timestamp` is unix milliseconds at snapshot time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    pub value: Value,
    pub timestamp: u64,
}
