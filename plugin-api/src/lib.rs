//! Wire format bindings shared by the plugin runtime and the telemetry core.
//!
//! Everything in this crate is serde-serializable and stable: the payloads
//! exchanged over the RPC transport, the event selector grammar, the
//! telemetry signal schemas, and the schema validator the runtime applies to
//! configs, contexts, event data, and method inputs/outputs.

/// Plugin context RPC payloads.
pub mod context;
mod error;
/// Event envelopes, event RPC payloads, and endpoint naming.
pub mod event;
/// The runtime schema validator.
pub mod schema;
/// The event selector grammar.
pub mod selector;
/// Telemetry signal wire forms.
pub mod signal;

pub use error::*;
