//! A server-side plugin host.
//!
//! A [`PluginDefinition`] bundles a plugin's config and context schemas,
//! events, methods, lifecycle hooks, effects, services, interceptors, and
//! dependencies. A [`Host`] turns definitions into running
//! [`PluginServer`]s sharing one [`Transport`] and one telemetry pipeline.
//!
//! Every plugin owns an urgency-preemptive event queue. Its pump feeds each
//! event through a staged pipeline — external interceptors (attached by
//! plugins that depend on it), then effects with a writable context, then
//! fan-out to long-running services, then concurrent listener dispatch —
//! with errors caught at the pump boundary and routed to the plugin's
//! `on_error` hook.
//!
//! ```
//! use plugin_api::schema::Schema;
//! use plugin_runtime::{Host, LoopbackTransport, PluginDefinition, StartMode};
//! use plugin_telemetry::TelemetryClient;
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")] async fn main() {
//! let counter = PluginDefinition::builder("counter")
//!     .context(Schema::object().field("count", Schema::Integer).build(), json!({"count": 0}))
//!     .event("tick")
//!     .effect(|ctx| async move {
//!         ctx.context.update(|mut value| {
//!             value["count"] = json!(value["count"].as_i64().unwrap_or(0) + 1);
//!             value
//!         });
//!         Ok(())
//!     })
//!     .build();
//!
//! let host = Host::new(LoopbackTransport::new(), TelemetryClient::new());
//! let plugin = host.register(counter, None).unwrap();
//! host.start_all(StartMode::Fresh).await;
//!
//! plugin.emitter().emit_type("tick", None).unwrap();
//! # tokio::time::sleep(std::time::Duration::from_millis(50)).await;
//! assert_eq!(plugin.context().get()["count"], json!(1));
//! # host.stop_all().await;
//! # }
//! ```

mod context;
mod definition;
mod deps;
mod error;
mod events;
mod host;
mod interceptor;
mod method;
mod server;
pub(crate) mod sync;
mod transport;

pub use context::{ContextCallbackFn, ContextHandle, ContextReader, ProjectionFn};
pub use definition::{
    DependencyDecl, EffectCtx, EffectFn, ErrorHookFn, EventDef, Facet, HookCtx, HookFn,
    Lifecycle, PickedDefinition, PluginDefinition, PluginDefinitionBuilder, ServiceCtx,
    ServiceDef, ServiceFn,
};
pub use deps::DependencyView;
pub use error::RuntimeError;
pub use events::{EventCallbackFn, EventEmitter, ListenerId, Subscription};
pub use host::Host;
pub use interceptor::{InterceptorFn, InterceptorScope};
pub use method::{MethodCtx, MethodDef, MethodFn};
pub use server::{PluginServer, StartMode};
pub use transport::{
    HandlerRegistration, LoopbackTransport, RpcHandlerFn, Transport, TransportError,
    TransportErrorHook,
};

#[track_caller]
pub(crate) fn spawn_named<T>(
    task: impl std::future::Future<Output = T> + Send + 'static,
    _name: &str,
) -> tokio::task::JoinHandle<T>
where
    T: Send + 'static,
{
    #[cfg(tokio_unstable)]
    return tokio::task::Builder::new()
        .name(_name)
        .spawn(task)
        .expect("spawning should not fail");

    #[cfg(not(tokio_unstable))]
    tokio::spawn(task)
}
