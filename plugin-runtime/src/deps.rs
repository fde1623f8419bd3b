//! Read-only projections of dependency plugins.
//!
//! Views are rebuilt on every event dispatch from the host's *currently
//! registered* instances, so effects never act on stale captures.
//! Dependencies that are not registered are silently skipped; partial
//! deployment is tolerated.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use plugin_api::event::EmitRequest;
use plugin_api::ErrorObject;

use crate::definition::PluginDefinition;
use crate::error::RuntimeError;
use crate::host::Host;
use crate::server::PluginServer;

/// Read-only projection of another plugin's runtime surface: name,
/// definition, config, context reads, event emission, and method calls.
#[derive(Clone)]
pub struct DependencyView {
    server: Arc<PluginServer>,
}

impl DependencyView {
    pub(crate) fn new(server: Arc<PluginServer>) -> Self {
        Self { server }
    }

    pub fn name(&self) -> &str {
        self.server.name()
    }

    pub fn definition(&self) -> &Arc<PluginDefinition> {
        self.server.definition()
    }

    /// A clone of the plugin's parsed config.
    pub fn config(&self) -> Value {
        self.server.config().clone()
    }

    /// A deep clone of the plugin's current context.
    pub fn context(&self) -> Value {
        self.server.context().get()
    }

    /// Emits an event into the dependency's pipeline.
    pub fn emit(&self, request: EmitRequest) -> Result<String, RuntimeError> {
        self.server.emitter().emit(request)
    }

    /// Invokes one of the dependency's methods.
    pub async fn call_method(&self, name: &str, input: Value) -> Result<Value, ErrorObject> {
        self.server.invoke_method(name, input).await
    }
}

impl std::fmt::Debug for DependencyView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyView")
            .field("name", &self.name())
            .finish()
    }
}

/// Builds the `{dep_name: view}` map for one dispatch.
pub(crate) fn build_views(
    host: &Arc<Host>,
    definition: &PluginDefinition,
) -> BTreeMap<String, DependencyView> {
    let mut views = BTreeMap::new();
    for name in definition.dependencies().keys() {
        match host.get(name) {
            Some(server) => {
                views.insert(name.clone(), DependencyView::new(server));
            }
            None => {
                tracing::debug!(
                    plugin = definition.name(),
                    dependency = %name,
                    "dependency not registered; skipped"
                );
            }
        }
    }
    views
}
