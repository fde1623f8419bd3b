//! The host: a named registry of running plugin instances sharing one
//! transport and one telemetry pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use plugin_telemetry::TelemetryClient;

use crate::definition::PluginDefinition;
use crate::error::RuntimeError;
use crate::server::{PluginServer, StartMode};
use crate::sync::RwLock;
use crate::transport::Transport;

pub struct Host {
    plugins: RwLock<HashMap<String, Arc<PluginServer>>>,
    transport: Arc<dyn Transport>,
    telemetry: TelemetryClient,
    agent_id: String,
}

impl Host {
    pub fn new(transport: Arc<dyn Transport>, telemetry: TelemetryClient) -> Arc<Self> {
        Self::with_agent_id(transport, telemetry, Uuid::new_v4().to_string())
    }

    /// A host with a caller-chosen agent identity, stamped on every
    /// plugin-scoped telemetry signal.
    pub fn with_agent_id(
        transport: Arc<dyn Transport>,
        telemetry: TelemetryClient,
        agent_id: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            plugins: RwLock::new(HashMap::new()),
            transport,
            telemetry,
            agent_id: agent_id.into(),
        })
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn telemetry(&self) -> &TelemetryClient {
        &self.telemetry
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Constructs a plugin instance — parsing its config and initial context,
    /// wiring telemetry and RPC — and registers it under its name. `config`
    /// of `None` uses the descriptor's default. Fails with a `Validation`
    /// error when config or context do not match their schemas.
    pub fn register(
        self: &Arc<Self>,
        definition: Arc<PluginDefinition>,
        config: Option<Value>,
    ) -> Result<Arc<PluginServer>, RuntimeError> {
        let config = config.unwrap_or_else(|| definition.default_config().clone());
        let server = PluginServer::new(definition, config, self)?;
        self.plugins
            .write()
            .insert(server.name().to_owned(), Arc::clone(&server));
        Ok(server)
    }

    pub fn get(&self, name: &str) -> Option<Arc<PluginServer>> {
        self.plugins.read().get(name).cloned()
    }

    /// Declared dependencies of the named plugin that are not currently
    /// registered. Dispatch skips them silently; stricter deployments can
    /// preflight with this.
    pub fn missing_dependencies(&self, name: &str) -> Vec<String> {
        let Some(server) = self.get(name) else {
            return Vec::new();
        };
        let plugins = self.plugins.read();
        server
            .definition()
            .dependencies()
            .keys()
            .filter(|dep| !plugins.contains_key(*dep))
            .cloned()
            .collect()
    }

    /// Starts every registered plugin: interceptor attachment, lifecycle
    /// hooks, then pumps and services.
    pub async fn start_all(&self, mode: StartMode) {
        let servers: Vec<_> = self.plugins.read().values().cloned().collect();
        for server in servers {
            server.start(mode).await;
        }
    }

    /// Stops and removes every plugin.
    pub async fn stop_all(&self) {
        let servers: Vec<_> = {
            let mut plugins = self.plugins.write();
            plugins.drain().map(|(_, server)| server).collect()
        };
        for server in servers {
            server.stop().await;
        }
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("agent_id", &self.agent_id)
            .field("plugins", &self.plugins.read().keys().collect::<Vec<_>>())
            .finish()
    }
}
