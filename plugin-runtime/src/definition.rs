//! The declarative plugin descriptor and its builder.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{json, Value};

use plugin_api::event::EventEnvelope;
use plugin_api::schema::Schema;
use plugin_api::ErrorObject;
use plugin_telemetry::{SpanHandle, TelemetryClient};

use crate::context::ContextHandle;
use crate::deps::DependencyView;
use crate::events::EventEmitter;
use crate::interceptor::InterceptorFn;
use crate::method::MethodDef;

/// Context handed to lifecycle hooks.
pub struct HookCtx {
    pub config: Value,
    pub context: ContextHandle,
    pub events: EventEmitter,
    pub telemetry: SpanHandle,
}

pub type HookFn = Arc<dyn Fn(HookCtx) -> BoxFuture<'static, Result<(), ErrorObject>> + Send + Sync>;
pub type ErrorHookFn = Arc<dyn Fn(HookCtx, ErrorObject) -> BoxFuture<'static, ()> + Send + Sync>;

/// Context handed to each effect invocation. `event` is this invocation's
/// private deep clone.
pub struct EffectCtx {
    pub event: EventEnvelope,
    pub config: Value,
    pub context: ContextHandle,
    pub deps: BTreeMap<String, DependencyView>,
    pub events: EventEmitter,
    pub telemetry: SpanHandle,
}

pub type EffectFn =
    Arc<dyn Fn(EffectCtx) -> BoxFuture<'static, Result<(), ErrorObject>> + Send + Sync>;

/// Context handed to a service for its whole run.
pub struct ServiceCtx {
    pub name: String,
    pub config: Value,
    pub context: ContextHandle,
    pub events: EventEmitter,
    pub queue: Arc<plugin_telemetry::AsyncQueue<EventEnvelope>>,
    pub telemetry: TelemetryClient,
    pub(crate) host: std::sync::Weak<crate::host::Host>,
    pub(crate) definition: Arc<PluginDefinition>,
}

impl ServiceCtx {
    /// The next event copied to this service, or `None` once the plugin has
    /// stopped.
    pub async fn next_event(&self) -> Option<EventEnvelope> {
        self.queue.recv().await
    }

    /// Fresh dependency views; rebuilt on each call so the service never
    /// holds stale captures.
    pub fn deps(&self) -> BTreeMap<String, DependencyView> {
        match self.host.upgrade() {
            Some(host) => crate::deps::build_views(&host, &self.definition),
            None => BTreeMap::new(),
        }
    }
}

pub type ServiceFn = Arc<dyn Fn(ServiceCtx) -> BoxFuture<'static, ()> + Send + Sync>;

pub struct ServiceDef {
    pub name: String,
    pub run: ServiceFn,
}

#[derive(Clone, Debug, Default)]
pub struct EventDef {
    pub data_schema: Option<Schema>,
}

#[derive(Default)]
pub struct Lifecycle {
    pub on_start: Option<HookFn>,
    pub on_restart: Option<HookFn>,
    pub on_stop: Option<HookFn>,
    pub on_error: Option<ErrorHookFn>,
}

/// Facets of a descriptor a dependent plugin declares interest in.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Facet {
    Config,
    Context,
    Events,
    Methods,
}

/// A dependency declaration: the full descriptor is always carried; the
/// facet list is a consumer-side contract with no runtime restriction.
#[derive(Clone)]
pub struct DependencyDecl {
    pub definition: Arc<PluginDefinition>,
    pub facets: Vec<Facet>,
}

/// A narrowed projection of a descriptor, used only for dependency
/// declarations.
#[derive(Clone)]
pub struct PickedDefinition {
    pub definition: Arc<PluginDefinition>,
    pub facets: Vec<Facet>,
}

impl From<&Arc<PluginDefinition>> for PickedDefinition {
    fn from(definition: &Arc<PluginDefinition>) -> Self {
        PickedDefinition {
            definition: Arc::clone(definition),
            facets: vec![Facet::Config, Facet::Context, Facet::Events, Facet::Methods],
        }
    }
}

impl From<Arc<PluginDefinition>> for PickedDefinition {
    fn from(definition: Arc<PluginDefinition>) -> Self {
        PickedDefinition::from(&definition)
    }
}

/// An immutable plugin descriptor: name, schemas, events, methods, lifecycle
/// hooks, effects, services, interceptors, and dependencies. Assembled with
/// [`PluginDefinition::builder`]; only the built descriptor matters at
/// runtime.
pub struct PluginDefinition {
    pub(crate) name: String,
    pub(crate) config_schema: Schema,
    pub(crate) default_config: Value,
    pub(crate) context_schema: Schema,
    pub(crate) initial_context: Value,
    pub(crate) events: BTreeMap<String, EventDef>,
    pub(crate) methods: BTreeMap<String, MethodDef>,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) effects: Vec<EffectFn>,
    pub(crate) services: Vec<ServiceDef>,
    pub(crate) interceptors: Vec<InterceptorFn>,
    pub(crate) dependencies: BTreeMap<String, DependencyDecl>,
}

impl PluginDefinition {
    pub fn builder(name: impl Into<String>) -> PluginDefinitionBuilder {
        PluginDefinitionBuilder {
            name: name.into(),
            config_schema: Schema::Any,
            default_config: json!({}),
            context_schema: Schema::Any,
            initial_context: json!({}),
            events: BTreeMap::new(),
            methods: BTreeMap::new(),
            lifecycle: Lifecycle::default(),
            effects: Vec::new(),
            services: Vec::new(),
            interceptors: Vec::new(),
            dependencies: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn events(&self) -> &BTreeMap<String, EventDef> {
        &self.events
    }

    pub fn default_config(&self) -> &Value {
        &self.default_config
    }

    pub fn dependencies(&self) -> &BTreeMap<String, DependencyDecl> {
        &self.dependencies
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Narrows the descriptor for a dependency declaration. The entire
    /// descriptor is still carried; narrowing is a consumer-side contract.
    pub fn pick(
        self: &Arc<Self>,
        facets: impl IntoIterator<Item = Facet>,
    ) -> PickedDefinition {
        PickedDefinition {
            definition: Arc::clone(self),
            facets: facets.into_iter().collect(),
        }
    }
}

impl std::fmt::Debug for PluginDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDefinition")
            .field("name", &self.name)
            .field("events", &self.events.keys().collect::<Vec<_>>())
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("effects", &self.effects.len())
            .field("services", &self.services.len())
            .field("interceptors", &self.interceptors.len())
            .field("dependencies", &self.dependencies.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Accumulates one facet at a time; every step consumes and returns the
/// builder, and only the final [`build`](Self::build) matters at runtime.
pub struct PluginDefinitionBuilder {
    name: String,
    config_schema: Schema,
    default_config: Value,
    context_schema: Schema,
    initial_context: Value,
    events: BTreeMap<String, EventDef>,
    methods: BTreeMap<String, MethodDef>,
    lifecycle: Lifecycle,
    effects: Vec<EffectFn>,
    services: Vec<ServiceDef>,
    interceptors: Vec<InterceptorFn>,
    dependencies: BTreeMap<String, DependencyDecl>,
}

impl PluginDefinitionBuilder {
    /// Declares the config schema and the config used when the host supplies
    /// none.
    pub fn config(mut self, schema: Schema, default_config: Value) -> Self {
        self.config_schema = schema;
        self.default_config = default_config;
        self
    }

    /// Declares the context schema and the initial context value, validated
    /// at plugin construction.
    pub fn context(mut self, schema: Schema, initial_context: Value) -> Self {
        self.context_schema = schema;
        self.initial_context = initial_context;
        self
    }

    /// Declares an event type carrying no data. Emitting data for an event
    /// with no schema is rejected.
    pub fn event(mut self, name: impl Into<String>) -> Self {
        self.events.insert(name.into(), EventDef { data_schema: None });
        self
    }

    /// Declares an event type whose data is validated against `data_schema`
    /// on emit.
    pub fn event_with_data(mut self, name: impl Into<String>, data_schema: Schema) -> Self {
        self.events.insert(
            name.into(),
            EventDef {
                data_schema: Some(data_schema),
            },
        );
        self
    }

    pub fn method<F, Fut>(
        mut self,
        name: impl Into<String>,
        input_schema: Schema,
        output_schema: Schema,
        run: F,
    ) -> Self
    where
        F: Fn(crate::method::MethodCtx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ErrorObject>> + Send + 'static,
    {
        self.methods.insert(
            name.into(),
            MethodDef {
                input_schema,
                output_schema,
                run: Arc::new(move |ctx| Box::pin(run(ctx))),
            },
        );
        self
    }

    pub fn on_start<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(HookCtx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ErrorObject>> + Send + 'static,
    {
        self.lifecycle.on_start = Some(Arc::new(move |ctx| Box::pin(hook(ctx))));
        self
    }

    pub fn on_restart<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(HookCtx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ErrorObject>> + Send + 'static,
    {
        self.lifecycle.on_restart = Some(Arc::new(move |ctx| Box::pin(hook(ctx))));
        self
    }

    pub fn on_stop<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(HookCtx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ErrorObject>> + Send + 'static,
    {
        self.lifecycle.on_stop = Some(Arc::new(move |ctx| Box::pin(hook(ctx))));
        self
    }

    pub fn on_error<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(HookCtx, ErrorObject) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.lifecycle.on_error = Some(Arc::new(move |ctx, error| Box::pin(hook(ctx, error))));
        self
    }

    /// Appends an effect; effects run sequentially, in declaration order,
    /// for every event that survives interception.
    pub fn effect<F, Fut>(mut self, effect: F) -> Self
    where
        F: Fn(EffectCtx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ErrorObject>> + Send + 'static,
    {
        self.effects.push(Arc::new(move |ctx| Box::pin(effect(ctx))));
        self
    }

    /// Declares a long-running service consuming its own copy of the event
    /// stream.
    pub fn service<F, Fut>(mut self, name: impl Into<String>, run: F) -> Self
    where
        F: Fn(ServiceCtx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.services.push(ServiceDef {
            name: name.into(),
            run: Arc::new(move |ctx| Box::pin(run(ctx))),
        });
        self
    }

    /// Appends an interceptor, attached to every declared dependency when
    /// the plugin starts.
    pub fn interceptor<F>(mut self, interceptor: F) -> Self
    where
        F: Fn(&mut crate::interceptor::InterceptorScope<'_>) + Send + Sync + 'static,
    {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Declares a dependency on another plugin by descriptor (or a
    /// [`pick`](PluginDefinition::pick)ed projection of one).
    pub fn depends_on(mut self, picked: impl Into<PickedDefinition>) -> Self {
        let picked = picked.into();
        self.dependencies.insert(
            picked.definition.name().to_owned(),
            DependencyDecl {
                definition: picked.definition,
                facets: picked.facets,
            },
        );
        self
    }

    pub fn build(self) -> Arc<PluginDefinition> {
        Arc::new(PluginDefinition {
            name: self.name,
            config_schema: self.config_schema,
            default_config: self.default_config,
            context_schema: self.context_schema,
            initial_context: self.initial_context,
            events: self.events,
            methods: self.methods,
            lifecycle: self.lifecycle,
            effects: self.effects,
            services: self.services,
            interceptors: self.interceptors,
            dependencies: self.dependencies,
        })
    }
}
