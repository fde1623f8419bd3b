//! The runtime realization of one plugin: context ownership, the event
//! queue and its pump, listener bookkeeping, RPC binding, and the staged
//! event pipeline.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering::SeqCst};
use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use futures::future::BoxFuture;
use serde_json::{json, Value};
use uuid::Uuid;

use plugin_api::context::ContextSnapshot;
use plugin_api::event::{
    endpoint, EmitRequest, EmitResponse, EventCallback, EventEnvelope, SubscribeRequest,
    UnsubscribeRequest,
};
use plugin_api::selector::Selector;
use plugin_api::{ErrorObject, WireResult};
use plugin_telemetry::{AsyncQueue, LogInput, TelemetryClient, TraceOptions};

use crate::context::{ContextCell, ContextHandle, ContextReader};
use crate::definition::{EffectCtx, HookCtx, HookFn, PluginDefinition, ServiceCtx};
use crate::deps::{self, DependencyView};
use crate::error::RuntimeError;
use crate::events::{EventEmitter, EventListener, ListenerCallback, ListenerId, Subscription};
use crate::host::Host;
use crate::interceptor::{ExternalInterceptor, Interception, InterceptorScope};
use crate::method::MethodCtx;
use crate::sync::Mutex;
use crate::transport::{HandlerRegistration, RpcHandlerFn, Transport, TransportErrorHook};

/// Whether a start is fresh or signalled as a restart by the hosting
/// process. A restart runs `on_restart` in place of `on_start`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StartMode {
    Fresh,
    Restart,
}

struct ServiceChannel {
    name: String,
    queue: Arc<AsyncQueue<EventEnvelope>>,
}

pub struct PluginServer {
    definition: Arc<PluginDefinition>,
    config: Value,
    context: Arc<ContextCell>,
    queue: Arc<AsyncQueue<EventEnvelope>>,
    listeners: Arc<Mutex<HashMap<ListenerId, EventListener>>>,
    external_interceptors: Mutex<Vec<ExternalInterceptor>>,
    service_channels: Vec<ServiceChannel>,
    telemetry: TelemetryClient,
    transport: Arc<dyn Transport>,
    host: Weak<Host>,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
    started: AtomicBool,
    stopping: AtomicBool,
}

impl PluginServer {
    /// Parses config and initial context (failing fatally with `Validation`
    /// errors), scopes telemetry, and registers the RPC surface. The
    /// instance does not process events until [`start`](Self::start).
    pub(crate) fn new(
        definition: Arc<PluginDefinition>,
        config: Value,
        host: &Arc<Host>,
    ) -> Result<Arc<Self>, RuntimeError> {
        let config = definition.config_schema.parse(config)?;
        let context = ContextCell::new(&definition.context_schema, definition.initial_context.clone())?;
        let telemetry = host.telemetry().child(
            "plugin.server",
            [
                ("plugin.name".to_owned(), json!(definition.name())),
                ("agent.id".to_owned(), json!(host.agent_id())),
            ],
        );
        let service_channels = definition
            .services
            .iter()
            .map(|service| ServiceChannel {
                name: service.name.clone(),
                queue: Arc::new(AsyncQueue::new()),
            })
            .collect();

        let server = Arc::new(Self {
            definition,
            config,
            context,
            queue: Arc::new(AsyncQueue::new()),
            listeners: Arc::new(Mutex::new(HashMap::new())),
            external_interceptors: Mutex::new(Vec::new()),
            service_channels,
            telemetry,
            transport: Arc::clone(host.transport()),
            host: Arc::downgrade(host),
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
        });
        server.install_context_push();
        server.register_rpc();
        tracing::debug!(plugin = server.name(), "plugin server constructed");
        Ok(server)
    }

    pub fn name(&self) -> &str {
        self.definition.name()
    }

    pub fn definition(&self) -> &Arc<PluginDefinition> {
        &self.definition
    }

    pub fn config(&self) -> &Value {
        &self.config
    }

    pub fn telemetry(&self) -> &TelemetryClient {
        &self.telemetry
    }

    /// Read-only view of this plugin's context.
    pub fn context(&self) -> ContextReader {
        self.context_handle().reader()
    }

    pub(crate) fn context_handle(&self) -> ContextHandle {
        ContextHandle::new(Arc::clone(&self.context))
    }

    /// The emit handle for this plugin's own pipeline.
    pub fn emitter(&self) -> EventEmitter {
        EventEmitter::new(Arc::clone(&self.definition), Arc::clone(&self.queue))
    }

    // === lifecycle ===

    /// Attaches this plugin's interceptors to its registered dependencies,
    /// runs the start (or restart) hook, then spawns the service tasks and
    /// the event pump. Idempotent.
    pub async fn start(self: &Arc<Self>, mode: StartMode) {
        if self.started.swap(true, SeqCst) {
            return;
        }

        if !self.definition.interceptors.is_empty() {
            if let Some(host) = self.host.upgrade() {
                for dep_name in self.definition.dependencies.keys() {
                    match host.get(dep_name) {
                        Some(producer) => {
                            for handler in &self.definition.interceptors {
                                producer.register_external_interceptor(ExternalInterceptor {
                                    consumer: Arc::downgrade(self),
                                    handler: Arc::clone(handler),
                                });
                            }
                        }
                        None => tracing::debug!(
                            plugin = self.name(),
                            dependency = %dep_name,
                            "dependency not registered; interceptors not attached"
                        ),
                    }
                }
            }
        }

        let lifecycle = &self.definition.lifecycle;
        let (hook_name, hook) = match mode {
            StartMode::Restart if lifecycle.on_restart.is_some() => {
                ("onRestart", lifecycle.on_restart.clone())
            }
            _ => ("onStart", lifecycle.on_start.clone()),
        };
        self.run_hook(hook_name, hook).await;

        let mut tasks = Vec::with_capacity(self.service_channels.len() + 1);
        for (channel, service) in self
            .service_channels
            .iter()
            .zip(&self.definition.services)
        {
            tracing::debug!(plugin = self.name(), service = %channel.name, "service started");
            let ctx = ServiceCtx {
                name: service.name.clone(),
                config: self.config.clone(),
                context: self.context_handle(),
                events: self.emitter(),
                queue: Arc::clone(&channel.queue),
                telemetry: self.telemetry.clone(),
                host: self.host.clone(),
                definition: Arc::clone(&self.definition),
            };
            tasks.push(crate::spawn_named(
                (service.run)(ctx),
                "plugin-runtime/service",
            ));
        }
        tasks.push(crate::spawn_named(
            Arc::clone(self).run_pump(),
            "plugin-runtime/pump",
        ));
        self.tasks.lock().extend(tasks);
    }

    /// Runs `on_stop`, then closes the main queue. The in-flight event
    /// finishes processing before the pump exits; service queues stop after
    /// it. Idempotent.
    pub async fn stop(&self) {
        if self.stopping.swap(true, SeqCst) {
            return;
        }
        self.run_hook("onStop", self.definition.lifecycle.on_stop.clone())
            .await;
        self.queue.stop();

        let plugin = self.name();
        for method in self.definition.methods.keys() {
            self.transport.unregister(&endpoint::method(plugin, method));
        }
        for name in [
            endpoint::events_emit(plugin),
            endpoint::events_subscribe(plugin),
            endpoint::events_unsubscribe(plugin),
            endpoint::context_get(plugin),
        ] {
            self.transport.unregister(&name);
        }
        tracing::debug!(plugin, "plugin server stopped");
    }

    async fn run_hook(&self, hook_name: &str, hook: Option<HookFn>) {
        let Some(hook) = hook else { return };
        let span_name = format!("plugin.{}.lifecycle.{}()", self.name(), hook_name);
        let ctx_config = self.config.clone();
        let ctx_context = self.context_handle();
        let ctx_events = self.emitter();
        let result = self
            .telemetry
            .trace(span_name, TraceOptions::default(), move |span| {
                hook(HookCtx {
                    config: ctx_config,
                    context: ctx_context,
                    events: ctx_events,
                    telemetry: span,
                })
            })
            .await;
        if let Err(error) = result {
            self.telemetry.log().error(
                LogInput::message(format!("lifecycle hook {hook_name} failed: {error}"))
                    .with_attribute("hook", hook_name),
            );
            self.run_on_error(error).await;
        }
    }

    async fn run_on_error(&self, error: ErrorObject) {
        let Some(on_error) = self.definition.lifecycle.on_error.clone() else {
            return;
        };
        let span_name = format!("plugin.{}.lifecycle.onError()", self.name());
        let ctx_config = self.config.clone();
        let ctx_context = self.context_handle();
        let ctx_events = self.emitter();
        self.telemetry
            .trace(span_name, TraceOptions::default(), move |span| {
                on_error(
                    HookCtx {
                        config: ctx_config,
                        context: ctx_context,
                        events: ctx_events,
                        telemetry: span,
                    },
                    error,
                )
            })
            .await;
    }

    // === listeners ===

    /// Installs an event listener; the returned subscription removes it.
    pub fn on<F, Fut>(&self, selector: impl Into<Selector>, callback: F) -> Subscription
    where
        F: Fn(EventEnvelope) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.install_listener(
            Uuid::new_v4().to_string(),
            selector.into(),
            ListenerCallback::Local(Arc::new(move |event| Box::pin(callback(event)))),
            false,
        )
    }

    /// Like [`on`](Self::on), but the listener is removed before its first
    /// invocation.
    pub fn once<F, Fut>(&self, selector: impl Into<Selector>, callback: F) -> Subscription
    where
        F: Fn(EventEnvelope) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.install_listener(
            Uuid::new_v4().to_string(),
            selector.into(),
            ListenerCallback::Local(Arc::new(move |event| Box::pin(callback(event)))),
            true,
        )
    }

    /// Registers a projected context-change listener.
    pub fn on_context_change<P, F, Fut>(&self, projection: P, callback: F) -> Subscription
    where
        P: Fn(&Value) -> Value + Send + Sync + 'static,
        F: Fn(Value, Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.context_handle().on_change(projection, callback)
    }

    fn install_listener(
        &self,
        id: ListenerId,
        selector: Selector,
        callback: ListenerCallback,
        once: bool,
    ) -> Subscription {
        self.listeners.lock().insert(
            id.clone(),
            EventListener {
                selector,
                callback,
                once,
            },
        );
        let listeners = Arc::downgrade(&self.listeners);
        let listener_id = id.clone();
        Subscription {
            id,
            cancel: Some(Box::new(move || {
                if let Some(listeners) = listeners.upgrade() {
                    listeners.lock().remove(&listener_id);
                }
            })),
        }
    }

    fn subscribe_remote(&self, listener_id: ListenerId, selector: Selector) {
        self.listeners.lock().insert(
            listener_id,
            EventListener {
                selector,
                callback: ListenerCallback::Remote,
                once: false,
            },
        );
    }

    fn unsubscribe_remote(&self, listener_id: &str) -> Result<(), RuntimeError> {
        match self.listeners.lock().remove(listener_id) {
            Some(_) => Ok(()),
            None => Err(RuntimeError::UnknownListener(listener_id.to_owned())),
        }
    }

    // === interception ===

    pub(crate) fn register_external_interceptor(&self, interceptor: ExternalInterceptor) {
        self.external_interceptors.lock().push(interceptor);
    }

    // === methods ===

    /// Invokes a method inside its own span: input validation, the body with
    /// a writable context and an emitter, output validation.
    pub async fn invoke_method(
        self: &Arc<Self>,
        name: &str,
        input: Value,
    ) -> Result<Value, ErrorObject> {
        let Some(method) = self.definition.methods.get(name).cloned() else {
            return Err(RuntimeError::UnknownMethod(name.to_owned()).into_object());
        };
        let span_name = format!("plugin.{}.methods.{}()", self.name(), name);
        let config = self.config.clone();
        let context = self.context_handle();
        let events = self.emitter();
        self.telemetry
            .trace(span_name, TraceOptions::default(), move |span| async move {
                let input = method.input_schema.parse(input).map_err(|error| {
                    ErrorObject::validation(format!("method input rejected: {error}"))
                        .with_cause(error.to_value())
                })?;
                let output = (method.run)(MethodCtx {
                    input,
                    config,
                    context,
                    events,
                    telemetry: span,
                })
                .await?;
                method.output_schema.parse(output).map_err(|error| {
                    ErrorObject::validation(format!("method output rejected: {error}"))
                        .with_cause(error.to_value())
                })
            })
            .await
    }

    // === the event pipeline ===

    async fn run_pump(self: Arc<Self>) {
        tracing::debug!(plugin = self.name(), "event pump started");
        while let Some(event) = self.queue.recv().await {
            let event_type = event.event_type.clone();
            let event_id = event.id.clone();
            if let Err(error) = self.process_event(event).await {
                tracing::warn!(
                    plugin = self.name(),
                    event = %event_type,
                    %error,
                    "event pipeline failed"
                );
                self.telemetry.log().error(
                    LogInput::message(format!(
                        "event pipeline failed for `{event_type}` ({event_id}): {error}"
                    ))
                    .with_attribute("event.type", event_type.clone())
                    .with_attribute("event.id", event_id.clone()),
                );
                self.run_on_error(error).await;
            }
        }
        for channel in &self.service_channels {
            channel.queue.stop();
        }
        tracing::debug!(plugin = self.name(), "event pump exited");
    }

    /// One event through the staged pipeline: external interceptors, then
    /// effects, then service fan-out, then concurrent listener dispatch.
    async fn process_event(self: &Arc<Self>, mut event: EventEnvelope) -> Result<(), ErrorObject> {
        // Stage 1: external interceptors, strictly sequential, in
        // registration order, each in its consumer's telemetry scope.
        let interceptors: Vec<ExternalInterceptor> = {
            let mut entries = self.external_interceptors.lock();
            entries.retain(|entry| entry.consumer.strong_count() > 0);
            entries.clone()
        };
        let mut dropped = None;
        for entry in interceptors {
            let Some(consumer) = entry.consumer.upgrade() else {
                continue;
            };
            let mut outcome = Interception::default();
            let span_name = format!(
                "plugin.{}.interceptors[{}]",
                consumer.name(),
                self.name()
            );
            consumer
                .telemetry
                .trace_sync(span_name, TraceOptions::default(), |span| {
                    let mut scope = InterceptorScope::new(
                        &event,
                        &mut outcome,
                        DependencyView::new(Arc::clone(self)),
                        DependencyView::new(Arc::clone(&consumer)),
                        span,
                    );
                    (entry.handler)(&mut scope);
                });
            if let Some(replacement) = outcome.replacement {
                event = replacement;
            }
            if let Some(reason) = outcome.dropped {
                dropped = Some((consumer.name().to_owned(), reason));
                break;
            }
        }
        if let Some((consumer, reason)) = dropped {
            tracing::debug!(
                plugin = self.name(),
                event = %event.event_type,
                %consumer,
                %reason,
                "event dropped by interceptor"
            );
            return Ok(());
        }

        // Stage 2: effects, sequential, in declaration order; each gets its
        // own deep clone of the event and a writable context.
        let deps = self.dependency_views();
        for (index, effect) in self.definition.effects.iter().enumerate() {
            let effect = Arc::clone(effect);
            let span_name = format!("plugin.{}.effects[{index}]", self.name());
            let ctx_event = event.clone();
            let ctx_config = self.config.clone();
            let ctx_context = self.context_handle();
            let ctx_deps = deps.clone();
            let ctx_events = self.emitter();
            self.telemetry
                .trace(span_name, TraceOptions::default(), move |span| {
                    effect(EffectCtx {
                        event: ctx_event,
                        config: ctx_config,
                        context: ctx_context,
                        deps: ctx_deps,
                        events: ctx_events,
                        telemetry: span,
                    })
                })
                .await?;
        }

        // Stage 3: service fan-out, in declaration order.
        for channel in &self.service_channels {
            channel.queue.push(event.clone());
        }

        // Stage 4: listener dispatch, concurrent.
        self.dispatch_listeners(event).await;
        Ok(())
    }

    fn dependency_views(&self) -> BTreeMap<String, DependencyView> {
        match self.host.upgrade() {
            Some(host) => deps::build_views(&host, &self.definition),
            None => BTreeMap::new(),
        }
    }

    async fn dispatch_listeners(self: &Arc<Self>, event: EventEnvelope) {
        let selected: Vec<(ListenerId, EventListener)> = {
            let mut listeners = self.listeners.lock();
            let once_ids: Vec<ListenerId> = listeners
                .iter()
                .filter(|(_, listener)| {
                    listener.once && listener.selector.matches(&event.event_type)
                })
                .map(|(id, _)| id.clone())
                .collect();
            let mut selected: Vec<(ListenerId, EventListener)> = listeners
                .iter()
                .filter(|(_, listener)| {
                    !listener.once && listener.selector.matches(&event.event_type)
                })
                .map(|(id, listener)| (id.clone(), listener.clone()))
                .collect();
            // `once` listeners are unsubscribed before their callback runs.
            for id in once_ids {
                if let Some(listener) = listeners.remove(&id) {
                    selected.push((id, listener));
                }
            }
            selected
        };

        let callbacks: Vec<BoxFuture<'static, ()>> = selected
            .into_iter()
            .map(|(id, listener)| match listener.callback {
                ListenerCallback::Local(callback) => callback(event.clone()),
                ListenerCallback::Remote => {
                    let transport = Arc::clone(&self.transport);
                    let telemetry = self.telemetry.clone();
                    let endpoint_name = endpoint::events_callback(self.name());
                    let payload = EventCallback {
                        listener_id: id,
                        event: event.clone(),
                    };
                    Box::pin(async move {
                        let payload = match serde_json::to_value(&payload) {
                            Ok(payload) => payload,
                            Err(error) => {
                                telemetry.log().warn(LogInput::message(format!(
                                    "event callback not serializable: {error}"
                                )));
                                return;
                            }
                        };
                        if let Err(error) = transport.call(&endpoint_name, payload).await {
                            tracing::warn!(%error, "events.callback push failed");
                            telemetry.log().warn(LogInput::message(format!(
                                "events.callback push failed: {error}"
                            )));
                        }
                    })
                }
            })
            .collect();
        futures::future::join_all(callbacks).await;
    }

    // === RPC binding ===

    fn install_context_push(self: &Arc<Self>) {
        let transport = Arc::clone(&self.transport);
        let endpoint_name = endpoint::context_changed(self.name());
        let telemetry = self.telemetry.clone();
        self.context.set_push_hook(Arc::new(move |value| {
            let snapshot = ContextSnapshot {
                value,
                timestamp: unix_ms(),
            };
            let payload = match serde_json::to_value(&snapshot) {
                Ok(payload) => payload,
                Err(error) => {
                    telemetry.log().warn(LogInput::message(format!(
                        "context snapshot not serializable: {error}"
                    )));
                    return;
                }
            };
            let transport = Arc::clone(&transport);
            let endpoint_name = endpoint_name.clone();
            let telemetry = telemetry.clone();
            crate::spawn_named(
                async move {
                    if let Err(error) = transport.call(&endpoint_name, payload).await {
                        tracing::warn!(%error, "context.changed push failed");
                        telemetry.log().warn(LogInput::message(format!(
                            "context.changed push failed: {error}"
                        )));
                    }
                },
                "plugin-runtime/context-push",
            );
        }));
    }

    fn register_rpc(self: &Arc<Self>) {
        let plugin = self.name().to_owned();
        let on_error: TransportErrorHook = {
            let telemetry = self.telemetry.clone();
            Arc::new(move |error| {
                telemetry
                    .log()
                    .error(LogInput::message(format!("transport failure: {error}")));
            })
        };

        for method_name in self.definition.methods.keys() {
            let weak = Arc::downgrade(self);
            let method = method_name.clone();
            let handler: RpcHandlerFn = Arc::new(move |payload| {
                let weak = weak.clone();
                let method = method.clone();
                Box::pin(async move {
                    match weak.upgrade() {
                        Some(server) => {
                            WireResult::from(server.invoke_method(&method, payload).await)
                        }
                        None => WireResult::Err(ErrorObject::transport("plugin server is gone")),
                    }
                })
            });
            self.transport.register(HandlerRegistration {
                name: endpoint::method(&plugin, method_name),
                handler,
                on_error: Some(Arc::clone(&on_error)),
            });
        }

        let weak = Arc::downgrade(self);
        let emit: RpcHandlerFn = Arc::new(move |payload| {
            let weak = weak.clone();
            Box::pin(async move {
                let Some(server) = weak.upgrade() else {
                    return WireResult::Err(ErrorObject::transport("plugin server is gone"));
                };
                let request: EmitRequest = match serde_json::from_value(payload) {
                    Ok(request) => request,
                    Err(error) => {
                        return WireResult::Err(ErrorObject::validation(format!(
                            "invalid emit request: {error}"
                        )))
                    }
                };
                match server.emitter().emit(request) {
                    Ok(id) => to_wire(&EmitResponse { id }),
                    Err(error) => WireResult::Err(error.into_object()),
                }
            })
        });
        self.transport.register(HandlerRegistration {
            name: endpoint::events_emit(&plugin),
            handler: emit,
            on_error: Some(Arc::clone(&on_error)),
        });

        let weak = Arc::downgrade(self);
        let subscribe: RpcHandlerFn = Arc::new(move |payload| {
            let weak = weak.clone();
            Box::pin(async move {
                let Some(server) = weak.upgrade() else {
                    return WireResult::Err(ErrorObject::transport("plugin server is gone"));
                };
                let request: SubscribeRequest = match serde_json::from_value(payload) {
                    Ok(request) => request,
                    Err(error) => {
                        return WireResult::Err(ErrorObject::validation(format!(
                            "invalid subscribe request: {error}"
                        )))
                    }
                };
                server.subscribe_remote(request.listener_id, request.selector.unwrap_or_default());
                WireResult::Ok(Value::Null)
            })
        });
        self.transport.register(HandlerRegistration {
            name: endpoint::events_subscribe(&plugin),
            handler: subscribe,
            on_error: Some(Arc::clone(&on_error)),
        });

        let weak = Arc::downgrade(self);
        let unsubscribe: RpcHandlerFn = Arc::new(move |payload| {
            let weak = weak.clone();
            Box::pin(async move {
                let Some(server) = weak.upgrade() else {
                    return WireResult::Err(ErrorObject::transport("plugin server is gone"));
                };
                let request: UnsubscribeRequest = match serde_json::from_value(payload) {
                    Ok(request) => request,
                    Err(error) => {
                        return WireResult::Err(ErrorObject::validation(format!(
                            "invalid unsubscribe request: {error}"
                        )))
                    }
                };
                match server.unsubscribe_remote(&request.listener_id) {
                    Ok(()) => WireResult::Ok(Value::Null),
                    Err(error) => WireResult::Err(error.into_object()),
                }
            })
        });
        self.transport.register(HandlerRegistration {
            name: endpoint::events_unsubscribe(&plugin),
            handler: unsubscribe,
            on_error: Some(Arc::clone(&on_error)),
        });

        let weak = Arc::downgrade(self);
        let context_get: RpcHandlerFn = Arc::new(move |_payload| {
            let weak = weak.clone();
            Box::pin(async move {
                let Some(server) = weak.upgrade() else {
                    return WireResult::Err(ErrorObject::transport("plugin server is gone"));
                };
                to_wire(&ContextSnapshot {
                    value: server.context().get(),
                    timestamp: unix_ms(),
                })
            })
        });
        self.transport.register(HandlerRegistration {
            name: endpoint::context_get(&plugin),
            handler: context_get,
            on_error: Some(on_error),
        });
    }
}

impl std::fmt::Debug for PluginServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginServer")
            .field("name", &self.name())
            .field("queue_depth", &self.queue.len())
            .field("listeners", &self.listeners.lock().len())
            .field("started", &self.started.load(SeqCst))
            .finish()
    }
}

fn to_wire<T: serde::Serialize>(value: &T) -> WireResult {
    match serde_json::to_value(value) {
        Ok(value) => WireResult::Ok(value),
        Err(error) => WireResult::Err(ErrorObject::unknown(format!(
            "response not serializable: {error}"
        ))),
    }
}

pub(crate) fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
