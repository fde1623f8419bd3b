//! Per-plugin context: deep-clone snapshot discipline and projected change
//! listeners.
//!
//! The live context value never escapes by reference. Readers get a deep
//! clone; updater functions receive a deep clone of the current value; and
//! change listeners observe pre-change and post-change snapshots of the
//! whole context. Structural equality over [`serde_json::Value`] is the
//! change gate, so a `set` that leaves a listener's projection structurally
//! unchanged does not fire that listener.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use uuid::Uuid;

use plugin_api::schema::{Schema, SchemaError};

use crate::events::{ListenerId, Subscription};
use crate::sync::Mutex;

/// Extracts a comparable value from the context.
pub type ProjectionFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Receives `(new_projection, old_projection)` when they differ.
pub type ContextCallbackFn = Arc<dyn Fn(Value, Value) -> BoxFuture<'static, ()> + Send + Sync>;

/// Receives a deep clone of the new whole-context value on every `set`.
pub(crate) type ContextPushFn = Arc<dyn Fn(Value) + Send + Sync>;

struct ContextListener {
    projection: ProjectionFn,
    callback: ContextCallbackFn,
}

pub(crate) struct ContextCell {
    value: Mutex<Value>,
    listeners: Arc<Mutex<HashMap<ListenerId, ContextListener>>>,
    /// Transport-side `context.changed` push, installed by the server.
    push: Mutex<Option<ContextPushFn>>,
}

impl ContextCell {
    pub(crate) fn new(schema: &Schema, initial: Value) -> Result<Arc<Self>, SchemaError> {
        let initial = schema.parse(initial)?;
        Ok(Arc::new(Self {
            value: Mutex::new(initial),
            listeners: Arc::new(Mutex::new(HashMap::new())),
            push: Mutex::new(None),
        }))
    }

    pub(crate) fn set_push_hook(&self, push: ContextPushFn) {
        *self.push.lock() = Some(push);
    }

    fn get(&self) -> Value {
        self.value.lock().clone()
    }

    fn set_with(&self, update: impl FnOnce(Value) -> Value) {
        let (old, new) = {
            let mut value = self.value.lock();
            let old = value.clone();
            let new = update(old.clone());
            *value = new.clone();
            (old, new)
        };
        self.after_set(old, new);
    }

    /// Notifies listeners (concurrently, off this task) and fires the
    /// transport push. Both see snapshots, never the live value.
    fn after_set(&self, old: Value, new: Value) {
        let selected: Vec<(ContextCallbackFn, Value, Value)> = {
            let listeners = self.listeners.lock();
            listeners
                .values()
                .filter_map(|listener| {
                    let new_projection = (listener.projection)(&new);
                    let old_projection = (listener.projection)(&old);
                    if new_projection == old_projection {
                        None
                    } else {
                        Some((
                            Arc::clone(&listener.callback),
                            new_projection,
                            old_projection,
                        ))
                    }
                })
                .collect()
        };
        if !selected.is_empty() {
            crate::spawn_named(
                async move {
                    futures::future::join_all(
                        selected
                            .into_iter()
                            .map(|(callback, new_projection, old_projection)| {
                                callback(new_projection, old_projection)
                            }),
                    )
                    .await;
                },
                "plugin-runtime/context-notify",
            );
        }
        if let Some(push) = self.push.lock().clone() {
            push(new);
        }
    }

    fn on_change(
        self: &Arc<Self>,
        projection: ProjectionFn,
        callback: ContextCallbackFn,
    ) -> Subscription {
        let id: ListenerId = Uuid::new_v4().to_string();
        self.listeners.lock().insert(
            id.clone(),
            ContextListener {
                projection,
                callback,
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
}

/// Writable handle to a plugin's context, given to effects, services,
/// methods, and lifecycle hooks of the owning plugin.
#[derive(Clone)]
pub struct ContextHandle {
    cell: Arc<ContextCell>,
}

impl ContextHandle {
    pub(crate) fn new(cell: Arc<ContextCell>) -> Self {
        Self { cell }
    }

    /// A deep clone of the current context, unaffected by later mutation.
    pub fn get(&self) -> Value {
        self.cell.get()
    }

    /// Replaces the whole context.
    pub fn set(&self, value: Value) {
        self.cell.set_with(|_| value);
    }

    /// Computes the new whole-context value from a deep clone of the current
    /// one. Updaters are serialized; each sees its predecessor's result.
    pub fn update(&self, update: impl FnOnce(Value) -> Value) {
        self.cell.set_with(update);
    }

    /// Registers a projected change listener. The callback receives the new
    /// and old projections, and only fires when they are not structurally
    /// equal.
    pub fn on_change<P, F, Fut>(&self, projection: P, callback: F) -> Subscription
    where
        P: Fn(&Value) -> Value + Send + Sync + 'static,
        F: Fn(Value, Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.cell.on_change(
            Arc::new(projection),
            Arc::new(move |new, old| Box::pin(callback(new, old))),
        )
    }

    /// A read-only view of the same context.
    pub fn reader(&self) -> ContextReader {
        ContextReader {
            cell: Arc::clone(&self.cell),
        }
    }
}

/// Read-only view of a plugin's context, exposed to other plugins through
/// dependency views.
#[derive(Clone)]
pub struct ContextReader {
    cell: Arc<ContextCell>,
}

impl ContextReader {
    /// A deep clone of the current context.
    pub fn get(&self) -> Value {
        self.cell.get()
    }
}
