//! The RPC binding layer's view of the transport.
//!
//! The transport itself — a bidirectional request/response plus server-push
//! channel — is an external collaborator. The runtime only needs to register
//! named handlers and push calls to the peer; [`Transport`] is that
//! contract. [`LoopbackTransport`] is an in-process implementation used by
//! tests and same-process hosting.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

use plugin_api::{ErrorObject, WireResult};

use crate::sync::{Mutex, RwLock};

pub type RpcHandlerFn = Arc<dyn Fn(Value) -> BoxFuture<'static, WireResult> + Send + Sync>;

pub type TransportErrorHook = Arc<dyn Fn(&TransportError) + Send + Sync>;

#[derive(Clone, Debug, Error)]
pub enum TransportError {
    #[error("no handler registered for `{0}`")]
    NoHandler(String),
    #[error("transport closed")]
    Closed,
    #[error("remote failure: {0}")]
    Remote(ErrorObject),
}

/// A named endpoint registration. `on_error` routes transport-side failures
/// for this endpoint into telemetry.
pub struct HandlerRegistration {
    pub name: String,
    pub handler: RpcHandlerFn,
    pub on_error: Option<TransportErrorHook>,
}

/// What the RPC binding layer requires of a transport.
pub trait Transport: Send + Sync + 'static {
    /// Registers a handler under a dotted endpoint name. A second
    /// registration under the same name replaces the first.
    fn register(&self, registration: HandlerRegistration);

    fn unregister(&self, name: &str);

    /// Calls a named endpoint on the remote peer (server pushes use this).
    fn call(&self, name: &str, payload: Value) -> BoxFuture<'static, Result<Value, TransportError>>;
}

/// In-process transport: one handler registry serves both directions, and
/// pushes with no registered handler are recorded for inspection.
#[derive(Default)]
pub struct LoopbackTransport {
    handlers: RwLock<HashMap<String, HandlerRegistration>>,
    pushes: Mutex<Vec<(String, Value)>>,
}

impl LoopbackTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Invokes a registered endpoint the way a remote peer would.
    pub async fn invoke(&self, name: &str, payload: Value) -> Result<Value, TransportError> {
        let (handler, on_error) = {
            let handlers = self.handlers.read();
            match handlers.get(name) {
                Some(registration) => (
                    Arc::clone(&registration.handler),
                    registration.on_error.clone(),
                ),
                None => return Err(TransportError::NoHandler(name.to_owned())),
            }
        };
        let result = handler(payload).await.into_result();
        match result {
            Ok(value) => Ok(value),
            Err(error) => {
                let error = TransportError::Remote(error);
                if let Some(on_error) = on_error {
                    on_error(&error);
                }
                Err(error)
            }
        }
    }

    /// Pushes that found no handler, in arrival order.
    pub fn recorded_pushes(&self) -> Vec<(String, Value)> {
        self.pushes.lock().clone()
    }

    /// Removes and returns the recorded pushes.
    pub fn take_pushes(&self) -> Vec<(String, Value)> {
        std::mem::take(&mut *self.pushes.lock())
    }
}

impl Transport for LoopbackTransport {
    fn register(&self, registration: HandlerRegistration) {
        self.handlers
            .write()
            .insert(registration.name.clone(), registration);
    }

    fn unregister(&self, name: &str) {
        self.handlers.write().remove(name);
    }

    fn call(&self, name: &str, payload: Value) -> BoxFuture<'static, Result<Value, TransportError>> {
        let handler = {
            let handlers = self.handlers.read();
            handlers
                .get(name)
                .map(|registration| Arc::clone(&registration.handler))
        };
        match handler {
            Some(handler) => Box::pin(async move {
                handler(payload)
                    .await
                    .into_result()
                    .map_err(TransportError::Remote)
            }),
            None => {
                self.pushes.lock().push((name.to_owned(), payload));
                Box::pin(async { Ok(Value::Null) })
            }
        }
    }
}
