//! The RPC surface: methods, event emit/subscribe/unsubscribe, context get,
//! and server pushes, exercised over the loopback transport the way a
//! remote peer would.

use serde_json::{json, Value};

use plugin_api::event::{endpoint, EventCallback};
use plugin_api::schema::Schema;
use plugin_api::ErrorCode;
use plugin_runtime::{PluginDefinition, StartMode, TransportError};

mod support;
use support::{settle, test_host};

fn chat_plugin() -> std::sync::Arc<PluginDefinition> {
    PluginDefinition::builder("chat")
        .context(
            Schema::object().field("sent", Schema::Integer).build(),
            json!({"sent": 0}),
        )
        .event_with_data("message", Schema::object().field("body", Schema::String).build())
        .method(
            "send",
            Schema::object().field("body", Schema::String).build(),
            Schema::object().field("id", Schema::String).build(),
            |ctx| async move {
                ctx.context.update(|mut value| {
                    value["sent"] = json!(value["sent"].as_i64().unwrap_or(0) + 1);
                    value
                });
                let body = ctx.input["body"].clone();
                let id = ctx
                    .events
                    .emit(
                        plugin_api::event::EmitRequest::new("message")
                            .with_data(json!({ "body": body })),
                    )
                    .map_err(|error| error.into_object())?;
                Ok(json!({ "id": id }))
            },
        )
        .build()
}

#[tokio::test]
async fn methods_are_invocable_over_the_wire() {
    let (host, transport, _collector) = test_host();
    let plugin = host.register(chat_plugin(), None).unwrap();
    host.start_all(StartMode::Fresh).await;

    let reply = transport
        .invoke(
            &endpoint::method("chat", "send"),
            json!({"body": "hi there"}),
        )
        .await
        .unwrap();
    assert!(reply["id"].as_str().is_some());
    assert_eq!(plugin.context().get()["sent"], json!(1));
    host.stop_all().await;
}

#[tokio::test]
async fn method_input_validation_failures_carry_diagnostics() {
    let (host, transport, _collector) = test_host();
    host.register(chat_plugin(), None).unwrap();
    host.start_all(StartMode::Fresh).await;

    let error = transport
        .invoke(&endpoint::method("chat", "send"), json!({"body": 7}))
        .await
        .unwrap_err();
    match error {
        TransportError::Remote(object) => {
            assert_eq!(object.code, ErrorCode::Validation);
            assert!(object.message.contains("method input rejected"));
            let cause = object.cause.expect("schema diagnostic attached");
            assert_eq!(cause["path"], json!("$.body"));
        }
        other => panic!("expected a remote failure, got {other:?}"),
    }
    host.stop_all().await;
}

#[tokio::test]
async fn unknown_methods_are_not_found() {
    let (host, transport, _collector) = test_host();
    host.register(chat_plugin(), None).unwrap();
    host.start_all(StartMode::Fresh).await;

    let error = transport
        .invoke(&endpoint::method("chat", "nope"), json!({}))
        .await;
    // The endpoint was never registered, so the transport itself rejects.
    assert!(matches!(error, Err(TransportError::NoHandler(_))));
    host.stop_all().await;
}

#[tokio::test]
async fn remote_emit_returns_the_assigned_id() {
    let (host, transport, _collector) = test_host();
    host.register(chat_plugin(), None).unwrap();
    host.start_all(StartMode::Fresh).await;

    let reply = transport
        .invoke(
            &endpoint::events_emit("chat"),
            json!({"type": "message", "data": {"body": "over the wire"}}),
        )
        .await
        .unwrap();
    assert!(reply["id"].as_str().is_some());

    let error = transport
        .invoke(&endpoint::events_emit("chat"), json!({"type": "missing"}))
        .await
        .unwrap_err();
    match error {
        TransportError::Remote(object) => assert_eq!(object.code, ErrorCode::NotFound),
        other => panic!("expected a remote failure, got {other:?}"),
    }
    host.stop_all().await;
}

#[tokio::test]
async fn remote_listeners_receive_callback_pushes() {
    let (host, transport, _collector) = test_host();
    host.register(chat_plugin(), None).unwrap();
    host.start_all(StartMode::Fresh).await;

    transport
        .invoke(
            &endpoint::events_subscribe("chat"),
            json!({"listenerId": "remote-1", "selector": "message"}),
        )
        .await
        .unwrap();

    transport
        .invoke(
            &endpoint::events_emit("chat"),
            json!({"type": "message", "data": {"body": "psst"}}),
        )
        .await
        .unwrap();
    settle().await;

    let pushes = transport.take_pushes();
    let callbacks: Vec<EventCallback> = pushes
        .into_iter()
        .filter(|(name, _)| name == &endpoint::events_callback("chat"))
        .map(|(_, payload)| serde_json::from_value(payload).unwrap())
        .collect();
    assert_eq!(callbacks.len(), 1);
    assert_eq!(callbacks[0].listener_id, "remote-1");
    assert_eq!(callbacks[0].event.event_type, "message");
    assert_eq!(callbacks[0].event.data, Some(json!({"body": "psst"})));

    // After unsubscribe, no more pushes.
    transport
        .invoke(
            &endpoint::events_unsubscribe("chat"),
            json!({"listenerId": "remote-1"}),
        )
        .await
        .unwrap();
    transport
        .invoke(
            &endpoint::events_emit("chat"),
            json!({"type": "message", "data": {"body": "again"}}),
        )
        .await
        .unwrap();
    settle().await;
    assert!(transport.take_pushes().iter().all(|(name, _)| {
        name != &endpoint::events_callback("chat")
    }));
    host.stop_all().await;
}

#[tokio::test]
async fn unsubscribing_an_unknown_listener_is_not_found() {
    let (host, transport, _collector) = test_host();
    host.register(chat_plugin(), None).unwrap();
    host.start_all(StartMode::Fresh).await;

    let error = transport
        .invoke(
            &endpoint::events_unsubscribe("chat"),
            json!({"listenerId": "ghost"}),
        )
        .await
        .unwrap_err();
    match error {
        TransportError::Remote(object) => assert_eq!(object.code, ErrorCode::NotFound),
        other => panic!("expected a remote failure, got {other:?}"),
    }
    host.stop_all().await;
}

#[tokio::test]
async fn context_get_returns_a_timestamped_snapshot() {
    let (host, transport, _collector) = test_host();
    host.register(chat_plugin(), None).unwrap();
    host.start_all(StartMode::Fresh).await;

    let snapshot = transport
        .invoke(&endpoint::context_get("chat"), Value::Null)
        .await
        .unwrap();
    assert_eq!(snapshot["value"], json!({"sent": 0}));
    assert!(snapshot["timestamp"].as_u64().is_some());
    host.stop_all().await;
}

#[tokio::test]
async fn stopping_a_plugin_unregisters_its_endpoints() {
    let (host, transport, _collector) = test_host();
    host.register(chat_plugin(), None).unwrap();
    host.start_all(StartMode::Fresh).await;
    host.stop_all().await;

    let error = transport
        .invoke(&endpoint::context_get("chat"), Value::Null)
        .await;
    assert!(matches!(error, Err(TransportError::NoHandler(_))));
}
