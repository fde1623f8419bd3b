//! The per-plugin event pipeline: stage ordering, urgency, listener
//! selectors, and error routing.

use std::time::Duration;

use serde_json::{json, Value};

use plugin_api::event::EmitRequest;
use plugin_api::schema::Schema;
use plugin_api::selector::{IncludeSpec, Selector, SelectorFilter};
use plugin_runtime::{PluginDefinition, RuntimeError, StartMode};

mod support;
use support::{settle, test_host, Probe};

#[tokio::test]
async fn effects_run_in_declaration_order_before_listeners() {
    let probe = Probe::new();
    let p1 = probe.clone();
    let p2 = probe.clone();
    let definition = PluginDefinition::builder("ordered")
        .event("go")
        .effect(move |ctx| {
            let probe = p1.clone();
            async move {
                probe.record(format!("effect1:{}", ctx.event.event_type));
                Ok(())
            }
        })
        .effect(move |ctx| {
            let probe = p2.clone();
            async move {
                probe.record(format!("effect2:{}", ctx.event.event_type));
                Ok(())
            }
        })
        .build();

    let (host, _transport, _collector) = test_host();
    let plugin = host.register(definition, None).unwrap();
    host.start_all(StartMode::Fresh).await;

    let p3 = probe.clone();
    let _sub = plugin.on("go", move |event| {
        let probe = p3.clone();
        async move {
            probe.record(format!("listener:{}", event.event_type));
        }
    });

    plugin.emitter().emit_type("go", None).unwrap();
    let entries = probe.wait_for(3).await;
    assert_eq!(entries, vec!["effect1:go", "effect2:go", "listener:go"]);
    host.stop_all().await;
}

#[tokio::test]
async fn urgent_events_jump_the_queue_without_preempting() {
    let probe = Probe::new();
    let p = probe.clone();
    let definition = PluginDefinition::builder("urgency")
        .event_with_data("e", Schema::String)
        .effect(move |ctx| {
            let probe = p.clone();
            async move {
                let data = ctx.event.data.as_ref().and_then(Value::as_str).unwrap_or("?");
                probe.record(data.to_owned());
                tokio::time::sleep(Duration::from_millis(60)).await;
                Ok(())
            }
        })
        .build();

    let (host, _transport, _collector) = test_host();
    let plugin = host.register(definition, None).unwrap();
    host.start_all(StartMode::Fresh).await;

    let emitter = plugin.emitter();
    emitter
        .emit(EmitRequest::new("e").with_data("e1"))
        .unwrap();
    // Let e1 go in-flight, then queue the rest.
    tokio::time::sleep(Duration::from_millis(20)).await;
    emitter
        .emit(EmitRequest::new("e").with_data("e2"))
        .unwrap();
    emitter
        .emit(EmitRequest::new("e").with_data("e3").urgent())
        .unwrap();
    emitter
        .emit(EmitRequest::new("e").with_data("e4"))
        .unwrap();

    let entries = probe.wait_for(4).await;
    assert_eq!(entries, vec!["e1", "e3", "e2", "e4"]);
    host.stop_all().await;
}

#[tokio::test]
async fn emit_validates_types_and_data() {
    let definition = PluginDefinition::builder("validated")
        .event("bare")
        .event_with_data("typed", Schema::object().field("n", Schema::Integer).build())
        .build();

    let (host, _transport, _collector) = test_host();
    let plugin = host.register(definition, None).unwrap();
    let emitter = plugin.emitter();

    let unknown = emitter.emit_type("nope", None).unwrap_err();
    assert!(matches!(unknown, RuntimeError::UnknownEvent(_)));

    let unexpected = emitter
        .emit(EmitRequest::new("bare").with_data(json!({"x": 1})))
        .unwrap_err();
    assert!(matches!(unexpected, RuntimeError::UnexpectedData(_)));

    let mismatch = emitter
        .emit(EmitRequest::new("typed").with_data(json!({"n": "one"})))
        .unwrap_err();
    assert!(matches!(mismatch, RuntimeError::Validation(_)));

    let id = emitter
        .emit(EmitRequest::new("typed").with_data(json!({"n": 1})))
        .unwrap();
    assert!(!id.is_empty());
    host.stop_all().await;
}

#[tokio::test]
async fn each_matching_listener_sees_the_event_exactly_once() {
    let definition = PluginDefinition::builder("fanout")
        .event("a")
        .event("b")
        .build();

    let (host, _transport, _collector) = test_host();
    let plugin = host.register(definition, None).unwrap();
    host.start_all(StartMode::Fresh).await;

    let all = Probe::new();
    let listed = Probe::new();
    let filtered = Probe::new();
    let single = Probe::new();

    let p = all.clone();
    let _s1 = plugin.on(Selector::all(), move |event| {
        let p = p.clone();
        async move { p.record(format!("{}:{}", event.event_type, event.id)) }
    });
    let p = listed.clone();
    let _s2 = plugin.on(["a", "b"], move |event| {
        let p = p.clone();
        async move { p.record(event.event_type) }
    });
    let p = filtered.clone();
    let _s3 = plugin.on(
        Selector::Filter(SelectorFilter {
            include: IncludeSpec::Wildcard("*".into()),
            exclude: Some(vec!["b".into()]),
        }),
        move |event| {
            let p = p.clone();
            async move { p.record(event.event_type) }
        },
    );
    let p = single.clone();
    let _s4 = plugin.on("b", move |event| {
        let p = p.clone();
        async move { p.record(event.event_type) }
    });

    let id_a = plugin.emitter().emit_type("a", None).unwrap();
    let id_b = plugin.emitter().emit_type("b", None).unwrap();

    let seen = all.wait_for(2).await;
    assert_eq!(seen, vec![format!("a:{id_a}"), format!("b:{id_b}")]);
    assert_eq!(listed.settled().await, vec!["a", "b"]);
    assert_eq!(filtered.settled().await, vec!["a"]);
    assert_eq!(single.settled().await, vec!["b"]);
    host.stop_all().await;
}

#[tokio::test]
async fn once_listeners_fire_at_most_once() {
    let definition = PluginDefinition::builder("once").event("ping").build();

    let (host, _transport, _collector) = test_host();
    let plugin = host.register(definition, None).unwrap();
    host.start_all(StartMode::Fresh).await;

    let probe = Probe::new();
    let p = probe.clone();
    let _sub = plugin.once("ping", move |event| {
        let p = p.clone();
        async move { p.record(event.id) }
    });

    plugin.emitter().emit_type("ping", None).unwrap();
    plugin.emitter().emit_type("ping", None).unwrap();
    settle().await;
    assert_eq!(probe.entries().len(), 1);
    host.stop_all().await;
}

#[tokio::test]
async fn unsubscribed_listeners_stop_receiving() {
    let definition = PluginDefinition::builder("unsub").event("ping").build();

    let (host, _transport, _collector) = test_host();
    let plugin = host.register(definition, None).unwrap();
    host.start_all(StartMode::Fresh).await;

    let probe = Probe::new();
    let p = probe.clone();
    let sub = plugin.on("ping", move |event| {
        let p = p.clone();
        async move { p.record(event.id) }
    });

    plugin.emitter().emit_type("ping", None).unwrap();
    probe.wait_for(1).await;
    sub.unsubscribe();
    plugin.emitter().emit_type("ping", None).unwrap();
    settle().await;
    assert_eq!(probe.entries().len(), 1);
    host.stop_all().await;
}

#[tokio::test]
async fn effect_errors_route_to_on_error_and_the_pump_continues() {
    let probe = Probe::new();
    let p_effect = probe.clone();
    let p_error = probe.clone();
    let definition = PluginDefinition::builder("faulty")
        .event_with_data("e", Schema::String)
        .effect(move |ctx| {
            let probe = p_effect.clone();
            async move {
                let data = ctx.event.data.clone().unwrap_or(Value::Null);
                if data == json!("bad") {
                    return Err(plugin_api::ErrorObject::unknown("effect exploded"));
                }
                probe.record(format!("ok:{}", data.as_str().unwrap_or("?")));
                Ok(())
            }
        })
        .on_error(move |_ctx, error| {
            let probe = p_error.clone();
            async move { probe.record(format!("on_error:{}", error.message)) }
        })
        .build();

    let (host, _transport, collector) = test_host();
    let plugin = host.register(definition, None).unwrap();
    host.start_all(StartMode::Fresh).await;

    let emitter = plugin.emitter();
    emitter.emit(EmitRequest::new("e").with_data("bad")).unwrap();
    emitter.emit(EmitRequest::new("e").with_data("good")).unwrap();

    let entries = probe.wait_for(2).await;
    assert_eq!(entries, vec!["on_error:effect exploded", "ok:good"]);

    support::flush_telemetry(&host).await;
    assert!(collector
        .error_logs()
        .iter()
        .any(|log| log.message.contains("event pipeline failed")));
    host.stop_all().await;
}

#[tokio::test]
async fn services_receive_events_in_pump_order_and_can_emit_back() {
    let probe = Probe::new();
    let p_service = probe.clone();
    let definition = PluginDefinition::builder("serviced")
        .event_with_data("in", Schema::String)
        .event("echoed")
        .service("echoer", move |ctx| {
            let probe = p_service.clone();
            async move {
                while let Some(event) = ctx.next_event().await {
                    if event.event_type == "in" {
                        let data = event.data.clone().unwrap_or(Value::Null);
                        probe.record(format!("service:{}", data.as_str().unwrap_or("?")));
                        ctx.events.emit_type("echoed", None).unwrap();
                    }
                }
                probe.record("service:stopped");
            }
        })
        .build();

    let (host, _transport, _collector) = test_host();
    let plugin = host.register(definition, None).unwrap();
    host.start_all(StartMode::Fresh).await;

    let p_listener = probe.clone();
    let _sub = plugin.on("echoed", move |_event| {
        let p = p_listener.clone();
        async move { p.record("listener:echoed") }
    });

    plugin.emitter().emit(EmitRequest::new("in").with_data("one")).unwrap();
    plugin.emitter().emit(EmitRequest::new("in").with_data("two")).unwrap();

    let entries = probe.wait_for(4).await;
    let services: Vec<_> = entries.iter().filter(|e| e.starts_with("service:")).collect();
    assert_eq!(services, vec!["service:one", "service:two"]);
    assert!(entries.iter().filter(|e| *e == "listener:echoed").count() >= 1);

    host.stop_all().await;
    probe
        .settled()
        .await
        .iter()
        .find(|entry| *entry == "service:stopped")
        .expect("service should observe end-of-stream on stop");
}
