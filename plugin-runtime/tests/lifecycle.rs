//! Lifecycle hooks: start/restart selection, stop ordering, and error
//! routing through `on_error`.

use serde_json::json;

use plugin_api::ErrorObject;
use plugin_runtime::{PluginDefinition, StartMode};

mod support;
use support::{flush_telemetry, test_host, Probe};

fn hooked_plugin(probe: &Probe) -> std::sync::Arc<PluginDefinition> {
    let p_start = probe.clone();
    let p_restart = probe.clone();
    let p_stop = probe.clone();
    PluginDefinition::builder("hooked")
        .event("noop")
        .on_start(move |_ctx| {
            let p = p_start.clone();
            async move {
                p.record("on_start");
                Ok(())
            }
        })
        .on_restart(move |_ctx| {
            let p = p_restart.clone();
            async move {
                p.record("on_restart");
                Ok(())
            }
        })
        .on_stop(move |_ctx| {
            let p = p_stop.clone();
            async move {
                p.record("on_stop");
                Ok(())
            }
        })
        .build()
}

#[tokio::test]
async fn fresh_starts_run_on_start() {
    let probe = Probe::new();
    let (host, _transport, _collector) = test_host();
    host.register(hooked_plugin(&probe), None).unwrap();
    host.start_all(StartMode::Fresh).await;
    host.stop_all().await;
    assert_eq!(probe.entries(), vec!["on_start", "on_stop"]);
}

#[tokio::test]
async fn restarts_run_on_restart_instead() {
    let probe = Probe::new();
    let (host, _transport, _collector) = test_host();
    host.register(hooked_plugin(&probe), None).unwrap();
    host.start_all(StartMode::Restart).await;
    host.stop_all().await;
    assert_eq!(probe.entries(), vec!["on_restart", "on_stop"]);
}

#[tokio::test]
async fn hook_failures_are_logged_and_routed_to_on_error() {
    let probe = Probe::new();
    let p_error = probe.clone();
    let definition = PluginDefinition::builder("fragile")
        .on_start(|_ctx| async { Err(ErrorObject::unknown("could not warm up")) })
        .on_error(move |_ctx, error| {
            let p = p_error.clone();
            async move { p.record(format!("on_error:{}", error.message)) }
        })
        .build();

    let (host, _transport, collector) = test_host();
    host.register(definition, None).unwrap();
    host.start_all(StartMode::Fresh).await;

    assert_eq!(probe.entries(), vec!["on_error:could not warm up"]);
    flush_telemetry(&host).await;
    assert!(collector
        .error_logs()
        .iter()
        .any(|log| log.message.contains("lifecycle hook onStart failed")));
    host.stop_all().await;
}

#[tokio::test]
async fn hooks_run_inside_their_own_spans() {
    let probe = Probe::new();
    let (host, _transport, collector) = test_host();
    host.register(hooked_plugin(&probe), None).unwrap();
    host.start_all(StartMode::Fresh).await;
    host.stop_all().await;

    flush_telemetry(&host).await;
    let spans = collector.spans();
    assert!(spans
        .iter()
        .any(|span| span.name == "plugin.hooked.lifecycle.onStart()"));
    assert!(spans
        .iter()
        .any(|span| span.name == "plugin.hooked.lifecycle.onStop()"));
    let start_span = spans
        .iter()
        .find(|span| span.name == "plugin.hooked.lifecycle.onStart()")
        .unwrap();
    assert!(start_span.end_ns >= start_span.start_ns);
    assert_eq!(
        start_span.duration_ns,
        start_span.end_ns - start_span.start_ns
    );
}

#[tokio::test]
async fn plugin_scoped_signals_carry_identity_attributes() {
    let probe = Probe::new();
    let (host, _transport, collector) = test_host();
    host.register(hooked_plugin(&probe), None).unwrap();
    host.start_all(StartMode::Fresh).await;
    host.stop_all().await;

    flush_telemetry(&host).await;
    let span = collector
        .spans()
        .into_iter()
        .find(|span| span.name == "plugin.hooked.lifecycle.onStart()")
        .unwrap();
    assert_eq!(span.attributes["plugin.name"], json!("hooked"));
    assert_eq!(span.attributes["agent.id"], json!("agent-test"));
}
