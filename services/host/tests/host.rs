//! Built-in plugins running on a real bus.

use std::time::Duration;

use rstest::rstest;
use switchyard_bus::{Bus, Config, PluginConfig, PluginRegistry};
use switchyard_events::{Action, Event, Payload, State};
use switchyard_host::plugins::HeartbeatPlugin;
use switchyard_host::{register_builtin, HostConfig};
use switchyard_testing::{Recorder, RecordingPlugin};

#[tokio::test]
async fn test_heartbeat_reaches_subscribers() {
    let recorder = Recorder::new();
    let registry = PluginRegistry::new();
    registry.register("heartbeat", || -> Box<dyn switchyard_bus::Plugin> {
        Box::new(HeartbeatPlugin::new(Duration::from_millis(20), "test"))
    });
    registry.register("poller", RecordingPlugin::factory(&["^heartbeat:create:test$"], &recorder));

    let config = Config::new()
        .plugin("heartbeat", PluginConfig::new(1))
        .plugin("poller", PluginConfig::new(1));
    let bus = Bus::new_test(&registry, config).unwrap();
    let capture = bus.capture();
    let shutdown = bus.shutdown_handle();
    let handle = tokio::spawn(bus.run());

    let event = capture
        .capture_named_event("heartbeat", Action::Create, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(event.name(), "heartbeat:create:test");
    assert!(recorder.wait_for_count(1, Duration::from_secs(1)).await);

    shutdown.trigger();
    handle.await.unwrap().unwrap();
}

#[rstest]
#[case::defaults("", &["audit", "heartbeat"])]
#[case::audit_only("[bus]\nenabled_plugins = [\"audit\"]", &["audit"])]
#[case::heartbeat_only("[bus]\nenabled_plugins = [\"heartbeat\"]", &["heartbeat"])]
#[tokio::test]
async fn test_config_builds_a_bus(#[case] overrides: &str, #[case] enabled: &[&str]) {
    let config = HostConfig::from_toml(overrides).unwrap();
    let registry = PluginRegistry::new();
    register_builtin(&registry);

    let bus = Bus::new(&registry, config.bus).unwrap();
    assert_eq!(bus.plugin_names(), vec!["audit", "heartbeat"]);
    assert!(!bus.is_queueing());

    let actual: Vec<&str> = bus
        .plugins()
        .iter()
        .filter(|p| p.is_enabled())
        .map(|p| p.name())
        .collect();
    assert_eq!(actual, enabled);
}

#[tokio::test]
async fn test_audit_does_not_swallow_events() {
    let config = HostConfig::from_toml(
        r#"
        [bus]
        enabled_plugins = ["audit"]
        "#,
    )
    .unwrap();
    let registry = PluginRegistry::new();
    register_builtin(&registry);

    let bus = Bus::new_test(&registry, config.bus).unwrap();
    let events = bus.events();
    let capture = bus.capture();
    let shutdown = bus.shutdown_handle();
    let handle = tokio::spawn(bus.run());

    let mut event = Event::status(Payload::bare("release:deploy"), State::Failed, "rollout stalled");
    event.set_artifact("KUBECONFIG", "secret-contents", true);
    events.send(event).await.unwrap();

    let captured = capture
        .capture_named_event("release:deploy", "status", Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(captured.state(), State::Failed);

    shutdown.trigger();
    handle.await.unwrap().unwrap();
}
