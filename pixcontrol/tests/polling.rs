//! Scheduler state machine seen from a viewer's perspective. The
//! engine is offline throughout; fetch cycles degrade to "no data" and
//! the broadcasts still flow.
//!
//! The loop's own broadcast pass may interleave with the ones issued by
//! enable/disable, so assertions scan the message stream instead of
//! assuming a strict order.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;

use pixcontrol::fetch::EngineMirror;
use pixcontrol::hub::BroadcastHub;
use pixcontrol::poller::{Poller, PollerSettings};
use pixcontrol::rpc::EngineClient;
use pixcontrol::store::SnapshotStore;

fn offline_setup(settings: PollerSettings) -> (Arc<Poller>, Arc<BroadcastHub>) {
    let client = EngineClient::with_timeout("127.0.0.1", 9, Duration::from_millis(100));
    let mirror = EngineMirror::new(client, Arc::new(SnapshotStore::new()));
    let hub = Arc::new(BroadcastHub::new());
    let poller = Poller::new(mirror, Arc::clone(&hub), settings);
    (poller, hub)
}

fn quiet_settings(auto_disable_after: Duration) -> PollerSettings {
    PollerSettings {
        poll_interval: Duration::from_secs(60),
        metadata_interval: Duration::from_secs(60),
        auto_disable_after,
    }
}

/// Receive messages until one matches, failing after two seconds.
async fn wait_for(
    rx: &mut UnboundedReceiver<String>,
    what: &str,
    matches: impl Fn(&Value) -> bool,
) -> Value {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let msg = tokio::time::timeout_at(deadline, rx.recv())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {}", what))
            .expect("hub closed unexpectedly");
        let value: Value = serde_json::from_str(&msg).unwrap();
        if matches(&value) {
            return value;
        }
    }
}

fn is_polling_state(value: &Value, enabled: bool) -> bool {
    value["type"] == "polling_state" && value["polling"]["enabled"] == Value::Bool(enabled)
}

#[tokio::test]
async fn enable_broadcasts_state_change_and_snapshot() {
    let (poller, hub) = offline_setup(quiet_settings(Duration::from_secs(3600)));

    let initial_payload = poller.mirror().store().snapshot_payload().await;
    let mut rx = hub.register(&initial_payload);

    let initial: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
    assert!(initial.get("countdowns").is_some());
    assert_eq!(initial["polling"]["enabled"], Value::Bool(false));

    poller.enable().await;

    wait_for(&mut rx, "enabled polling_state", |value| {
        is_polling_state(value, true)
    })
    .await;
    let snapshot = wait_for(&mut rx, "enabled snapshot", |value| {
        value.get("countdowns").is_some() && value["polling"]["enabled"] == Value::Bool(true)
    })
    .await;
    assert!(snapshot["polling"]["auto_disable_at"].is_string());
}

#[tokio::test]
async fn auto_disable_announces_itself_to_viewers() {
    let (poller, hub) = offline_setup(quiet_settings(Duration::from_millis(50)));

    let initial_payload = poller.mirror().store().snapshot_payload().await;
    let mut rx = hub.register(&initial_payload);
    poller.enable().await;

    wait_for(&mut rx, "auto-disable polling_state", |value| {
        is_polling_state(value, false)
    })
    .await;
    assert!(!poller.state().await.enabled);
}

#[tokio::test]
async fn manual_disable_broadcasts_cleared_state() {
    let (poller, hub) = offline_setup(quiet_settings(Duration::from_secs(3600)));

    let initial_payload = poller.mirror().store().snapshot_payload().await;
    let mut rx = hub.register(&initial_payload);

    poller.enable().await;
    let state = poller.disable().await.expect("transition out of enabled");
    assert!(!state.enabled);
    assert!(state.enabled_at.is_none());
    assert!(state.auto_disable_at.is_none());

    let msg = wait_for(&mut rx, "disabled polling_state", |value| {
        is_polling_state(value, false)
    })
    .await;
    assert_eq!(msg["polling"]["enabled_at"], Value::Null);
}
