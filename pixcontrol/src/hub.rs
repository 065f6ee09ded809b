//! Fan-out of snapshot views to connected viewers.
//!
//! Each viewer is represented by the sending half of an unbounded
//! channel; the gateway owns the receiving half and forwards messages
//! onto the actual transport. Delivery is best-effort: a send failure
//! means the viewer went away, and the sender is pruned on the spot.

use std::sync::Mutex;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, warn};

use crate::model::{PollingStatePayload, SnapshotPayload};

#[derive(Debug, Default)]
pub struct BroadcastHub {
    viewers: Mutex<Vec<UnboundedSender<String>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new viewer. The initial full snapshot payload is
    /// delivered through the channel before it joins the broadcast set,
    /// so a fresh viewer is never left blank until the next cycle.
    pub fn register(&self, initial: &SnapshotPayload) -> UnboundedReceiver<String> {
        let (tx, rx) = unbounded_channel();
        if let Ok(json) = serde_json::to_string(initial) {
            let _ = tx.send(json);
        }
        let mut viewers = self.lock_viewers();
        viewers.push(tx);
        debug!("Viewer registered ({} connected)", viewers.len());
        rx
    }

    /// Push the full snapshot view to every connected viewer.
    pub fn broadcast_snapshot(&self, payload: &SnapshotPayload) {
        match serde_json::to_string(payload) {
            Ok(json) => self.send_all(json),
            Err(err) => warn!("Failed to serialize snapshot payload: {}", err),
        }
    }

    /// Push only the polling state, for when nothing else changed.
    pub fn broadcast_polling_state(&self, payload: &PollingStatePayload) {
        match serde_json::to_string(payload) {
            Ok(json) => self.send_all(json),
            Err(err) => warn!("Failed to serialize polling state payload: {}", err),
        }
    }

    pub fn viewer_count(&self) -> usize {
        self.lock_viewers().len()
    }

    fn send_all(&self, json: String) {
        let mut viewers = self.lock_viewers();
        let before = viewers.len();
        viewers.retain(|tx| tx.send(json.clone()).is_ok());
        let dropped = before - viewers.len();
        if dropped > 0 {
            debug!("Pruned {} disconnected viewer(s)", dropped);
        }
    }

    fn lock_viewers(&self) -> std::sync::MutexGuard<'_, Vec<UnboundedSender<String>>> {
        // The lock is only held for in-memory pushes; a poisoned lock
        // means a panicking sender, recover with the inner state.
        self.viewers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PollingState, SnapshotPayload};

    fn payload() -> SnapshotPayload {
        SnapshotPayload {
            project_name: "Show".to_string(),
            countdowns: vec![],
            polling: PollingState::default(),
        }
    }

    #[tokio::test]
    async fn new_viewer_gets_initial_payload_first() {
        let hub = BroadcastHub::new();
        let mut rx = hub.register(&payload());
        let first = rx.recv().await.unwrap();
        assert!(first.contains("\"projectName\":\"Show\""));
        assert_eq!(hub.viewer_count(), 1);
    }

    #[tokio::test]
    async fn broadcast_prunes_only_the_dead_viewer() {
        let hub = BroadcastHub::new();
        let mut alive_a = hub.register(&payload());
        let dead = hub.register(&payload());
        let mut alive_b = hub.register(&payload());
        drop(dead);

        hub.broadcast_snapshot(&payload());
        assert_eq!(hub.viewer_count(), 2);

        // Skip the initial payloads, then both survivors get the update.
        for rx in [&mut alive_a, &mut alive_b] {
            let _initial = rx.recv().await.unwrap();
            let update = rx.recv().await.unwrap();
            assert!(update.contains("countdowns"));
        }
    }

    #[tokio::test]
    async fn polling_state_broadcast_is_tagged() {
        let hub = BroadcastHub::new();
        let mut rx = hub.register(&payload());
        let _initial = rx.recv().await.unwrap();

        hub.broadcast_polling_state(&PollingStatePayload::new(PollingState::default()));
        let msg = rx.recv().await.unwrap();
        assert!(msg.contains("\"type\":\"polling_state\""));
    }
}
