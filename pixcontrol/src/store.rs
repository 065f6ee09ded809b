//! Guarded owner of the process-wide [`Snapshot`].
//!
//! Every mutation and read goes through an accessor that takes the
//! internal async mutex, so no call site can touch the snapshot
//! unlocked. The lock is only ever held across in-memory work, never
//! across an engine call, so a hung fetch blocks nothing but itself.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::model::{
    Cue, PollingState, Snapshot, SnapshotPayload, Timeline, TimelineHandle, TimelineInfo,
};

#[derive(Debug, Default)]
pub struct SnapshotStore {
    inner: Mutex<Snapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_project_name(&self, name: String) {
        let mut snapshot = self.inner.lock().await;
        snapshot.project_name = name;
        snapshot.last_update = Some(Utc::now());
    }

    /// Replace the timeline map with a fresh engine listing.
    ///
    /// Handles the engine no longer reports disappear together with
    /// their cues. Surviving handles keep their previously fetched cue
    /// maps until the next cue fetch replaces them, so a timed-out cue
    /// fetch later in the cycle leaves last-known cues in place.
    pub async fn replace_timelines(&self, fresh: HashMap<TimelineHandle, TimelineInfo>) {
        let mut snapshot = self.inner.lock().await;
        let mut previous = std::mem::take(&mut snapshot.timelines);

        snapshot.timelines = fresh
            .into_iter()
            .map(|(handle, info)| {
                let cues = previous
                    .remove(&handle)
                    .map(|timeline| timeline.cues)
                    .unwrap_or_default();
                (
                    handle,
                    Timeline {
                        name: info.name,
                        mode: info.mode,
                        cues,
                    },
                )
            })
            .collect();
        snapshot.last_update = Some(Utc::now());
    }

    /// Replace one timeline's cue map wholesale. Ignored when the
    /// handle is no longer part of the snapshot.
    pub async fn replace_cues(&self, handle: TimelineHandle, cues: HashMap<String, Cue>) {
        let mut snapshot = self.inner.lock().await;
        if let Some(timeline) = snapshot.timelines.get_mut(&handle) {
            timeline.cues = cues;
            snapshot.last_update = Some(Utc::now());
        }
    }

    pub async fn timeline_handles(&self) -> Vec<TimelineHandle> {
        let snapshot = self.inner.lock().await;
        snapshot.timelines.keys().copied().collect()
    }

    pub async fn polling_state(&self) -> PollingState {
        self.inner.lock().await.polling.clone()
    }

    /// Flip polling on. Returns `None` when polling was already
    /// enabled, leaving `enabled_at` untouched.
    pub async fn enable_polling(
        &self,
        now: DateTime<Utc>,
        auto_disable_at: DateTime<Utc>,
    ) -> Option<PollingState> {
        let mut snapshot = self.inner.lock().await;
        if snapshot.polling.enabled {
            return None;
        }
        snapshot.polling = PollingState {
            enabled: true,
            enabled_at: Some(now),
            auto_disable_at: Some(auto_disable_at),
        };
        Some(snapshot.polling.clone())
    }

    /// Flip polling off. Returns `None` when polling was already
    /// disabled.
    pub async fn disable_polling(&self) -> Option<PollingState> {
        let mut snapshot = self.inner.lock().await;
        if !snapshot.polling.enabled {
            return None;
        }
        snapshot.polling = PollingState::default();
        Some(snapshot.polling.clone())
    }

    /// Clone of the full snapshot, for the status endpoint.
    pub async fn snapshot(&self) -> Snapshot {
        self.inner.lock().await.clone()
    }

    /// Flattened viewer payload built from the current snapshot.
    pub async fn snapshot_payload(&self) -> SnapshotPayload {
        self.inner.lock().await.countdown_payload()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::countdown::Countdown;

    fn cue(name: &str) -> Cue {
        Cue {
            name: name.to_string(),
            operation: "Play".to_string(),
            note: String::new(),
            countdown: Countdown::zero(),
            original_countdown_ms: 0,
            original_time_ms: None,
        }
    }

    fn info(name: &str) -> TimelineInfo {
        TimelineInfo {
            name: name.to_string(),
            mode: "stop".to_string(),
        }
    }

    #[tokio::test]
    async fn surviving_handles_keep_cues_until_refetched() {
        let store = SnapshotStore::new();
        store
            .replace_timelines(HashMap::from([(1, info("A")), (2, info("B"))]))
            .await;
        store
            .replace_cues(1, HashMap::from([("c1".to_string(), cue("c1"))]))
            .await;

        // Fresh listing still reports handle 1, drops handle 2.
        store
            .replace_timelines(HashMap::from([(1, info("A renamed")), (3, info("C"))]))
            .await;

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.timelines.len(), 2);
        assert!(snapshot.timelines.get(&2).is_none());
        let survivor = snapshot.timelines.get(&1).unwrap();
        assert_eq!(survivor.name, "A renamed");
        assert_eq!(survivor.cues.len(), 1, "cues survive a timeline refresh");
        assert!(snapshot.timelines.get(&3).unwrap().cues.is_empty());
    }

    #[tokio::test]
    async fn replace_cues_ignores_unknown_handle() {
        let store = SnapshotStore::new();
        store
            .replace_cues(9, HashMap::from([("c".to_string(), cue("c"))]))
            .await;
        assert!(store.snapshot().await.timelines.is_empty());
    }

    #[tokio::test]
    async fn polling_transitions_are_idempotent() {
        let store = SnapshotStore::new();
        assert!(store.disable_polling().await.is_none());

        let now = Utc::now();
        let until = now + chrono::Duration::hours(6);
        let state = store.enable_polling(now, until).await.unwrap();
        assert!(state.enabled);
        assert_eq!(state.enabled_at, Some(now));
        assert_eq!(state.auto_disable_at, Some(until));

        assert!(store.enable_polling(Utc::now(), until).await.is_none());
        assert_eq!(store.polling_state().await.enabled_at, Some(now));

        let state = store.disable_polling().await.unwrap();
        assert!(!state.enabled);
        assert!(state.enabled_at.is_none());
        assert!(store.disable_polling().await.is_none());
    }
}
