//! Polling scheduler.
//!
//! One long-lived loop drives the data fetchers on two cadences: a slow
//! metadata refresh (project name, every 10 s) and a fast cue/broadcast
//! pass (every 100 ms). Disabling parks the loop rather than stopping
//! it, so re-enabling never has to relaunch anything. Enabling arms a
//! one-shot auto-disable timer; re-enabling supersedes any previous
//! timer, so at most one is ever armed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use crate::fetch::EngineMirror;
use crate::hub::BroadcastHub;
use crate::model::{PollingState, PollingStatePayload};

/// Scheduler cadences. Defaults carry the production values; tests
/// inject shorter ones.
#[derive(Debug, Clone)]
pub struct PollerSettings {
    /// Sleep between loop iterations, enabled or not.
    pub poll_interval: Duration,
    /// Minimum spacing of project-name refreshes.
    pub metadata_interval: Duration,
    /// Delay before an enabled poller switches itself off.
    pub auto_disable_after: Duration,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            metadata_interval: Duration::from_secs(10),
            auto_disable_after: Duration::from_secs(6 * 3600),
        }
    }
}

pub struct Poller {
    mirror: EngineMirror,
    hub: Arc<BroadcastHub>,
    settings: PollerSettings,
    auto_disable: Mutex<Option<JoinHandle<()>>>,
    loop_task: Mutex<Option<JoinHandle<()>>>,
}

impl Poller {
    pub fn new(mirror: EngineMirror, hub: Arc<BroadcastHub>, settings: PollerSettings) -> Arc<Self> {
        Arc::new(Self {
            mirror,
            hub,
            settings,
            auto_disable: Mutex::new(None),
            loop_task: Mutex::new(None),
        })
    }

    pub fn mirror(&self) -> &EngineMirror {
        &self.mirror
    }

    pub async fn state(&self) -> PollingState {
        self.mirror.store().polling_state().await
    }

    /// Launch the polling loop if it is not already running. The loop
    /// lives for the rest of the process; disabling only parks it.
    pub async fn start(&self) {
        let mut guard = self.loop_task.lock().await;
        if guard.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        *guard = Some(tokio::spawn(run_loop(
            self.mirror.clone(),
            Arc::clone(&self.hub),
            self.settings.clone(),
        )));
        info!("Polling loop started");
    }

    /// Enable polling. Returns `None` when polling was already on,
    /// `Some` with the new state otherwise. A real transition records
    /// the enable time, arms a fresh auto-disable timer, performs one
    /// full fetch cycle and broadcasts both the state change and the
    /// resulting snapshot. The store decides whether the transition
    /// happens, so concurrent callers see exactly one `Some`.
    pub async fn enable(&self) -> Option<PollingState> {
        let now = Utc::now();
        let deadline = now
            + chrono::Duration::from_std(self.settings.auto_disable_after)
                .unwrap_or_else(|_| chrono::Duration::zero());

        let Some(state) = self.mirror.store().enable_polling(now, deadline).await else {
            debug!("Polling already enabled");
            return None;
        };
        info!("Polling enabled, auto-disable at {}", deadline);

        self.start().await;
        self.arm_auto_disable().await;

        self.mirror.refresh_all().await;
        self.hub
            .broadcast_polling_state(&PollingStatePayload::new(state.clone()));
        self.hub
            .broadcast_snapshot(&self.mirror.store().snapshot_payload().await);
        Some(state)
    }

    /// Disable polling. Returns `None` when polling was already off.
    /// The loop keeps running idle.
    pub async fn disable(&self) -> Option<PollingState> {
        let Some(state) = self.mirror.store().disable_polling().await else {
            debug!("Polling already disabled");
            return None;
        };
        info!("Polling disabled");

        let mut guard = self.auto_disable.lock().await;
        if let Some(handle) = guard.take() {
            handle.abort();
        }
        drop(guard);

        self.hub
            .broadcast_polling_state(&PollingStatePayload::new(state.clone()));
        Some(state)
    }

    /// Fetch everything now and push the result, regardless of the
    /// polling state. Backs the external force-update trigger.
    pub async fn force_update(&self) {
        self.mirror.refresh_all().await;
        self.hub
            .broadcast_snapshot(&self.mirror.store().snapshot_payload().await);
    }

    async fn arm_auto_disable(&self) {
        let mut guard = self.auto_disable.lock().await;
        if let Some(previous) = guard.take() {
            previous.abort();
        }

        let mirror = self.mirror.clone();
        let hub = Arc::clone(&self.hub);
        let delay = self.settings.auto_disable_after;
        *guard = Some(tokio::spawn(async move {
            sleep(delay).await;
            if let Some(state) = mirror.store().disable_polling().await {
                info!("Polling auto-disabled after {:?}", delay);
                hub.broadcast_polling_state(&PollingStatePayload::new(state));
            }
        }));
    }
}

async fn run_loop(mirror: EngineMirror, hub: Arc<BroadcastHub>, settings: PollerSettings) {
    let mut last_metadata_refresh = Instant::now();

    loop {
        if mirror.store().polling_state().await.enabled {
            if last_metadata_refresh.elapsed() >= settings.metadata_interval {
                mirror.refresh_project_name().await;
                last_metadata_refresh = Instant::now();
            }

            // The timeline listing is cheap and carries the play/pause/
            // stop mode, so it is refreshed every pass.
            mirror.refresh_timelines().await;
            for handle in mirror.store().timeline_handles().await {
                mirror.refresh_cues(handle).await;
            }

            hub.broadcast_snapshot(&mirror.store().snapshot_payload().await);
        }

        sleep(settings.poll_interval).await;
    }
}
