//! In-memory mirror of the engine's timeline state and the wire
//! payloads derived from it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::countdown::Countdown;

/// Opaque engine handle identifying a timeline.
pub type TimelineHandle = i64;

/// One cue inside a timeline.
///
/// `original_countdown_ms` and `original_time_ms` keep the raw parse
/// results from the fetch cycle. They are never re-derived from the
/// (possibly substituted) `countdown` and are used only to decide
/// whether the cue appears in outward-facing views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cue {
    pub name: String,
    pub operation: String,
    pub note: String,
    pub countdown: Countdown,
    pub original_countdown_ms: i64,
    pub original_time_ms: Option<i64>,
}

/// A named playback sequence on the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeline {
    pub name: String,
    pub mode: String,
    pub cues: HashMap<String, Cue>,
}

/// Descriptive timeline fields, without cues. Used when rebuilding the
/// timeline map from a fresh engine listing.
#[derive(Debug, Clone)]
pub struct TimelineInfo {
    pub name: String,
    pub mode: String,
}

/// Whether the scheduler is actively polling, and since when.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollingState {
    pub enabled: bool,
    pub enabled_at: Option<DateTime<Utc>>,
    pub auto_disable_at: Option<DateTime<Utc>>,
}

/// The process-wide mirror of engine state. Exactly one instance lives
/// behind the [`SnapshotStore`](crate::store::SnapshotStore); every
/// read path (status, broadcast, initial viewer payload) consumes it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    pub timelines: HashMap<TimelineHandle, Timeline>,
    pub project_name: String,
    pub last_update: Option<DateTime<Utc>>,
    pub polling: PollingState,
}

/// One flattened countdown record pushed to viewers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountdownEntry {
    pub id: String,
    pub timeline_name: String,
    pub timeline_mode: String,
    pub cue_name: String,
    pub cue_type: String,
    pub note: String,
    pub raw_count: String,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
    pub frames: i64,
    pub total_ms: i64,
}

/// The full snapshot message sent to every viewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotPayload {
    pub project_name: String,
    pub countdowns: Vec<CountdownEntry>,
    pub polling: PollingState,
}

/// The smaller message sent when only the polling state changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingStatePayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub polling: PollingState,
}

impl PollingStatePayload {
    pub fn new(polling: PollingState) -> Self {
        Self {
            kind: "polling_state".to_string(),
            polling,
        }
    }
}

impl Snapshot {
    /// Build the flattened viewer payload.
    ///
    /// Cues whose pre-substitution countdown was negative have not
    /// started (or were unusable) and are excluded.
    pub fn countdown_payload(&self) -> SnapshotPayload {
        let mut countdowns = Vec::new();

        for (handle, timeline) in &self.timelines {
            for (cue_key, cue) in &timeline.cues {
                if cue.original_countdown_ms < 0 {
                    continue;
                }

                countdowns.push(CountdownEntry {
                    id: format!("{}-{}", handle, cue_key),
                    timeline_name: timeline.name.clone(),
                    timeline_mode: timeline.mode.clone(),
                    cue_name: cue_key.clone(),
                    cue_type: cue.operation.clone(),
                    note: cue.note.clone(),
                    raw_count: cue.countdown.raw.clone(),
                    hours: cue.countdown.hours,
                    minutes: cue.countdown.minutes,
                    seconds: cue.countdown.seconds,
                    frames: cue.countdown.frames,
                    total_ms: cue.countdown.total_ms,
                });
            }
        }

        SnapshotPayload {
            project_name: self.project_name.clone(),
            countdowns,
            polling: self.polling.clone(),
        }
    }
}
