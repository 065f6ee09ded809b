//! Data fetchers orchestrating engine calls into the snapshot store.
//!
//! Each fetcher performs its network round trips first and only then
//! takes the store lock, so a slow engine never blocks snapshot
//! readers. An empty client reply means "no data this cycle" and leaves
//! the previously known state in place.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::countdown::Countdown;
use crate::model::{Cue, TimelineHandle, TimelineInfo};
use crate::rpc::{EngineClient, methods};
use crate::store::SnapshotStore;

/// Keeps the snapshot store in sync with the engine.
#[derive(Clone)]
pub struct EngineMirror {
    client: EngineClient,
    store: Arc<SnapshotStore>,
}

/// Cue record as reported by the engine. Everything is optional; the
/// engine omits fields freely.
#[derive(Debug, Default, Deserialize)]
struct CueRecord {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    handle: Option<Value>,
    #[serde(default)]
    operation: Option<String>,
    #[serde(default)]
    note: Option<String>,
    #[serde(default)]
    countdown: Option<String>,
    #[serde(default)]
    time: Option<String>,
}

/// Timeline info blob, JSON-encoded as a string by the engine.
#[derive(Debug, Default, Deserialize)]
struct TimelineInfoRecord {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "Mode")]
    mode: Option<String>,
}

impl EngineMirror {
    pub fn new(client: EngineClient, store: Arc<SnapshotStore>) -> Self {
        Self { client, store }
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    /// Refresh the project name from the engine session.
    pub async fn refresh_project_name(&self) {
        let reply = self.client.call(methods::GET_PROJECT_NAME, None).await;
        let Some(name) = reply.get("result").and_then(Value::as_str) else {
            debug!("No project name from engine this cycle");
            return;
        };
        self.store.set_project_name(name.to_string()).await;
        debug!("Project name updated: {}", name);
    }

    /// Refresh the timeline listing: one call for the handle list, then
    /// one info call per handle. The timeline map is replaced wholesale;
    /// handles no longer reported disappear.
    pub async fn refresh_timelines(&self) {
        let reply = self.client.call(methods::GET_TIMELINES, None).await;
        let Some(result) = reply.get("result") else {
            debug!("No timeline listing from engine this cycle");
            return;
        };

        let handles: Vec<TimelineHandle> = match serde_json::from_value(result.clone()) {
            Ok(handles) => handles,
            Err(err) => {
                warn!("Unexpected timeline listing shape: {}", err);
                return;
            }
        };

        let mut fresh = HashMap::with_capacity(handles.len());
        for handle in handles {
            let info = self
                .client
                .call(methods::GET_TIMELINE_INFO, Some(json!({ "handle": handle })))
                .await;
            fresh.insert(handle, decode_timeline_info(handle, info.get("result")));
        }

        let count = fresh.len();
        self.store.replace_timelines(fresh).await;
        info!("Timelines updated: {} timelines found", count);
    }

    /// Refresh the cue map of one timeline. A failed call skips the
    /// update, leaving last-known cues in place; a well-formed reply
    /// replaces the map wholesale.
    pub async fn refresh_cues(&self, handle: TimelineHandle) {
        let reply = self
            .client
            .call(methods::GET_CUE_INFO, Some(json!({ "handle": handle })))
            .await;
        let Some(result) = reply.get("result") else {
            debug!("No cue data for timeline {} this cycle", handle);
            return;
        };

        let records = decode_cue_records(handle, result);
        let mut cues = HashMap::with_capacity(records.len());
        for record in records {
            if let Some((key, cue)) = build_cue(record) {
                cues.insert(key, cue);
            }
        }

        let count = cues.len();
        self.store.replace_cues(handle, cues).await;
        debug!("Cues updated for timeline {}: {} cues", handle, count);
    }

    /// One full fetch cycle: project name, timeline listing, then cues
    /// for every known handle, sequentially.
    pub async fn refresh_all(&self) {
        self.refresh_project_name().await;
        self.refresh_timelines().await;
        for handle in self.store.timeline_handles().await {
            self.refresh_cues(handle).await;
        }
    }
}

fn decode_timeline_info(handle: TimelineHandle, result: Option<&Value>) -> TimelineInfo {
    let record = match result {
        Some(Value::String(encoded)) => match serde_json::from_str::<TimelineInfoRecord>(encoded) {
            Ok(record) => record,
            Err(err) => {
                debug!("Unreadable info for timeline {}: {}", handle, err);
                TimelineInfoRecord::default()
            }
        },
        Some(value) => match serde_json::from_value::<TimelineInfoRecord>(value.clone()) {
            Ok(record) => record,
            Err(err) => {
                debug!("Unexpected info shape for timeline {}: {}", handle, err);
                TimelineInfoRecord::default()
            }
        },
        None => TimelineInfoRecord::default(),
    };

    TimelineInfo {
        name: record.name.unwrap_or_else(|| format!("Timeline_{}", handle)),
        mode: record.mode.unwrap_or_else(|| "unknown".to_string()),
    }
}

/// The cue listing arrives either as a JSON-encoded string or as a
/// native array. Anything else counts as an empty listing.
fn decode_cue_records(handle: TimelineHandle, result: &Value) -> Vec<CueRecord> {
    let decoded = match result {
        Value::String(encoded) => serde_json::from_str(encoded),
        other => serde_json::from_value(other.clone()),
    };
    match decoded {
        Ok(records) => records,
        Err(err) => {
            debug!("Unreadable cue listing for timeline {}: {}", handle, err);
            Vec::new()
        }
    }
}

/// Build a stored cue from an engine record, applying the countdown
/// fallback policy.
///
/// The countdown and time fields are parsed independently. A negative
/// parsed countdown is replaced by the parsed time when that value is
/// non-negative (keeping the countdown's raw string); without a usable
/// time value it is clamped to zero with a warning. The
/// pre-substitution parse results are recorded for later filtering.
/// Returns `None` when the record carries neither name nor handle.
fn build_cue(record: CueRecord) -> Option<(String, Cue)> {
    let key = match record.name.as_deref() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => match &record.handle {
            Some(Value::String(handle)) => handle.clone(),
            Some(Value::Number(handle)) => handle.to_string(),
            _ => {
                debug!("Skipping cue record with neither name nor handle");
                return None;
            }
        },
    };

    let countdown_raw = record.countdown.unwrap_or_default();
    let parsed = Countdown::parse(&countdown_raw);
    let time_parsed = record
        .time
        .as_deref()
        .filter(|raw| !raw.is_empty())
        .map(Countdown::parse);

    let original_countdown_ms = parsed.total_ms;
    let original_time_ms = time_parsed.as_ref().map(|time| time.total_ms);

    let countdown = if parsed.total_ms < 0 {
        match time_parsed {
            Some(time) if time.total_ms >= 0 => Countdown {
                raw: parsed.raw.clone(),
                ..time
            },
            _ => {
                warn!(
                    "Cue {} has negative countdown ({} ms) but no valid time field, clamping to 0",
                    key, parsed.total_ms
                );
                Countdown {
                    raw: parsed.raw.clone(),
                    ..Countdown::zero()
                }
            }
        }
    } else {
        parsed
    };

    let cue = Cue {
        name: key.clone(),
        operation: record.operation.unwrap_or_default(),
        note: record.note.unwrap_or_default(),
        countdown,
        original_countdown_ms,
        original_time_ms,
    };
    Some((key, cue))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(countdown: &str, time: Option<&str>) -> CueRecord {
        CueRecord {
            name: Some("Intro".to_string()),
            handle: None,
            operation: Some("Play".to_string()),
            note: Some("first".to_string()),
            countdown: Some(countdown.to_string()),
            time: time.map(str::to_string),
        }
    }

    #[test]
    fn positive_countdown_is_kept_as_is() {
        let (key, cue) = build_cue(record("00:00:10:00", Some("00:01:00:00"))).unwrap();
        assert_eq!(key, "Intro");
        assert_eq!(cue.countdown.total_ms, 10_000);
        assert_eq!(cue.original_countdown_ms, 10_000);
        assert_eq!(cue.original_time_ms, Some(60_000));
    }

    #[test]
    fn negative_countdown_substitutes_time_and_keeps_raw() {
        let (_, cue) = build_cue(record("-00:00:05:00", Some("00:01:00:00"))).unwrap();
        assert_eq!(cue.countdown.total_ms, 60_000);
        assert_eq!(cue.countdown.raw, "-00:00:05:00");
        // Pre-substitution values stay available for filtering.
        assert_eq!(cue.original_countdown_ms, -5_000);
        assert_eq!(cue.original_time_ms, Some(60_000));
    }

    #[test]
    fn negative_countdown_without_time_clamps_to_zero() {
        let (_, cue) = build_cue(record("-00:00:05:00", None)).unwrap();
        assert_eq!(cue.countdown.total_ms, 0);
        assert_eq!(cue.countdown.hours, 0);
        assert_eq!(cue.countdown.frames, 0);
        assert_eq!(cue.original_countdown_ms, -5_000);
        assert_eq!(cue.original_time_ms, None);
    }

    #[test]
    fn negative_countdown_with_negative_time_clamps_to_zero() {
        let (_, cue) = build_cue(record("-00:00:05:00", Some("-00:00:01:00"))).unwrap();
        assert_eq!(cue.countdown.total_ms, 0);
        assert_eq!(cue.original_time_ms, Some(-1_000));
    }

    #[test]
    fn empty_name_falls_back_to_handle() {
        let mut rec = record("00:00:01:00", None);
        rec.name = Some(String::new());
        rec.handle = Some(serde_json::json!(42));
        let (key, _) = build_cue(rec).unwrap();
        assert_eq!(key, "42");
    }

    #[test]
    fn record_without_identity_is_skipped() {
        let mut rec = record("00:00:01:00", None);
        rec.name = None;
        rec.handle = None;
        assert!(build_cue(rec).is_none());
    }

    #[test]
    fn cue_listing_decodes_from_json_string_or_array() {
        let native = serde_json::json!([{ "name": "A", "countdown": "00:00:01:00" }]);
        assert_eq!(decode_cue_records(1, &native).len(), 1);

        let encoded = serde_json::json!("[{\"name\":\"A\"},{\"name\":\"B\"}]");
        assert_eq!(decode_cue_records(1, &encoded).len(), 2);

        let garbage = serde_json::json!("not json");
        assert!(decode_cue_records(1, &garbage).is_empty());
    }

    #[test]
    fn timeline_info_falls_back_to_handle_name() {
        let info = decode_timeline_info(5, None);
        assert_eq!(info.name, "Timeline_5");
        assert_eq!(info.mode, "unknown");

        let encoded = serde_json::json!("{\"name\":\"Main\",\"Mode\":\"play\"}");
        let info = decode_timeline_info(5, Some(&encoded));
        assert_eq!(info.name, "Main");
        assert_eq!(info.mode, "play");
    }
}
