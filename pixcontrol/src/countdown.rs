//! Countdown string parsing.
//!
//! Pixera reports cue countdowns as `HH:MM:SS:FF` strings, optionally
//! prefixed with `-` when the cue has already passed. Parsing never
//! fails: anything that does not look like a countdown collapses to the
//! zero value, which downstream code treats as "no countdown".

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Frame rate used to convert the frame component into milliseconds.
pub const FRAMES_PER_SECOND: i64 = 60;

/// A structured duration parsed from a `HH:MM:SS:FF` string.
///
/// When the source string carries a leading `-`, `total_ms` and `hours`
/// are negated while `minutes`, `seconds` and `frames` keep the parsed
/// magnitudes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Countdown {
    pub raw: String,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
    pub frames: i64,
    #[serde(rename = "totalMs")]
    pub total_ms: i64,
}

impl Countdown {
    /// The all-zero countdown, with an empty `raw` string.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Parse a countdown string into its components.
    ///
    /// Returns the zero value when the string has no `:` separator or
    /// does not split into exactly four integer components. This is a
    /// recoverable condition, logged at debug level.
    pub fn parse(raw: &str) -> Self {
        if !raw.contains(':') {
            return Self::zero();
        }

        let trimmed = raw.trim();
        let negative = trimmed.starts_with('-');
        let digits = trimmed.trim_start_matches('-');

        let parts: Vec<&str> = digits.split(':').collect();
        if parts.len() != 4 {
            debug!("Countdown string `{}` does not have 4 components", raw);
            return Self::zero();
        }

        let mut components = [0i64; 4];
        for (slot, part) in components.iter_mut().zip(&parts) {
            match part.trim().parse::<i64>() {
                Ok(value) => *slot = value,
                Err(err) => {
                    debug!("Invalid countdown component `{}` in `{}`: {}", part, raw, err);
                    return Self::zero();
                }
            }
        }
        let [hours, minutes, seconds, frames] = components;

        let Some(total_ms) = total_milliseconds(hours, minutes, seconds, frames) else {
            debug!("Countdown `{}` overflows the millisecond total", raw);
            return Self::zero();
        };

        let (total_ms, hours) = if negative {
            match total_ms.checked_neg() {
                Some(negated) => (negated, -hours),
                None => {
                    debug!("Countdown `{}` overflows the millisecond total", raw);
                    return Self::zero();
                }
            }
        } else {
            (total_ms, hours)
        };

        Self {
            raw: raw.to_string(),
            hours,
            minutes,
            seconds,
            frames,
            total_ms,
        }
    }
}

/// Checked conversion of the four components into milliseconds.
///
/// Returns `None` when any intermediate product or sum leaves the `i64`
/// range. Hours that survive the multiplication are small enough that
/// negating them later cannot overflow.
fn total_milliseconds(hours: i64, minutes: i64, seconds: i64, frames: i64) -> Option<i64> {
    let frame_ms = frames.checked_mul(1_000)? / FRAMES_PER_SECOND;
    hours
        .checked_mul(3_600_000)?
        .checked_add(minutes.checked_mul(60_000)?)?
        .checked_add(seconds.checked_mul(1_000)?)?
        .checked_add(frame_ms)
}
