use std::time::Duration;

use thiserror::Error;

/// Failures of a single engine round trip.
///
/// None of these are fatal: [`EngineClient::call`](crate::rpc::EngineClient::call)
/// degrades every variant to an empty reply so a bad cycle only means
/// "no new data".
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("engine call timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    #[error("engine closed the connection before the terminator")]
    Truncated,
    #[error("invalid JSON in engine reply: {0}")]
    Decode(#[from] serde_json::Error),
}
