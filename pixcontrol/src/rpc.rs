//! JSON-RPC client for the Pixera engine.
//!
//! Pixera speaks JSON-RPC 2.0 over raw TCP. Each message is a JSON
//! object followed by the fixed terminator `0xPX`; the reply is read
//! until the same terminator appears in the byte stream. One connection
//! is opened per call and dropped afterwards, so a hung engine stalls
//! only the request in flight, never future polling.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{Map, Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::EngineError;

/// Terminator token framing every request and reply.
pub const MSG_TERMINATOR: &str = "0xPX";

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(3);
const READ_CHUNK: usize = 4096;

/// Engine method names used by the bridge.
pub mod methods {
    pub const GET_TIMELINES: &str = "Pixera.Timelines.getTimelines";
    pub const GET_TIMELINE_INFO: &str = "Pixera.Timelines.Timeline.getTimelineInfosAsJsonString";
    pub const GET_CUE_INFO: &str = "Pixera.Timelines.Timeline.getCueInfosAsJsonString";
    pub const GET_PROJECT_NAME: &str = "Pixera.Session.getProjectName";
}

/// One-shot connection-per-call JSON-RPC client.
///
/// Cloning shares the request id counter, which increases monotonically
/// for the lifetime of the process.
#[derive(Clone, Debug)]
pub struct EngineClient {
    host: String,
    port: u16,
    call_timeout: Duration,
    next_id: Arc<AtomicU64>,
}

impl EngineClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::with_timeout(host, port, DEFAULT_CALL_TIMEOUT)
    }

    pub fn with_timeout(host: impl Into<String>, port: u16, call_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            call_timeout,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Perform one engine round trip.
    ///
    /// Timeout, transport and decode failures are logged and degrade to
    /// an empty map. Callers must treat an empty map as "no data
    /// available this cycle", never as a fatal condition.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Map<String, Value> {
        match self.try_call(method, params).await {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                warn!("Engine reply for {} is not an object: {}", method, other);
                Map::new()
            }
            Err(err) => {
                warn!("Engine call {} failed: {}", method, err);
                Map::new()
            }
        }
    }

    async fn try_call(&self, method: &str, params: Option<Value>) -> Result<Value, EngineError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
        });
        if let Some(params) = params {
            request["params"] = params;
        }

        let mut framed = request.to_string();
        framed.push_str(MSG_TERMINATOR);

        match timeout(self.call_timeout, self.exchange(framed.as_bytes())).await {
            Ok(result) => {
                let reply = result?;
                debug!("Engine call {} (id {}) -> {} bytes", method, id, reply.len());
                Ok(serde_json::from_str(&reply)?)
            }
            Err(_) => Err(EngineError::Timeout(self.call_timeout)),
        }
    }

    /// Open a fresh connection, write the framed request and read until
    /// the terminator. The connection is dropped regardless of outcome.
    async fn exchange(&self, framed: &[u8]) -> Result<String, EngineError> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        stream.write_all(framed).await?;

        let terminator = MSG_TERMINATOR.as_bytes();
        let mut buf: Vec<u8> = Vec::with_capacity(READ_CHUNK);
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(EngineError::Truncated);
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = find_subsequence(&buf, terminator) {
                buf.truncate(pos);
                break;
            }
        }

        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
