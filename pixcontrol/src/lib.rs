//! Polling and broadcast core of the Pixera countdown bridge.
//!
//! Continuously mirrors a Pixera show-control engine's timeline and cue
//! state into an in-process [`Snapshot`](model::Snapshot) and fans
//! incremental views of it out to connected viewers:
//!
//! - [`countdown`]: pure `HH:MM:SS:FF` countdown parsing
//! - [`rpc`]: one-shot JSON-RPC client over TCP
//! - [`store`]: lock-guarded snapshot owner
//! - [`fetch`]: fetchers populating the store from engine calls
//! - [`poller`]: the two-cadence polling loop with its
//!   enable/disable/auto-disable state machine
//! - [`hub`]: best-effort broadcast to viewer channels
//!
//! The engine being slow, unreachable or malformed never crashes the
//! core: every failure degrades to "no new data this cycle" and viewers
//! keep seeing the last known snapshot.

pub mod countdown;
pub mod error;
pub mod fetch;
pub mod hub;
pub mod model;
pub mod poller;
pub mod rpc;
pub mod store;

pub use countdown::Countdown;
pub use error::EngineError;
pub use fetch::EngineMirror;
pub use hub::BroadcastHub;
pub use model::{PollingState, PollingStatePayload, Snapshot, SnapshotPayload};
pub use poller::{Poller, PollerSettings};
pub use rpc::EngineClient;
pub use store::SnapshotStore;
