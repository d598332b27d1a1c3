//! Reusable mocks for exercising the broker without real peers or a real ledger.
//!
//! - [`ScriptedTransport`]: per-peer scripted replies, delays and hangs
//! - [`MockEntrypoint`]: websocket server the broker's stream ingress dials into
//! - [`FixtureBuilder`]: broker, tracker, directory, in-memory ledger and committer wired
//!   together the way the runtime wires them

pub mod entrypoint_mock;
pub mod scripted_transport;
pub mod test_helpers;

pub use entrypoint_mock::MockEntrypoint;
pub use scripted_transport::{PeerScript, ScriptedTransport};
pub use test_helpers::*;
