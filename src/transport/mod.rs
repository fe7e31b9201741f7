//! Transport layer
//!
//! Carries signaling frames between the orchestrator and the remote peer.

pub mod websocket;

pub use websocket::{run_signaling_client, Shutdown};
