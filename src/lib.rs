//! projection-rtc - WebRTC signaling for screen projection
//!
//! Drives peer connections of a polling native layer: event logs are decoded
//! on every tick, SDP outcomes come back as events, and signaling frames go
//! out over a WebSocket.

pub mod capture;
pub mod config;
pub mod native;
pub mod transport;
pub mod webrtc;

// Re-exports
pub use config::Config;
pub use native::{NativeConnection, NativeManager};
pub use transport::run_signaling_client;
pub use webrtc::{PeerConnectionRegistry, RtcError, SessionEvent, SignalingOrchestrator};
