//! WebRTC session orchestration
//!
//! This module drives peer connections that live behind a polled native layer:
//! - Event log decoding of native observer callbacks
//! - SDP observer bookkeeping
//! - Peer connection sessions and their registry
//! - Offer/answer and ICE signaling over a text transport

pub mod event_log;
pub mod types;
pub mod sdp_observer;
pub mod peer_connection;
pub mod registry;
pub mod signaling;
pub mod orchestrator;

pub use event_log::{DecodeStats, EventLog, EventLogEntry, NativeEvent};
pub use orchestrator::{OrchestratorConfig, SignalingOrchestrator, StateSnapshot};
pub use peer_connection::{PeerConnectionSession, SessionEvent};
pub use registry::{PeerConnectionRegistry, SessionId};
pub use sdp_observer::{ObserverId, ObserverState, SdpObserver, SdpOutcome};
pub use signaling::{InboundMessage, OutboundMessage, SignalingEnvelope};
pub use types::{
    IceCandidate, IceConnectionState, IceGatheringState, MediaConstraints, PeerConnectionState,
    RemoteIceCandidate, SdpType, SessionDescription, SignalingState,
};

use std::error::Error;
use std::fmt;

/// WebRTC-related errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtcError {
    /// Native manager or handle is not available
    Unavailable(String),
    /// Operation attempted through a disposed session or observer
    Disposed(String),
    /// SDP processing failed
    Sdp(String),
    /// ICE candidate processing failed
    Ice(String),
    /// Malformed signaling or native payload
    Signaling(String),
    /// Signaling transport failure
    Transport(String),
    /// Invalid configuration
    Config(String),
}

impl fmt::Display for RtcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RtcError::Unavailable(msg) => write!(f, "Unavailable: {}", msg),
            RtcError::Disposed(msg) => write!(f, "Disposed: {}", msg),
            RtcError::Sdp(msg) => write!(f, "SDP error: {}", msg),
            RtcError::Ice(msg) => write!(f, "ICE error: {}", msg),
            RtcError::Signaling(msg) => write!(f, "Signaling error: {}", msg),
            RtcError::Transport(msg) => write!(f, "Transport error: {}", msg),
            RtcError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl Error for RtcError {}
