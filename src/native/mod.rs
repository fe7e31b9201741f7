//! Native peer-connection layer
//!
//! The real implementation lives on the platform side (Android WebRTC behind
//! a JNI bridge). Everything here talks to it through these traits; calls are
//! fire-and-forget and results come back through event logs that are drained
//! by polling.

pub mod sim;

use crate::webrtc::types::SdpType;
use crate::webrtc::RtcError;

/// Identity of a native object
pub type Handle = u64;

/// A native observer that buffers callbacks until drained.
pub trait NativeEventSource: Send {
    fn handle(&self) -> Handle;

    /// Drain the log: `{"dataList": [{"key": .., "value": ..}, ..]}`.
    /// An empty string means nothing was logged.
    fn event_log_json(&mut self) -> String;

    /// Release the native object. Later drains return nothing.
    fn close(&mut self);
}

/// A native peer connection.
///
/// SDP calls take the handle of the observer that will receive the outcome.
/// State getters return the native spelling (`HAVE_LOCAL_OFFER`).
pub trait NativePeerConnection: Send {
    fn handle(&self) -> Handle;

    /// New SDP observer bound to the same native runtime.
    fn create_sdp_observer(&mut self) -> Box<dyn NativeEventSource>;

    fn create_offer(&mut self, observer: Handle, constraints_json: &str);
    fn create_answer(&mut self, observer: Handle, constraints_json: &str);

    /// Commit the most recently created description.
    fn set_local_description(&mut self, observer: Handle);
    fn set_local_description_with(&mut self, observer: Handle, kind: SdpType, sdp: &str);
    fn set_remote_description(&mut self, observer: Handle, kind: SdpType, sdp: &str);

    /// The remote description is delivered as a create-success outcome.
    fn get_remote_description(&mut self, observer: Handle);
    fn local_description(&self) -> String;

    /// Returns whether the candidate was accepted.
    fn add_ice_candidate(&mut self, sdp_mid: &str, sdp_mline_index: i32, sdp: &str) -> bool;
    fn restart_ice(&mut self);

    fn connection_state(&self) -> String;
    fn ice_connection_state(&self) -> String;
    fn ice_gathering_state(&self) -> String;
    fn signaling_state(&self) -> String;

    fn set_audio_playout(&mut self, enable: bool);
    fn set_audio_recording(&mut self, enable: bool);
    fn set_bitrate(&mut self, min: i32, current: i32, max: i32);

    /// Polled flag; there is no logged event for it.
    fn is_video_track_added(&self) -> bool;

    fn dispose(&mut self);
}

/// Native objects making up one new peer connection
pub struct NativeConnection {
    pub connection: Box<dyn NativePeerConnection>,
    pub observer: Box<dyn NativeEventSource>,
}

/// The platform object that owns capture and creates peer connections
pub trait NativeManager: Send + Sync {
    /// `ice_servers` is a single space-separated list of URLs.
    fn create_peer_connection(
        &self,
        ice_servers: &str,
        video: bool,
        audio: bool,
    ) -> Result<NativeConnection, RtcError>;

    fn remove_peer_connection(&self, connection: Handle);
}
