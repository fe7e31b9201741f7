//! In-process stand-in for the native peer-connection layer.
//!
//! Records every call, lets callers append event-log entries to any observer
//! and, when auto-responding, answers SDP operations the way a cooperative
//! native stack would. Used by the tests and by the binary when no platform
//! layer is present.

use super::{Handle, NativeConnection, NativeEventSource, NativeManager, NativePeerConnection};
use crate::webrtc::event_log::{EventLog, EventLogEntry};
use crate::webrtc::types::SdpType;
use crate::webrtc::RtcError;
use log::debug;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A call that reached the simulated native layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeCall {
    CreatePeerConnection { ice_servers: String, video: bool, audio: bool },
    RemovePeerConnection(Handle),
    CreateOffer { observer: Handle, constraints: String },
    CreateAnswer { observer: Handle, constraints: String },
    SetLocalDescription { observer: Handle },
    SetLocalDescriptionWith { observer: Handle, kind: SdpType, sdp: String },
    SetRemoteDescription { observer: Handle, kind: SdpType, sdp: String },
    GetRemoteDescription { observer: Handle },
    AddIceCandidate { sdp_mid: String, sdp_mline_index: i32, sdp: String },
    RestartIce,
    SetAudioPlayout(bool),
    SetAudioRecording(bool),
    SetBitrate { min: i32, current: i32, max: i32 },
}

/// Which native state getter to override
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Connection,
    IceConnection,
    IceGathering,
    Signaling,
}

struct SimConnection {
    observer: Handle,
    video_track_added: bool,
    connection_state: String,
    ice_connection_state: String,
    ice_gathering_state: String,
    signaling_state: String,
    last_created: Option<(SdpType, String)>,
    local_description: String,
    remote_description: Option<(SdpType, String)>,
    candidates: HashSet<String>,
    ice_restart: bool,
}

impl SimConnection {
    fn new(observer: Handle, video_track_added: bool) -> Self {
        Self {
            observer,
            video_track_added,
            connection_state: "NEW".to_string(),
            ice_connection_state: "NEW".to_string(),
            ice_gathering_state: "NEW".to_string(),
            signaling_state: "STABLE".to_string(),
            last_created: None,
            local_description: String::new(),
            remote_description: None,
            candidates: HashSet::new(),
            ice_restart: false,
        }
    }
}

#[derive(Default)]
struct SimState {
    next_handle: Handle,
    auto_respond: bool,
    refuse_connections: bool,
    logs: HashMap<Handle, Vec<EventLogEntry>>,
    connections: HashMap<Handle, SimConnection>,
    calls: Vec<NativeCall>,
    released: Vec<Handle>,
    close_counts: HashMap<Handle, usize>,
}

impl SimState {
    fn allocate(&mut self) -> Handle {
        self.next_handle += 1;
        self.logs.insert(self.next_handle, Vec::new());
        self.next_handle
    }

    fn push(&mut self, handle: Handle, key: &str, value: impl Into<String>) {
        if let Some(log) = self.logs.get_mut(&handle) {
            log.push(EventLogEntry::new(key, value));
        }
    }

    fn release(&mut self, handle: Handle) {
        let count = self.close_counts.entry(handle).or_insert(0);
        *count += 1;
        if *count == 1 {
            self.released.push(handle);
        }
        self.logs.remove(&handle);
    }

    fn set_signaling(&mut self, connection: Handle, state: &str) {
        let Some(conn) = self.connections.get_mut(&connection) else {
            return;
        };
        if conn.signaling_state == state {
            return;
        }
        conn.signaling_state = state.to_string();
        let observer = conn.observer;
        self.push(observer, "onSignalingChange", state);
    }

    fn create_description(&mut self, connection: Handle, observer: Handle, kind: SdpType) {
        let Some(conn) = self.connections.get_mut(&connection) else {
            return;
        };
        let restart = std::mem::take(&mut conn.ice_restart);
        let sdp = synthetic_sdp(connection, kind, restart);
        conn.last_created = Some((kind, sdp.clone()));
        let payload = json!({ "type": kind.native_name(), "description": sdp });
        self.push(observer, "onCreateSuccess", payload.to_string());
    }

    fn commit_local(&mut self, connection: Handle, observer: Handle, description: Option<(SdpType, String)>) {
        let Some(conn) = self.connections.get_mut(&connection) else {
            return;
        };
        let Some((kind, sdp)) = description.or_else(|| conn.last_created.clone()) else {
            self.push(observer, "onSetFailure", "No local description to set");
            return;
        };
        conn.local_description = sdp;
        let conn_observer = conn.observer;
        self.push(observer, "onSetSuccess", "");

        let signaling = match kind {
            SdpType::Offer => "HAVE_LOCAL_OFFER",
            _ => "STABLE",
        };
        self.set_signaling(connection, signaling);
        self.gather_candidates(connection, conn_observer);
    }

    fn gather_candidates(&mut self, connection: Handle, conn_observer: Handle) {
        if let Some(conn) = self.connections.get_mut(&connection) {
            conn.ice_gathering_state = "COMPLETE".to_string();
        }
        let candidate = json!({
            "adapterType": "ADAPTER_TYPE_LOOPBACK",
            "sdp": format!("candidate:{} 1 udp 2122260223 127.0.0.1 {} typ host", connection, 50000 + connection),
            "sdpMid": "0",
            "sdpMLineIndex": 0,
            "serverUrl": "",
        });
        self.push(conn_observer, "onIceGatheringChange", "GATHERING");
        self.push(conn_observer, "onIceCandidate", candidate.to_string());
        self.push(conn_observer, "onIceGatheringChange", "COMPLETE");
    }
}

fn synthetic_sdp(connection: Handle, kind: SdpType, ice_restart: bool) -> String {
    let ufrag = if ice_restart { "r" } else { "a" };
    format!(
        "v=0\r\no=- {} 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\na=group:BUNDLE 0\r\na=ice-ufrag:{}{}\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\na=mid:0\r\na={}\r\n",
        connection,
        ufrag,
        connection,
        if kind == SdpType::Offer { "sendrecv" } else { "recvonly" },
    )
}

/// Simulated native manager. Clones share the same state.
#[derive(Clone, Default)]
pub struct SimulatedManager {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedManager {
    /// A passive layer: SDP operations stay pending until events are pushed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every SDP operation successfully and gathers one host candidate
    /// per local description.
    pub fn auto_responding() -> Self {
        let sim = Self::default();
        sim.state.lock().auto_respond = true;
        sim
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.state.lock().refuse_connections = refuse;
    }

    /// A free-standing observer handle.
    pub fn new_event_source(&self) -> Box<dyn NativeEventSource> {
        let handle = self.state.lock().allocate();
        Box::new(SimEventSource {
            handle,
            state: self.state.clone(),
        })
    }

    /// Append an entry to the log of any observer.
    pub fn push_event(&self, observer: Handle, key: &str, value: &str) {
        self.state.lock().push(observer, key, value);
    }

    /// Append an entry to the connection observer of `connection`.
    pub fn push_connection_event(&self, connection: Handle, key: &str, value: &str) {
        let mut state = self.state.lock();
        if let Some(observer) = state.connections.get(&connection).map(|c| c.observer) {
            state.push(observer, key, value);
        }
    }

    pub fn set_video_track_added(&self, connection: Handle, added: bool) {
        if let Some(conn) = self.state.lock().connections.get_mut(&connection) {
            conn.video_track_added = added;
        }
    }

    pub fn set_native_state(&self, connection: Handle, kind: StateKind, value: &str) {
        if let Some(conn) = self.state.lock().connections.get_mut(&connection) {
            let slot = match kind {
                StateKind::Connection => &mut conn.connection_state,
                StateKind::IceConnection => &mut conn.ice_connection_state,
                StateKind::IceGathering => &mut conn.ice_gathering_state,
                StateKind::Signaling => &mut conn.signaling_state,
            };
            *slot = value.to_string();
        }
    }

    pub fn calls(&self) -> Vec<NativeCall> {
        self.state.lock().calls.clone()
    }

    /// Live connection handles, in creation order.
    pub fn connections(&self) -> Vec<Handle> {
        let state = self.state.lock();
        let mut handles: Vec<Handle> = state.connections.keys().copied().collect();
        handles.sort_unstable();
        handles
    }

    pub fn connection_observer(&self, connection: Handle) -> Option<Handle> {
        self.state.lock().connections.get(&connection).map(|c| c.observer)
    }

    /// Handles released so far, in release order, each listed once.
    pub fn released(&self) -> Vec<Handle> {
        self.state.lock().released.clone()
    }

    pub fn is_closed(&self, handle: Handle) -> bool {
        self.close_count(handle) > 0
    }

    pub fn close_count(&self, handle: Handle) -> usize {
        self.state.lock().close_counts.get(&handle).copied().unwrap_or(0)
    }
}

impl NativeManager for SimulatedManager {
    fn create_peer_connection(
        &self,
        ice_servers: &str,
        video: bool,
        audio: bool,
    ) -> Result<NativeConnection, RtcError> {
        let mut state = self.state.lock();
        if state.refuse_connections {
            return Err(RtcError::Unavailable("Simulated manager refused the connection".to_string()));
        }
        state.calls.push(NativeCall::CreatePeerConnection {
            ice_servers: ice_servers.to_string(),
            video,
            audio,
        });

        let connection = state.allocate();
        let observer = state.allocate();
        state.logs.remove(&connection);
        state.connections.insert(connection, SimConnection::new(observer, false));

        if state.auto_respond && (video || audio) {
            if let Some(conn) = state.connections.get_mut(&connection) {
                conn.video_track_added = video;
            }
            state.push(observer, "onRenegotiationNeeded", "");
        }
        debug!("Simulated peer connection {} created (observer {})", connection, observer);

        Ok(NativeConnection {
            connection: Box::new(SimPeerConnection {
                handle: connection,
                state: self.state.clone(),
            }),
            observer: Box::new(SimEventSource {
                handle: observer,
                state: self.state.clone(),
            }),
        })
    }

    fn remove_peer_connection(&self, connection: Handle) {
        let mut state = self.state.lock();
        state.calls.push(NativeCall::RemovePeerConnection(connection));
        if let Some(conn) = state.connections.get_mut(&connection) {
            conn.connection_state = "CLOSED".to_string();
        }
    }
}

struct SimEventSource {
    handle: Handle,
    state: Arc<Mutex<SimState>>,
}

impl NativeEventSource for SimEventSource {
    fn handle(&self) -> Handle {
        self.handle
    }

    fn event_log_json(&mut self) -> String {
        let mut state = self.state.lock();
        match state.logs.get_mut(&self.handle) {
            Some(entries) => EventLog {
                data_list: std::mem::take(entries),
            }
            .to_json(),
            None => String::new(),
        }
    }

    fn close(&mut self) {
        self.state.lock().release(self.handle);
    }
}

struct SimPeerConnection {
    handle: Handle,
    state: Arc<Mutex<SimState>>,
}

impl SimPeerConnection {
    fn read(&self, f: impl FnOnce(&SimConnection) -> String) -> String {
        self.state
            .lock()
            .connections
            .get(&self.handle)
            .map(f)
            .unwrap_or_default()
    }
}

impl NativePeerConnection for SimPeerConnection {
    fn handle(&self) -> Handle {
        self.handle
    }

    fn create_sdp_observer(&mut self) -> Box<dyn NativeEventSource> {
        let handle = self.state.lock().allocate();
        Box::new(SimEventSource {
            handle,
            state: self.state.clone(),
        })
    }

    fn create_offer(&mut self, observer: Handle, constraints_json: &str) {
        let mut state = self.state.lock();
        state.calls.push(NativeCall::CreateOffer {
            observer,
            constraints: constraints_json.to_string(),
        });
        if state.auto_respond {
            state.create_description(self.handle, observer, SdpType::Offer);
        }
    }

    fn create_answer(&mut self, observer: Handle, constraints_json: &str) {
        let mut state = self.state.lock();
        state.calls.push(NativeCall::CreateAnswer {
            observer,
            constraints: constraints_json.to_string(),
        });
        if state.auto_respond {
            state.create_description(self.handle, observer, SdpType::Answer);
        }
    }

    fn set_local_description(&mut self, observer: Handle) {
        let mut state = self.state.lock();
        state.calls.push(NativeCall::SetLocalDescription { observer });
        if state.auto_respond {
            state.commit_local(self.handle, observer, None);
        }
    }

    fn set_local_description_with(&mut self, observer: Handle, kind: SdpType, sdp: &str) {
        let mut state = self.state.lock();
        state.calls.push(NativeCall::SetLocalDescriptionWith {
            observer,
            kind,
            sdp: sdp.to_string(),
        });
        if state.auto_respond {
            state.commit_local(self.handle, observer, Some((kind, sdp.to_string())));
        }
    }

    fn set_remote_description(&mut self, observer: Handle, kind: SdpType, sdp: &str) {
        let mut state = self.state.lock();
        state.calls.push(NativeCall::SetRemoteDescription {
            observer,
            kind,
            sdp: sdp.to_string(),
        });
        if !state.auto_respond {
            return;
        }
        if let Some(conn) = state.connections.get_mut(&self.handle) {
            conn.remote_description = Some((kind, sdp.to_string()));
        }
        state.push(observer, "onSetSuccess", "");
        let signaling = match kind {
            SdpType::Offer => "HAVE_REMOTE_OFFER",
            _ => "STABLE",
        };
        state.set_signaling(self.handle, signaling);
        if kind == SdpType::Answer {
            if let Some(conn) = state.connections.get_mut(&self.handle) {
                conn.ice_connection_state = "CONNECTED".to_string();
                conn.connection_state = "CONNECTED".to_string();
                let conn_observer = conn.observer;
                state.push(conn_observer, "onIceConnectionChange", "CONNECTED");
                state.push(conn_observer, "onConnectionChange", "CONNECTED");
            }
        }
    }

    fn get_remote_description(&mut self, observer: Handle) {
        let mut state = self.state.lock();
        state.calls.push(NativeCall::GetRemoteDescription { observer });
        if !state.auto_respond {
            return;
        }
        let remote = state
            .connections
            .get(&self.handle)
            .and_then(|c| c.remote_description.clone());
        match remote {
            Some((kind, sdp)) => {
                let payload = json!({ "type": kind.native_name(), "description": sdp });
                state.push(observer, "onCreateSuccess", payload.to_string());
            }
            None => state.push(observer, "onCreateFailure", "No remote description"),
        }
    }

    fn local_description(&self) -> String {
        self.read(|c| c.local_description.clone())
    }

    fn add_ice_candidate(&mut self, sdp_mid: &str, sdp_mline_index: i32, sdp: &str) -> bool {
        let mut state = self.state.lock();
        state.calls.push(NativeCall::AddIceCandidate {
            sdp_mid: sdp_mid.to_string(),
            sdp_mline_index,
            sdp: sdp.to_string(),
        });
        if sdp.trim().is_empty() {
            return false;
        }
        match state.connections.get_mut(&self.handle) {
            Some(conn) => conn
                .candidates
                .insert(format!("{}|{}|{}", sdp_mid, sdp_mline_index, sdp)),
            None => false,
        }
    }

    fn restart_ice(&mut self) {
        let mut state = self.state.lock();
        state.calls.push(NativeCall::RestartIce);
        if let Some(conn) = state.connections.get_mut(&self.handle) {
            conn.ice_restart = true;
            let observer = conn.observer;
            if state.auto_respond {
                state.push(observer, "onRenegotiationNeeded", "");
            }
        }
    }

    fn connection_state(&self) -> String {
        self.read(|c| c.connection_state.clone())
    }

    fn ice_connection_state(&self) -> String {
        self.read(|c| c.ice_connection_state.clone())
    }

    fn ice_gathering_state(&self) -> String {
        self.read(|c| c.ice_gathering_state.clone())
    }

    fn signaling_state(&self) -> String {
        self.read(|c| c.signaling_state.clone())
    }

    fn set_audio_playout(&mut self, enable: bool) {
        self.state.lock().calls.push(NativeCall::SetAudioPlayout(enable));
    }

    fn set_audio_recording(&mut self, enable: bool) {
        self.state.lock().calls.push(NativeCall::SetAudioRecording(enable));
    }

    fn set_bitrate(&mut self, min: i32, current: i32, max: i32) {
        self.state
            .lock()
            .calls
            .push(NativeCall::SetBitrate { min, current, max });
    }

    fn is_video_track_added(&self) -> bool {
        self.state
            .lock()
            .connections
            .get(&self.handle)
            .map(|c| c.video_track_added)
            .unwrap_or(false)
    }

    fn dispose(&mut self) {
        let mut state = self.state.lock();
        state.connections.remove(&self.handle);
        state.release(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_responder_answers_offer() {
        let sim = SimulatedManager::auto_responding();
        let mut native = sim.create_peer_connection("stun:a", true, false).unwrap();
        let mut observer = native.connection.create_sdp_observer();

        native.connection.create_offer(observer.handle(), "{}");
        let log = EventLog::from_json(&observer.event_log_json()).unwrap();
        assert_eq!(log.data_list[0].key, "onCreateSuccess");
        assert!(native.connection.is_video_track_added());

        let pending = EventLog::from_json(&native.observer.event_log_json()).unwrap();
        assert_eq!(pending.data_list[0].key, "onRenegotiationNeeded");
    }

    #[test]
    fn test_closed_source_returns_nothing() {
        let sim = SimulatedManager::new();
        let mut source = sim.new_event_source();
        let handle = source.handle();
        sim.push_event(handle, "onSetSuccess", "");
        source.close();
        assert_eq!(source.event_log_json(), "");
        assert_eq!(sim.released(), vec![handle]);
    }

    #[test]
    fn test_refused_connection() {
        let sim = SimulatedManager::new();
        sim.refuse_connections(true);
        assert!(sim.create_peer_connection("", true, true).is_err());
        assert!(sim.calls().is_empty());
    }
}
