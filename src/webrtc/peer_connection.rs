//! Peer connection session
//!
//! Wraps one native peer connection, its connection observer and the SDP
//! observers still waiting for an outcome. Nothing here blocks: native calls
//! are issued immediately and their results are picked up by
//! [`PeerConnectionSession::poll_events`].

use super::event_log::{DecodeStats, EventLog, NativeEvent};
use super::sdp_observer::{ObserverId, SdpObserver, SdpOutcome};
use super::types::{
    IceCandidate, IceConnectionState, IceGatheringState, MediaConstraints, PeerConnectionState,
    SdpType, SignalingState,
};
use super::RtcError;
use crate::native::{Handle, NativeConnection, NativeEventSource, NativePeerConnection};
use log::{debug, error, info, warn};
use std::sync::Arc;

/// Notification produced by a poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    VideoTrackAdded,
    SignalingChange(SignalingState),
    ConnectionChange(PeerConnectionState),
    IceConnectionChange(IceConnectionState),
    IceConnectionReceivingChange(bool),
    IceGatheringChange(IceGatheringState),
    IceCandidate(IceCandidate),
    RenegotiationNeeded,
    /// A pending SDP observer reached its outcome and was released
    Sdp {
        observer: ObserverId,
        outcome: SdpOutcome,
    },
}

pub struct PeerConnectionSession {
    id: String,
    connection: Option<Box<dyn NativePeerConnection>>,
    observer: Option<Box<dyn NativeEventSource>>,
    pending: Vec<SdpObserver>,
    video_track_added: bool,
    stats: Arc<DecodeStats>,
}

impl PeerConnectionSession {
    pub fn new(id: impl Into<String>, native: NativeConnection, stats: Arc<DecodeStats>) -> Self {
        Self {
            id: id.into(),
            connection: Some(native.connection),
            observer: Some(native.observer),
            pending: Vec::new(),
            video_track_added: false,
            stats,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn native_handle(&self) -> Option<Handle> {
        self.connection.as_ref().map(|c| c.handle())
    }

    pub fn is_disposed(&self) -> bool {
        self.connection.is_none()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn video_track_added(&self) -> bool {
        self.video_track_added
    }

    /// Create an observer for the next SDP operation on this session.
    pub fn new_observer(&mut self) -> Result<SdpObserver, RtcError> {
        let connection = self.live_connection()?;
        Ok(SdpObserver::new(connection.create_sdp_observer()))
    }

    // SDP

    pub fn create_offer(
        &mut self,
        observer: SdpObserver,
        constraints: &MediaConstraints,
    ) -> Result<ObserverId, RtcError> {
        let json = constraints.to_json();
        self.register(observer, |connection, id| connection.create_offer(id, &json))
    }

    pub fn create_answer(
        &mut self,
        observer: SdpObserver,
        constraints: &MediaConstraints,
    ) -> Result<ObserverId, RtcError> {
        let json = constraints.to_json();
        self.register(observer, |connection, id| connection.create_answer(id, &json))
    }

    /// Commit whatever description was created last.
    pub fn set_local_description(&mut self, observer: SdpObserver) -> Result<ObserverId, RtcError> {
        self.register(observer, |connection, id| connection.set_local_description(id))
    }

    pub fn set_local_description_with(
        &mut self,
        observer: SdpObserver,
        kind: SdpType,
        sdp: &str,
    ) -> Result<ObserverId, RtcError> {
        self.register(observer, |connection, id| {
            connection.set_local_description_with(id, kind, sdp)
        })
    }

    pub fn set_remote_description(
        &mut self,
        observer: SdpObserver,
        kind: SdpType,
        sdp: &str,
    ) -> Result<ObserverId, RtcError> {
        self.register(observer, |connection, id| {
            connection.set_remote_description(id, kind, sdp)
        })
    }

    /// The description arrives as a [`SdpOutcome::Created`] on the observer.
    pub fn get_remote_description(&mut self, observer: SdpObserver) -> Result<ObserverId, RtcError> {
        self.register(observer, |connection, id| connection.get_remote_description(id))
    }

    /// Release a pending observer before it finishes. Its outcome, if it ever
    /// arrives, is discarded.
    pub fn cancel(&mut self, observer: ObserverId) -> bool {
        match self.pending.iter().position(|o| o.id() == observer) {
            Some(index) => {
                let mut removed = self.pending.remove(index);
                removed.dispose();
                true
            }
            None => false,
        }
    }

    fn register(
        &mut self,
        observer: SdpObserver,
        call: impl FnOnce(&mut dyn NativePeerConnection, ObserverId),
    ) -> Result<ObserverId, RtcError> {
        if !observer.ensure_live() {
            return Err(RtcError::Disposed(format!("SdpObserver {}", observer.id())));
        }
        let id = observer.id();
        let connection = self.live_connection()?;
        call(connection.as_mut(), id);
        self.pending.push(observer);
        Ok(id)
    }

    // ICE

    /// Returns the native verdict; duplicates and invalid candidates are `false`.
    pub fn add_ice_candidate(&mut self, sdp_mid: &str, sdp_mline_index: i32, sdp: &str) -> bool {
        match self.live_connection() {
            Ok(connection) => connection.add_ice_candidate(sdp_mid, sdp_mline_index, sdp),
            Err(_) => false,
        }
    }

    pub fn restart_ice(&mut self) {
        if let Ok(connection) = self.live_connection() {
            connection.restart_ice();
        }
    }

    // State

    pub fn connection_state(&self) -> PeerConnectionState {
        self.read_state(|c| c.connection_state(), PeerConnectionState::from_native, PeerConnectionState::FALLBACK)
    }

    pub fn ice_connection_state(&self) -> IceConnectionState {
        self.read_state(|c| c.ice_connection_state(), IceConnectionState::from_native, IceConnectionState::FALLBACK)
    }

    pub fn ice_gathering_state(&self) -> IceGatheringState {
        self.read_state(|c| c.ice_gathering_state(), IceGatheringState::from_native, IceGatheringState::FALLBACK)
    }

    pub fn signaling_state(&self) -> SignalingState {
        self.read_state(|c| c.signaling_state(), SignalingState::from_native, SignalingState::FALLBACK)
    }

    /// Empty when the connection is gone.
    pub fn local_description(&self) -> String {
        self.read_state(|c| c.local_description(), |s| s.to_string(), String::new())
    }

    fn read_state<T>(
        &self,
        read: impl FnOnce(&dyn NativePeerConnection) -> String,
        parse: impl FnOnce(&str) -> T,
        fallback: T,
    ) -> T {
        match self.connection.as_deref() {
            Some(connection) => parse(&read(connection)),
            None => {
                error!("PeerConnection {} is unavailable", self.id);
                fallback
            }
        }
    }

    // Media configuration

    pub fn set_audio_playout(&mut self, enable: bool) {
        if let Ok(connection) = self.live_connection() {
            connection.set_audio_playout(enable);
        }
    }

    pub fn set_audio_recording(&mut self, enable: bool) {
        if let Ok(connection) = self.live_connection() {
            connection.set_audio_recording(enable);
        }
    }

    pub fn set_bitrate(&mut self, min: i32, current: i32, max: i32) {
        if let Ok(connection) = self.live_connection() {
            connection.set_bitrate(min, current, max);
        }
    }

    /// Collect everything the native side produced since the last poll.
    ///
    /// Order: the video track flag, then the connection observer's log in
    /// emission order, then the pending SDP observers in registration order.
    /// Observers that reached an outcome are released.
    pub fn poll_events(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        let Some(connection) = self.connection.as_deref() else {
            error!("PeerConnection {} is disposed, nothing to poll", self.id);
            return events;
        };

        if !self.video_track_added && connection.is_video_track_added() {
            self.video_track_added = true;
            info!("PeerConnection {}: video track added", self.id);
            events.push(SessionEvent::VideoTrackAdded);
        }

        match self.observer.as_mut() {
            Some(observer) => {
                let log = EventLog::parse_counted(&observer.event_log_json(), &self.stats);
                for event in log.decode(&self.stats) {
                    if let Some(notification) = self.translate(event) {
                        events.push(notification);
                    }
                }
            }
            None => error!("PeerConnectionObserver {} is unavailable", self.id),
        }

        let pending = std::mem::take(&mut self.pending);
        for mut observer in pending {
            match observer.poll(&self.stats) {
                Some(outcome) => {
                    events.push(SessionEvent::Sdp {
                        observer: observer.id(),
                        outcome,
                    });
                    observer.dispose();
                }
                None if observer.is_disposed() => {}
                None => self.pending.push(observer),
            }
        }

        events
    }

    fn translate(&self, event: NativeEvent) -> Option<SessionEvent> {
        let notification = match event {
            NativeEvent::SignalingChanged(state) => SessionEvent::SignalingChange(state),
            NativeEvent::ConnectionChanged(state) => SessionEvent::ConnectionChange(state),
            NativeEvent::IceConnectionChanged(state) => SessionEvent::IceConnectionChange(state),
            NativeEvent::IceConnectionReceivingChanged(receiving) => {
                SessionEvent::IceConnectionReceivingChange(receiving)
            }
            NativeEvent::IceGatheringChanged(state) => SessionEvent::IceGatheringChange(state),
            NativeEvent::IceCandidateDiscovered(candidate) => SessionEvent::IceCandidate(candidate),
            NativeEvent::RenegotiationNeeded => SessionEvent::RenegotiationNeeded,
            other if other.is_sdp_outcome() => {
                warn!("PeerConnection {}: SDP outcome on the connection observer {:?}", self.id, other);
                return None;
            }
            other => {
                debug!("PeerConnection {}: ignoring {:?}", self.id, other);
                return None;
            }
        };
        Some(notification)
    }

    /// Release pending observers, then the connection observer, then the
    /// connection. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if self.is_disposed() && self.observer.is_none() && self.pending.is_empty() {
            return;
        }
        info!("Disposing PeerConnection {}", self.id);

        for observer in self.pending.iter_mut() {
            observer.dispose();
        }
        self.pending.clear();

        if let Some(mut observer) = self.observer.take() {
            observer.close();
        }

        if let Some(mut connection) = self.connection.take() {
            connection.dispose();
        }

        info!("PeerConnection {} disposed", self.id);
    }

    fn live_connection(&mut self) -> Result<&mut Box<dyn NativePeerConnection>, RtcError> {
        match self.connection.as_mut() {
            Some(connection) => Ok(connection),
            None => {
                error!("PeerConnection {} is disposed", self.id);
                Err(RtcError::Disposed(format!("PeerConnection {}", self.id)))
            }
        }
    }
}

impl Drop for PeerConnectionSession {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::sim::{NativeCall, SimulatedManager, StateKind};
    use crate::native::NativeManager;

    fn session(sim: &SimulatedManager) -> PeerConnectionSession {
        let native = sim.create_peer_connection("stun:stun.example.org", true, true).unwrap();
        PeerConnectionSession::new("test", native, Arc::new(DecodeStats::new()))
    }

    #[test]
    fn test_create_offer_serializes_constraints() {
        let sim = SimulatedManager::new();
        let mut pc = session(&sim);
        let constraints: MediaConstraints =
            [("OfferToReceiveVideo", "false"), ("OfferToReceiveAudio", "true")].into_iter().collect();

        let obs = pc.new_observer().unwrap();
        let id = pc.create_offer(obs, &constraints).unwrap();

        assert_eq!(pc.pending_count(), 1);
        assert!(sim.calls().contains(&NativeCall::CreateOffer {
            observer: id,
            constraints: r#"{"OfferToReceiveVideo":"false","OfferToReceiveAudio":"true"}"#.to_string(),
        }));
    }

    #[test]
    fn test_video_track_fires_once_before_log_events() {
        let sim = SimulatedManager::new();
        let mut pc = session(&sim);
        let handle = pc.native_handle().unwrap();

        sim.set_video_track_added(handle, true);
        sim.push_connection_event(handle, "onRenegotiationNeeded", "");

        assert_eq!(
            pc.poll_events(),
            vec![SessionEvent::VideoTrackAdded, SessionEvent::RenegotiationNeeded]
        );
        assert!(pc.poll_events().is_empty());
    }

    #[test]
    fn test_sdp_outcome_on_connection_observer_is_ignored() {
        let sim = SimulatedManager::new();
        let mut pc = session(&sim);
        let handle = pc.native_handle().unwrap();

        sim.push_connection_event(handle, "onSetSuccess", "");
        sim.push_connection_event(handle, "onRenegotiationNeeded", "");
        assert_eq!(pc.poll_events(), vec![SessionEvent::RenegotiationNeeded]);
    }

    #[test]
    fn test_finished_observers_are_released() {
        let sim = SimulatedManager::new();
        let mut pc = session(&sim);

        let first = pc.new_observer().unwrap();
        let first = pc.set_remote_description(first, SdpType::Answer, "v=0").unwrap();
        let second = pc.new_observer().unwrap();
        let second = pc.set_local_description(second).unwrap();

        sim.push_event(second, "onSetFailure", "bad state");
        let events = pc.poll_events();
        assert_eq!(
            events,
            vec![SessionEvent::Sdp {
                observer: second,
                outcome: SdpOutcome::SetFailed("bad state".to_string()),
            }]
        );
        assert_eq!(pc.pending_count(), 1);
        assert!(sim.is_closed(second));

        sim.push_event(first, "onSetSuccess", "");
        sim.push_event(second, "onSetSuccess", "");
        let events = pc.poll_events();
        assert_eq!(events.len(), 1);
        assert_eq!(pc.pending_count(), 0);
    }

    #[test]
    fn test_cancelled_observer_outcome_is_suppressed() {
        let sim = SimulatedManager::new();
        let mut pc = session(&sim);

        let obs = pc.new_observer().unwrap();
        let id = pc.get_remote_description(obs).unwrap();
        assert!(pc.cancel(id));
        assert!(!pc.cancel(id));

        sim.push_event(id, "onCreateFailure", "none");
        assert!(pc.poll_events().is_empty());
    }

    #[test]
    fn test_disposed_observer_is_rejected() {
        let sim = SimulatedManager::new();
        let mut pc = session(&sim);

        let mut obs = pc.new_observer().unwrap();
        obs.dispose();
        let result = pc.create_answer(obs, &MediaConstraints::new());
        assert!(matches!(result, Err(RtcError::Disposed(_))));
        assert_eq!(pc.pending_count(), 0);
    }

    #[test]
    fn test_state_getters_fall_back() {
        let sim = SimulatedManager::new();
        let mut pc = session(&sim);
        let handle = pc.native_handle().unwrap();

        sim.set_native_state(handle, StateKind::Connection, "WHATEVER");
        sim.set_native_state(handle, StateKind::Signaling, "HAVE_REMOTE_OFFER");
        assert_eq!(pc.connection_state(), PeerConnectionState::Failed);
        assert_eq!(pc.signaling_state(), SignalingState::HaveRemoteOffer);

        pc.dispose();
        assert_eq!(pc.connection_state(), PeerConnectionState::Failed);
        assert_eq!(pc.ice_connection_state(), IceConnectionState::Failed);
        assert_eq!(pc.ice_gathering_state(), IceGatheringState::New);
        assert_eq!(pc.signaling_state(), SignalingState::Closed);
        assert_eq!(pc.local_description(), "");
    }

    #[test]
    fn test_duplicate_candidate_reports_native_verdict() {
        let sim = SimulatedManager::new();
        let mut pc = session(&sim);
        let sdp = "candidate:1 1 udp 2122260223 192.168.1.4 50000 typ host";

        assert!(pc.add_ice_candidate("0", 0, sdp));
        assert!(!pc.add_ice_candidate("0", 0, sdp));
    }

    #[test]
    fn test_operations_after_dispose_are_skipped() {
        let sim = SimulatedManager::new();
        let mut pc = session(&sim);
        let obs = pc.new_observer().unwrap();
        pc.dispose();

        assert!(pc.create_offer(obs, &MediaConstraints::new()).is_err());
        assert!(pc.new_observer().is_err());
        assert!(!pc.add_ice_candidate("0", 0, "candidate:1"));
        pc.restart_ice();
        pc.set_bitrate(100, 200, 300);
        assert!(pc.poll_events().is_empty());
        assert!(!sim.calls().iter().any(|c| matches!(c, NativeCall::RestartIce | NativeCall::SetBitrate { .. })));
    }

    #[test]
    fn test_dispose_releases_in_reverse_order() {
        let sim = SimulatedManager::new();
        let mut pc = session(&sim);
        let connection = pc.native_handle().unwrap();
        let obs = pc.new_observer().unwrap();
        let pending = pc.create_offer(obs, &MediaConstraints::new()).unwrap();

        pc.dispose();
        pc.dispose();

        let released = sim.released();
        let connection_observer = connection + 1;
        assert_eq!(released, vec![pending, connection_observer, connection]);
    }

    #[test]
    fn test_media_configuration_calls() {
        let sim = SimulatedManager::new();
        let mut pc = session(&sim);

        pc.set_audio_playout(false);
        pc.set_audio_recording(true);
        pc.set_bitrate(300, 1000, 2500);
        pc.restart_ice();

        let calls = sim.calls();
        assert!(calls.contains(&NativeCall::SetAudioPlayout(false)));
        assert!(calls.contains(&NativeCall::SetAudioRecording(true)));
        assert!(calls.contains(&NativeCall::SetBitrate { min: 300, current: 1000, max: 2500 }));
        assert!(calls.contains(&NativeCall::RestartIce));
    }
}
