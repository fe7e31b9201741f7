//! Signaling orchestration
//!
//! Drives offer/answer and ICE exchange for one peer connection:
//! 1. Transport opens → a session is created (video + audio)
//! 2. Renegotiation needed → create offer → set local → send `offer`
//! 3. Local candidate → send `candidate`
//! 4. Remote `answer` → set remote description
//! 5. Remote `offer` → set remote → create answer → set local → send `answer`
//! 6. Remote `candidate` → add ICE candidate
//!
//! The orchestrator never blocks. Outbound frames go to an unbounded channel
//! drained by the transport writer; SDP results come back through
//! [`PeerConnectionRegistry::tick`].

use super::peer_connection::{PeerConnectionSession, SessionEvent};
use super::registry::{PeerConnectionRegistry, SessionId};
use super::sdp_observer::{ObserverId, SdpOutcome};
use super::signaling::{InboundMessage, OutboundMessage};
use super::types::{
    IceConnectionState, IceGatheringState, MediaConstraints, PeerConnectionState, SdpType,
    SessionDescription, SignalingState,
};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub ice_servers: Vec<String>,
    pub constraints: MediaConstraints,
    pub video: bool,
    pub audio: bool,
    /// Interval of the state snapshot log line
    pub state_log_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        let mut constraints = MediaConstraints::new();
        constraints.insert("OfferToReceiveVideo", "false");
        Self {
            ice_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            constraints,
            video: true,
            audio: true,
            state_log_interval: Duration::from_secs(1),
        }
    }
}

/// SDP operation an observer was created for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingOp {
    CreateOffer,
    CreateAnswer,
    SetLocal(SdpType),
    SetRemote(SdpType),
}

impl fmt::Display for PendingOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingOp::CreateOffer => write!(f, "create offer"),
            PendingOp::CreateAnswer => write!(f, "create answer"),
            PendingOp::SetLocal(kind) => write!(f, "set local {}", kind),
            PendingOp::SetRemote(kind) => write!(f, "set remote {}", kind),
        }
    }
}

/// Point-in-time view of a session's states
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    pub connection: PeerConnectionState,
    pub ice_connection: IceConnectionState,
    pub ice_gathering: IceGatheringState,
    pub signaling: SignalingState,
    pub local_description: String,
}

impl fmt::Display for StateSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IceConnectionState: {}, IceGatheringState: {}, SignalingState: {}, ConnectionState: {}",
            self.ice_connection, self.ice_gathering, self.signaling, self.connection
        )
    }
}

pub struct SignalingOrchestrator {
    config: OrchestratorConfig,
    outbox: mpsc::UnboundedSender<String>,
    session: Option<SessionId>,
    operations: HashMap<ObserverId, PendingOp>,
    enabled: bool,
    last_state_log: Option<Instant>,
}

impl SignalingOrchestrator {
    pub fn new(config: OrchestratorConfig, outbox: mpsc::UnboundedSender<String>) -> Self {
        Self {
            config,
            outbox,
            session: None,
            operations: HashMap::new(),
            enabled: true,
            last_state_log: None,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Transport connected: create the peer connection.
    pub fn on_open(&mut self, registry: &mut PeerConnectionRegistry) {
        info!("Connected to signaling server");
        if !self.enabled {
            warn!("Orchestrator is disabled, not creating a peer connection");
            return;
        }
        if self.session.is_some() {
            debug!("Peer connection already exists");
            return;
        }

        match registry.create(&self.config.ice_servers, self.config.video, self.config.audio) {
            Some(session_id) => self.session = Some(session_id),
            None => {
                error!("Failed to create PeerConnection");
                self.enabled = false;
            }
        }
    }

    pub fn on_close(&mut self) {
        info!("Disconnected from signaling server");
    }

    /// Handle a text frame from the remote peer.
    pub fn on_message(&mut self, registry: &mut PeerConnectionRegistry, text: &str) {
        debug!("Received message: {}", text);
        if !self.enabled {
            return;
        }

        let message = match InboundMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Ignoring signaling message: {}", e);
                return;
            }
        };

        let Some(session) = self.session_mut(registry) else {
            warn!("No peer connection for inbound {:?}", message);
            return;
        };

        match message {
            InboundMessage::Answer(desc) | InboundMessage::Offer(desc) => {
                self.apply_remote_description(session, desc);
            }
            InboundMessage::Candidate(candidate) => {
                let accepted =
                    session.add_ice_candidate(candidate.mid(), candidate.mline_index(), &candidate.candidate);
                debug!(
                    "Remote ICE candidate (mid {}, index {}) accepted: {}",
                    candidate.mid(),
                    candidate.mline_index(),
                    accepted
                );
            }
            InboundMessage::Other(kind) => debug!("Ignoring signaling message of type {}", kind),
        }
    }

    /// Poll the registry and react to what the session reported. Also emits
    /// the periodic state snapshot.
    pub fn on_tick(&mut self, registry: &mut PeerConnectionRegistry, now: Instant) {
        for (session_id, events) in registry.tick(now) {
            if self.session.as_deref() != Some(session_id.as_str()) {
                debug!("Ignoring {} event(s) from session {}", events.len(), session_id);
                continue;
            }
            for event in events {
                self.handle_event(registry, event);
            }
        }

        let due = self
            .last_state_log
            .map_or(true, |last| now.saturating_duration_since(last) >= self.config.state_log_interval);
        if due {
            self.last_state_log = Some(now);
            if let Some(snapshot) = self.snapshot(registry) {
                info!("{}", snapshot);
                debug!("LocalDescription: {}", snapshot.local_description);
            }
        }
    }

    /// Transport closed: release the session.
    pub fn teardown(&mut self, registry: &mut PeerConnectionRegistry) {
        if let Some(session_id) = self.session.take() {
            registry.remove(&session_id);
        }
        self.operations.clear();
        self.enabled = false;
    }

    pub fn snapshot(&self, registry: &PeerConnectionRegistry) -> Option<StateSnapshot> {
        let session = registry.session(self.session.as_deref()?)?;
        Some(StateSnapshot {
            connection: session.connection_state(),
            ice_connection: session.ice_connection_state(),
            ice_gathering: session.ice_gathering_state(),
            signaling: session.signaling_state(),
            local_description: session.local_description(),
        })
    }

    fn handle_event(&mut self, registry: &mut PeerConnectionRegistry, event: SessionEvent) {
        match event {
            SessionEvent::IceCandidate(candidate) => {
                debug!("Ice candidate added (mid {})", candidate.sdp_mid);
                self.send(OutboundMessage::Candidate(candidate));
            }
            SessionEvent::RenegotiationNeeded => {
                info!("Renegotiation needed");
                self.start_offer(registry);
            }
            SessionEvent::Sdp { observer, outcome } => self.handle_sdp(registry, observer, outcome),
            SessionEvent::VideoTrackAdded => info!("Video track added"),
            SessionEvent::SignalingChange(state) => info!("Signaling state: {}", state),
            SessionEvent::ConnectionChange(state) => info!("Connection state: {}", state),
            SessionEvent::IceConnectionChange(state) => info!("ICE connection state: {}", state),
            SessionEvent::IceGatheringChange(state) => debug!("ICE gathering state: {}", state),
            SessionEvent::IceConnectionReceivingChange(receiving) => {
                debug!("ICE connection receiving: {}", receiving)
            }
        }
    }

    fn handle_sdp(&mut self, registry: &mut PeerConnectionRegistry, observer: ObserverId, outcome: SdpOutcome) {
        let Some(op) = self.operations.remove(&observer) else {
            debug!("Outcome for untracked SDP observer {}", observer);
            return;
        };

        match (op, outcome) {
            (PendingOp::CreateOffer, SdpOutcome::Created(desc)) => {
                info!("Created local offer");
                self.commit_local_description(registry, SdpType::Offer, desc);
            }
            (PendingOp::CreateAnswer, SdpOutcome::Created(desc)) => {
                info!("Created local answer");
                self.commit_local_description(registry, SdpType::Answer, desc);
            }
            (PendingOp::SetRemote(SdpType::Offer), SdpOutcome::Set) => {
                info!("Set remote offer");
                self.start_answer(registry);
            }
            (op @ (PendingOp::SetRemote(_) | PendingOp::SetLocal(_)), SdpOutcome::Set) => {
                info!("Completed {}", op);
            }
            (op, SdpOutcome::CreateFailed(reason) | SdpOutcome::SetFailed(reason)) => {
                error!("Failed to {}: {}", op, reason);
            }
            (op, outcome) => warn!("Unexpected outcome {:?} for {}", outcome, op),
        }
    }

    fn start_offer(&mut self, registry: &mut PeerConnectionRegistry) {
        let Some(session) = self.session_mut(registry) else {
            return;
        };
        let result = session
            .new_observer()
            .and_then(|observer| session.create_offer(observer, &self.config.constraints));
        match result {
            Ok(observer) => self.track(observer, PendingOp::CreateOffer),
            Err(e) => error!("Failed to create offer: {}", e),
        }
    }

    fn start_answer(&mut self, registry: &mut PeerConnectionRegistry) {
        let Some(session) = self.session_mut(registry) else {
            return;
        };
        let result = session
            .new_observer()
            .and_then(|observer| session.create_answer(observer, &self.config.constraints));
        match result {
            Ok(observer) => self.track(observer, PendingOp::CreateAnswer),
            Err(e) => error!("Failed to create answer: {}", e),
        }
    }

    fn commit_local_description(
        &mut self,
        registry: &mut PeerConnectionRegistry,
        kind: SdpType,
        created: SessionDescription,
    ) {
        let wrap: fn(SessionDescription) -> OutboundMessage = match kind {
            SdpType::Offer => OutboundMessage::Offer,
            SdpType::Answer => OutboundMessage::Answer,
            other => {
                warn!("Not committing a local {} description", other);
                return;
            }
        };
        let Some(session) = self.session_mut(registry) else {
            return;
        };
        let result = session
            .new_observer()
            .and_then(|observer| session.set_local_description_with(observer, kind, &created.sdp));
        match result {
            Ok(observer) => self.track(observer, PendingOp::SetLocal(kind)),
            Err(e) => {
                error!("Failed to set local description: {}", e);
                return;
            }
        }

        self.send(wrap(SessionDescription::new(kind, created.sdp)));
    }

    fn apply_remote_description(&mut self, session: &mut PeerConnectionSession, desc: SessionDescription) {
        let result = session
            .new_observer()
            .and_then(|observer| session.set_remote_description(observer, desc.kind, &desc.sdp));
        match result {
            Ok(observer) => self.track(observer, PendingOp::SetRemote(desc.kind)),
            Err(e) => error!("Failed to set remote description: {}", e),
        }
    }

    fn track(&mut self, observer: ObserverId, op: PendingOp) {
        debug!("SDP observer {}: {}", observer, op);
        self.operations.insert(observer, op);
    }

    fn send(&self, message: OutboundMessage) {
        let json = match message.to_json() {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to encode {} message: {}", message.kind(), e);
                return;
            }
        };
        if self.outbox.send(json).is_err() {
            error!("Signaling transport is closed, dropping {} message", message.kind());
        }
    }

    fn session_mut<'r>(&self, registry: &'r mut PeerConnectionRegistry) -> Option<&'r mut PeerConnectionSession> {
        let session_id = self.session.as_deref()?;
        let session = registry.session_mut(session_id);
        if session.is_none() {
            error!("PeerConnection {} is no longer registered", session_id);
        }
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::sim::{NativeCall, SimulatedManager};
    use crate::webrtc::registry::DEFAULT_POLL_INTERVAL;
    use crate::webrtc::signaling::SignalingEnvelope;
    use crate::webrtc::types::IceCandidate;
    use std::sync::Arc;

    struct Harness {
        sim: SimulatedManager,
        registry: PeerConnectionRegistry,
        orchestrator: SignalingOrchestrator,
        outbox: mpsc::UnboundedReceiver<String>,
        clock: Instant,
    }

    impl Harness {
        fn new(sim: SimulatedManager) -> Self {
            let registry = PeerConnectionRegistry::new(Some(Arc::new(sim.clone())), DEFAULT_POLL_INTERVAL);
            let (tx, rx) = mpsc::unbounded_channel();
            Self {
                sim,
                registry,
                orchestrator: SignalingOrchestrator::new(OrchestratorConfig::default(), tx),
                outbox: rx,
                clock: Instant::now(),
            }
        }

        fn open(&mut self) {
            self.orchestrator.on_open(&mut self.registry);
        }

        fn tick(&mut self) {
            self.clock += Duration::from_millis(200);
            self.orchestrator.on_tick(&mut self.registry, self.clock);
        }

        fn receive(&mut self, text: &str) {
            self.orchestrator.on_message(&mut self.registry, text);
        }

        fn sent(&mut self) -> Vec<SignalingEnvelope> {
            let mut frames = Vec::new();
            while let Ok(text) = self.outbox.try_recv() {
                frames.push(SignalingEnvelope::from_json(&text).unwrap());
            }
            frames
        }

        fn connection(&self) -> u64 {
            self.sim.connections()[0]
        }

        fn last_observer(&self, pick: impl Fn(&NativeCall) -> Option<u64>) -> u64 {
            self.sim.calls().iter().rev().find_map(pick).expect("no matching native call")
        }
    }

    #[test]
    fn test_renegotiation_sends_one_offer() {
        let mut h = Harness::new(SimulatedManager::new());
        h.open();
        assert!(h.orchestrator.session_id().is_some());

        h.sim.push_connection_event(h.connection(), "onRenegotiationNeeded", "");
        h.tick();
        let offer_observer = h.last_observer(|c| match c {
            NativeCall::CreateOffer { observer, constraints } => {
                assert_eq!(constraints, r#"{"OfferToReceiveVideo":"false"}"#);
                Some(*observer)
            }
            _ => None,
        });
        assert!(h.sent().is_empty());

        h.sim.push_event(offer_observer, "onCreateSuccess", r#"{"type":"OFFER","description":"v=0 offer"}"#);
        h.tick();

        assert!(h.sim.calls().contains(&NativeCall::SetLocalDescriptionWith {
            observer: offer_observer + 1,
            kind: SdpType::Offer,
            sdp: "v=0 offer".to_string(),
        }));

        let sent = h.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, "offer");
        let payload: SessionDescription = serde_json::from_str(&sent[0].message).unwrap();
        assert_eq!(payload.kind, SdpType::Offer);
        let raw: serde_json::Value = serde_json::from_str(&sent[0].message).unwrap();
        assert_eq!(raw["type"], "offer");
    }

    #[test]
    fn test_inbound_candidate_is_applied_once() {
        let mut h = Harness::new(SimulatedManager::new());
        h.open();

        h.receive(r#"{"type":"candidate","message":"{\"candidate\":\"candidate:1 1 udp 1 10.0.0.9 7000 typ host\",\"sdpMid\":\"0\",\"sdpMLineIndex\":0,\"usernameFragment\":\"x\"}"}"#);

        let adds: Vec<_> = h
            .sim
            .calls()
            .into_iter()
            .filter(|c| matches!(c, NativeCall::AddIceCandidate { .. }))
            .collect();
        assert_eq!(
            adds,
            vec![NativeCall::AddIceCandidate {
                sdp_mid: "0".to_string(),
                sdp_mline_index: 0,
                sdp: "candidate:1 1 udp 1 10.0.0.9 7000 typ host".to_string(),
            }]
        );
    }

    #[test]
    fn test_local_candidate_round_trip() {
        let mut local = Harness::new(SimulatedManager::new());
        local.open();
        let candidate = IceCandidate {
            adapter_type: "WIFI".to_string(),
            sdp: "candidate:5 1 udp 2122260223 192.168.0.7 51000 typ host".to_string(),
            sdp_mid: "video".to_string(),
            sdp_mline_index: 1,
            server_url: String::new(),
        };
        let value = serde_json::to_string(&candidate).unwrap();
        local.sim.push_connection_event(local.connection(), "onIceCandidate", &value);
        local.tick();

        let sent = local.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, "candidate");

        // Re-shape into what a browser would send back.
        let payload: serde_json::Value = serde_json::from_str(&sent[0].message).unwrap();
        let browser = serde_json::json!({
            "candidate": payload["sdp"],
            "sdpMid": payload["sdpMid"],
            "sdpMLineIndex": payload["sdpMLineIndex"],
            "usernameFragment": "abcd",
        });
        let frame = SignalingEnvelope {
            kind: "candidate".to_string(),
            message: browser.to_string(),
        }
        .to_json()
        .unwrap();

        let mut remote = Harness::new(SimulatedManager::new());
        remote.open();
        remote.receive(&frame);
        assert!(remote.sim.calls().contains(&NativeCall::AddIceCandidate {
            sdp_mid: "video".to_string(),
            sdp_mline_index: 1,
            sdp: candidate.sdp.clone(),
        }));
    }

    #[test]
    fn test_answer_sets_remote_description() {
        let mut h = Harness::new(SimulatedManager::new());
        h.open();

        h.receive(r#"{"type":"answer","message":"{\"type\":\"answer\",\"description\":\"v=0 answer\"}"}"#);
        let observer = h.last_observer(|c| match c {
            NativeCall::SetRemoteDescription { observer, kind, sdp } => {
                assert_eq!(*kind, SdpType::Answer);
                assert_eq!(sdp, "v=0 answer");
                Some(*observer)
            }
            _ => None,
        });

        h.sim.push_event(observer, "onSetFailure", "rejected");
        h.tick();
        assert!(h.sent().is_empty());
        assert!(h.sim.is_closed(observer));
    }

    #[test]
    fn test_offer_creation_failure_is_only_logged() {
        let mut h = Harness::new(SimulatedManager::new());
        h.open();
        h.sim.push_connection_event(h.connection(), "onRenegotiationNeeded", "");
        h.tick();
        let observer = h.last_observer(|c| match c {
            NativeCall::CreateOffer { observer, .. } => Some(*observer),
            _ => None,
        });

        h.sim.push_event(observer, "onCreateFailure", "no media");
        h.tick();
        h.tick();

        assert!(h.sent().is_empty());
        let creates = h
            .sim
            .calls()
            .iter()
            .filter(|c| matches!(c, NativeCall::CreateOffer { .. }))
            .count();
        assert_eq!(creates, 1);
    }

    #[test]
    fn test_failed_open_disables_orchestrator() {
        let sim = SimulatedManager::new();
        sim.refuse_connections(true);
        let mut h = Harness::new(sim);

        h.open();
        assert!(!h.orchestrator.is_enabled());
        assert!(h.orchestrator.session_id().is_none());

        h.receive(r#"{"type":"candidate","message":"{\"candidate\":\"candidate:1\",\"sdpMid\":\"0\",\"sdpMLineIndex\":0}"}"#);
        assert!(h.sim.calls().is_empty());
    }

    #[test]
    fn test_auto_responding_offer_flow() {
        let mut h = Harness::new(SimulatedManager::auto_responding());
        h.open();

        // renegotiation → offer created → local description set → candidate gathered
        h.tick();
        h.tick();
        h.tick();

        let sent = h.sent();
        let kinds: Vec<&str> = sent.iter().map(|f| f.kind.as_str()).collect();
        assert_eq!(kinds, vec!["offer", "candidate"]);

        let snapshot = h.orchestrator.snapshot(&h.registry).unwrap();
        assert_eq!(snapshot.signaling, SignalingState::HaveLocalOffer);
        assert!(snapshot.local_description.starts_with("v=0"));

        h.receive(r#"{"type":"answer","message":"{\"type\":\"answer\",\"description\":\"v=0 remote\"}"}"#);
        h.tick();
        let snapshot = h.orchestrator.snapshot(&h.registry).unwrap();
        assert_eq!(snapshot.signaling, SignalingState::Stable);
        assert_eq!(snapshot.connection, PeerConnectionState::Connected);
    }

    #[test]
    fn test_remote_offer_is_answered() {
        let sim = SimulatedManager::auto_responding();
        let mut h = Harness::new(sim);
        h.orchestrator.config.video = false;
        h.orchestrator.config.audio = false;
        h.open();

        h.receive(r#"{"type":"offer","message":"{\"type\":\"offer\",\"description\":\"v=0 remote offer\"}"}"#);
        h.tick();
        h.tick();
        h.tick();

        let calls = h.sim.calls();
        assert!(calls.iter().any(|c| matches!(c, NativeCall::CreateAnswer { .. })));
        assert!(calls.iter().any(|c| matches!(
            c,
            NativeCall::SetLocalDescriptionWith { kind: SdpType::Answer, .. }
        )));

        let sent = h.sent();
        assert_eq!(sent[0].kind, "answer");
        let payload: SessionDescription = serde_json::from_str(&sent[0].message).unwrap();
        assert_eq!(payload.kind, SdpType::Answer);
    }

    #[test]
    fn test_only_offer_and_answer_are_committed() {
        let mut h = Harness::new(SimulatedManager::new());
        h.open();

        for kind in [SdpType::PrAnswer, SdpType::Rollback] {
            h.orchestrator
                .commit_local_description(&mut h.registry, kind, SessionDescription::new(kind, "v=0"));
        }

        assert!(h.sent().is_empty());
        assert!(!h
            .sim
            .calls()
            .iter()
            .any(|c| matches!(c, NativeCall::SetLocalDescriptionWith { .. })));
    }

    #[test]
    fn test_teardown_removes_session() {
        let mut h = Harness::new(SimulatedManager::new());
        h.open();
        let handle = h.connection();

        h.orchestrator.teardown(&mut h.registry);
        h.orchestrator.teardown(&mut h.registry);

        assert!(h.registry.is_empty());
        assert!(h.sim.calls().contains(&NativeCall::RemovePeerConnection(handle)));
        assert_eq!(h.sim.close_count(handle), 1);
        assert!(h.orchestrator.session_id().is_none());
    }

    #[test]
    fn test_malformed_frames_are_ignored() {
        let mut h = Harness::new(SimulatedManager::new());
        h.open();
        h.receive("not json");
        h.receive(r#"{"type":"answer","message":"{broken"}"#);
        h.receive(r#"{"type":"bye"}"#);

        assert!(!h.sim.calls().iter().any(|c| matches!(
            c,
            NativeCall::SetRemoteDescription { .. } | NativeCall::AddIceCandidate { .. }
        )));
        assert!(h.orchestrator.is_enabled());
    }
}
