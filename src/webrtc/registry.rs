//! Peer connection registry
//!
//! Owns every live session and the native manager they were created from.
//! Replacing the manager (capture restarted, platform object destroyed)
//! invalidates all sessions at once, since their native handles dangle.

use super::event_log::DecodeStats;
use super::peer_connection::{PeerConnectionSession, SessionEvent};
use crate::native::NativeManager;
use log::{debug, error, info};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Session identifier (UUID)
pub type SessionId = String;

/// Default interval between two polls of the native layer
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct PeerConnectionRegistry {
    manager: Option<Arc<dyn NativeManager>>,
    sessions: Vec<PeerConnectionSession>,
    poll_interval: Duration,
    last_poll: Option<Instant>,
    stats: Arc<DecodeStats>,
}

impl PeerConnectionRegistry {
    pub fn new(manager: Option<Arc<dyn NativeManager>>, poll_interval: Duration) -> Self {
        Self {
            manager,
            sessions: Vec::new(),
            poll_interval,
            last_poll: None,
            stats: Arc::new(DecodeStats::new()),
        }
    }

    pub fn has_manager(&self) -> bool {
        self.manager.is_some()
    }

    /// Swap the native manager. Existing sessions are invalidated first.
    pub fn set_manager(&mut self, manager: Option<Arc<dyn NativeManager>>) {
        info!(
            "Native manager changed ({}), invalidating {} session(s)",
            if manager.is_some() { "available" } else { "gone" },
            self.sessions.len()
        );
        self.invalidate_all();
        self.manager = manager;
    }

    /// Create a session. Returns `None` (and logs) when no manager is
    /// available or the native side refuses.
    pub fn create(&mut self, ice_servers: &[String], want_video: bool, want_audio: bool) -> Option<SessionId> {
        let Some(manager) = self.manager.as_ref() else {
            error!("Native manager is not available");
            return None;
        };

        let ice_servers = ice_servers.join(" ");
        let native = match manager.create_peer_connection(&ice_servers, want_video, want_audio) {
            Ok(native) => native,
            Err(e) => {
                error!("Failed to create peer connection: {}", e);
                return None;
            }
        };

        let session_id = uuid::Uuid::new_v4().to_string();
        let session = PeerConnectionSession::new(session_id.clone(), native, self.stats.clone());
        info!(
            "Created peer connection session {} (video: {}, audio: {})",
            session_id, want_video, want_audio
        );
        self.sessions.push(session);
        Some(session_id)
    }

    /// Remove a session natively, then dispose it. Unknown ids are a no-op.
    pub fn remove(&mut self, session_id: &str) -> bool {
        let Some(index) = self.sessions.iter().position(|s| s.id() == session_id) else {
            debug!("Session {} already removed", session_id);
            return false;
        };
        let mut session = self.sessions.remove(index);

        match (self.manager.as_ref(), session.native_handle()) {
            (Some(manager), Some(handle)) => manager.remove_peer_connection(handle),
            (None, _) => error!("Native manager is not available, disposing session {} locally", session_id),
            (_, None) => {}
        }

        session.dispose();
        info!("Removed session {}", session_id);
        true
    }

    /// Dispose every session without native removal calls and forget them.
    pub fn invalidate_all(&mut self) {
        if self.sessions.is_empty() {
            return;
        }
        info!("Invalidating {} session(s)", self.sessions.len());
        for mut session in self.sessions.drain(..) {
            session.dispose();
        }
    }

    /// Poll every session, at most once per poll interval. Returns the
    /// notifications of each session that produced any.
    pub fn tick(&mut self, now: Instant) -> Vec<(SessionId, Vec<SessionEvent>)> {
        if let Some(last) = self.last_poll {
            if now.saturating_duration_since(last) < self.poll_interval {
                return Vec::new();
            }
        }
        self.last_poll = Some(now);

        let mut batches = Vec::new();
        for session in self.sessions.iter_mut() {
            let events = session.poll_events();
            if !events.is_empty() {
                batches.push((session.id().to_string(), events));
            }
        }
        batches
    }

    pub fn session(&self, session_id: &str) -> Option<&PeerConnectionSession> {
        self.sessions.iter().find(|s| s.id() == session_id)
    }

    pub fn session_mut(&mut self, session_id: &str) -> Option<&mut PeerConnectionSession> {
        self.sessions.iter_mut().find(|s| s.id() == session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Native payloads dropped because they could not be decoded
    pub fn decode_failures(&self) -> u64 {
        self.stats.failures()
    }
}

impl Drop for PeerConnectionRegistry {
    fn drop(&mut self) {
        self.invalidate_all();
    }
}
