//! SDP operation observers
//!
//! One observer is created per SDP operation (create offer/answer, set
//! local/remote description, get remote description). It reports exactly one
//! outcome; anything the native side delivers afterwards is ignored.

use super::event_log::{DecodeStats, EventLog, NativeEvent};
use super::types::SessionDescription;
use crate::native::{Handle, NativeEventSource};
use log::{debug, error, warn};

/// Observers are identified by their native handle
pub type ObserverId = Handle;

/// Terminal result of an SDP operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdpOutcome {
    Created(SessionDescription),
    CreateFailed(String),
    Set,
    SetFailed(String),
}

impl SdpOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SdpOutcome::Created(_) | SdpOutcome::Set)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverState {
    Pending,
    Succeeded,
    Failed,
    Disposed,
}

pub struct SdpObserver {
    id: ObserverId,
    native: Option<Box<dyn NativeEventSource>>,
    state: ObserverState,
    outcome: Option<SdpOutcome>,
}

impl SdpObserver {
    pub fn new(native: Box<dyn NativeEventSource>) -> Self {
        Self {
            id: native.handle(),
            native: Some(native),
            state: ObserverState::Pending,
            outcome: None,
        }
    }

    pub fn id(&self) -> ObserverId {
        self.id
    }

    pub fn state(&self) -> ObserverState {
        self.state
    }

    pub fn outcome(&self) -> Option<&SdpOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_disposed(&self) -> bool {
        self.state == ObserverState::Disposed
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, ObserverState::Succeeded | ObserverState::Failed)
    }

    /// Drain the native log and return the outcome if this poll produced it.
    /// Disposed observers never report anything.
    pub fn poll(&mut self, stats: &DecodeStats) -> Option<SdpOutcome> {
        let native = self.native.as_mut()?;
        let log = EventLog::parse_counted(&native.event_log_json(), stats);

        let mut reached = None;
        for event in log.decode(stats) {
            let outcome = match event {
                NativeEvent::SdpCreateSucceeded(desc) => {
                    debug!("SDP observer {}: onCreateSuccess {}", self.id, desc.kind);
                    SdpOutcome::Created(desc)
                }
                NativeEvent::SdpCreateFailed(reason) => {
                    debug!("SDP observer {}: onCreateFailure {}", self.id, reason);
                    SdpOutcome::CreateFailed(reason)
                }
                NativeEvent::SdpSetSucceeded => {
                    debug!("SDP observer {}: onSetSuccess", self.id);
                    SdpOutcome::Set
                }
                NativeEvent::SdpSetFailed(reason) => {
                    debug!("SDP observer {}: onSetFailure {}", self.id, reason);
                    SdpOutcome::SetFailed(reason)
                }
                other => {
                    debug!("SDP observer {}: ignoring {:?}", self.id, other);
                    continue;
                }
            };

            if self.state != ObserverState::Pending {
                warn!(
                    "SDP observer {} already finished, ignoring extra outcome {:?}",
                    self.id, outcome
                );
                continue;
            }

            self.state = if outcome.is_success() {
                ObserverState::Succeeded
            } else {
                ObserverState::Failed
            };
            self.outcome = Some(outcome.clone());
            reached = Some(outcome);
        }

        reached
    }

    /// Release the native observer. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if let Some(mut native) = self.native.take() {
            native.close();
        }
        self.state = ObserverState::Disposed;
    }

    pub(crate) fn ensure_live(&self) -> bool {
        if self.is_disposed() {
            error!("SdpObserver {} is disposed", self.id);
            return false;
        }
        true
    }
}

impl Drop for SdpObserver {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for SdpObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdpObserver")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish()
    }
}
