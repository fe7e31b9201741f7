//! WebRTC Signaling Protocol
//!
//! Every frame on the signaling socket is an envelope
//! `{"type": "offer"|"answer"|"candidate", "message": "<json>"}` whose
//! `message` is itself a JSON document encoded as a string.
//!
//! Candidates are asymmetric on the wire: we send the native shape (`sdp`),
//! browsers send `RTCIceCandidate.toJSON()` (`candidate`).

use super::types::{IceCandidate, RemoteIceCandidate, SessionDescription};
use super::RtcError;
use serde::{Deserialize, Serialize};

/// Outer frame of every signaling message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalingEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub message: String,
}

impl SignalingEnvelope {
    pub fn from_json(json: &str) -> Result<Self, RtcError> {
        serde_json::from_str(json)
            .map_err(|e| RtcError::Signaling(format!("Invalid signaling message: {}", e)))
    }

    pub fn to_json(&self) -> Result<String, RtcError> {
        serde_json::to_string(self)
            .map_err(|e| RtcError::Signaling(format!("Failed to serialize message: {}", e)))
    }
}

/// Message we send to the remote peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Offer(SessionDescription),
    Answer(SessionDescription),
    Candidate(IceCandidate),
}

impl OutboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::Offer(_) => "offer",
            OutboundMessage::Answer(_) => "answer",
            OutboundMessage::Candidate(_) => "candidate",
        }
    }

    /// Serialize to the envelope JSON sent over the transport
    pub fn to_json(&self) -> Result<String, RtcError> {
        let payload = match self {
            OutboundMessage::Offer(desc) | OutboundMessage::Answer(desc) => serde_json::to_string(desc),
            OutboundMessage::Candidate(candidate) => serde_json::to_string(candidate),
        }
        .map_err(|e| RtcError::Signaling(format!("Failed to serialize payload: {}", e)))?;

        SignalingEnvelope {
            kind: self.kind().to_string(),
            message: payload,
        }
        .to_json()
    }
}

/// Message received from the remote peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Offer(SessionDescription),
    Answer(SessionDescription),
    Candidate(RemoteIceCandidate),
    /// Envelope type this client does not handle
    Other(String),
}

impl InboundMessage {
    /// Parse a text frame from the signaling transport
    pub fn parse(text: &str) -> Result<Self, RtcError> {
        let envelope = SignalingEnvelope::from_json(text.trim())?;
        match envelope.kind.as_str() {
            "offer" => Ok(InboundMessage::Offer(parse_description(&envelope.message)?)),
            "answer" => Ok(InboundMessage::Answer(parse_description(&envelope.message)?)),
            "candidate" => {
                let candidate = serde_json::from_str(&envelope.message)
                    .map_err(|e| RtcError::Ice(format!("Invalid remote ICE candidate: {}", e)))?;
                Ok(InboundMessage::Candidate(candidate))
            }
            other => Ok(InboundMessage::Other(other.to_string())),
        }
    }
}

fn parse_description(message: &str) -> Result<SessionDescription, RtcError> {
    serde_json::from_str(message)
        .map_err(|e| RtcError::Sdp(format!("Invalid session description: {}", e)))
}
