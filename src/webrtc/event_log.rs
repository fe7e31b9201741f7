//! Native observer event log
//!
//! The native observers cannot call back into us. Instead they append
//! `{key, value}` pairs to a log that is drained with `getEventLogJson()` on
//! every poll. This module turns one drained batch into typed events, in
//! emission order.

use super::types::{
    IceCandidate, IceConnectionState, IceGatheringState, PeerConnectionState, SessionDescription,
    SignalingState,
};
use super::RtcError;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

/// One native callback, as logged by the native observer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventLogEntry {
    pub key: String,
    pub value: String,
}

impl EventLogEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Read one element of `dataList`. A missing or null value is empty;
    /// non-string values keep their JSON text for the key's decoder.
    fn from_value(element: Value) -> Result<Self, RtcError> {
        let mut fields = match element {
            Value::Object(fields) => fields,
            other => {
                return Err(RtcError::Signaling(format!("Event log entry is not an object: {}", other)))
            }
        };
        let key = match fields.remove("key") {
            Some(Value::String(key)) => key,
            other => {
                return Err(RtcError::Signaling(format!("Event log entry without a key: {:?}", other)))
            }
        };
        let value = match fields.remove("value") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(value)) => value,
            Some(other) => other.to_string(),
        };
        Ok(Self { key, value })
    }
}

/// Wire shape of a drained batch, read leniently so one bad entry does not
/// take its neighbours down
#[derive(Deserialize)]
struct RawEventLog {
    #[serde(rename = "dataList", default)]
    data_list: Option<Vec<Value>>,
}

/// Everything a native observer produced since the previous poll
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventLog {
    #[serde(rename = "dataList")]
    pub data_list: Vec<EventLogEntry>,
}

impl EventLog {
    /// Parse a drained batch. An empty string or a null `dataList` means
    /// "no events". Malformed entries are skipped.
    pub fn from_json(json: &str) -> Result<Self, RtcError> {
        Self::parse(json).map(|(log, _)| log)
    }

    /// Like [`EventLog::from_json`], but failures are counted: a malformed
    /// batch once, each skipped entry once. A malformed batch is empty.
    pub fn parse_counted(json: &str, stats: &DecodeStats) -> Self {
        match Self::parse(json) {
            Ok((log, skipped)) => {
                for _ in 0..skipped {
                    stats.record();
                }
                log
            }
            Err(e) => {
                stats.record();
                warn!("Dropping event log batch: {}", e);
                EventLog::default()
            }
        }
    }

    fn parse(json: &str) -> Result<(Self, usize), RtcError> {
        if json.trim().is_empty() {
            return Ok((EventLog::default(), 0));
        }
        let raw: RawEventLog = serde_json::from_str(json)
            .map_err(|e| RtcError::Signaling(format!("Invalid event log: {}", e)))?;

        let mut data_list = Vec::new();
        let mut skipped = 0;
        for element in raw.data_list.unwrap_or_default() {
            match EventLogEntry::from_value(element) {
                Ok(entry) => data_list.push(entry),
                Err(e) => {
                    skipped += 1;
                    warn!("Dropping event log entry: {}", e);
                }
            }
        }
        Ok((EventLog { data_list }, skipped))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"dataList":[]}"#.to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.data_list.is_empty()
    }

    /// Decode the batch lazily, in emission order.
    pub fn decode<'a>(&'a self, stats: &'a DecodeStats) -> EventLogDecoder<'a> {
        EventLogDecoder {
            entries: self.data_list.iter(),
            stats,
        }
    }
}

/// Typed native callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeEvent {
    SignalingChanged(SignalingState),
    ConnectionChanged(PeerConnectionState),
    IceConnectionChanged(IceConnectionState),
    IceConnectionReceivingChanged(bool),
    IceGatheringChanged(IceGatheringState),
    IceCandidateDiscovered(IceCandidate),
    RenegotiationNeeded,
    SdpCreateSucceeded(SessionDescription),
    SdpCreateFailed(String),
    SdpSetSucceeded,
    SdpSetFailed(String),
    /// Key this build does not know; consumers ignore it
    Unknown(String),
}

impl NativeEvent {
    /// Whether this event ends an SDP operation
    pub fn is_sdp_outcome(&self) -> bool {
        matches!(
            self,
            NativeEvent::SdpCreateSucceeded(_)
                | NativeEvent::SdpCreateFailed(_)
                | NativeEvent::SdpSetSucceeded
                | NativeEvent::SdpSetFailed(_)
        )
    }
}

/// Decode a single entry. Unknown keys are not an error; values that do not
/// fit the shape their key promises are.
pub fn decode_entry(entry: &EventLogEntry) -> Result<NativeEvent, RtcError> {
    let value = entry.value.as_str();
    let event = match entry.key.as_str() {
        "onSignalingChange" => NativeEvent::SignalingChanged(parse_state(value, SignalingState::parse)?),
        "onConnectionChange" => {
            NativeEvent::ConnectionChanged(parse_state(value, PeerConnectionState::parse)?)
        }
        "onIceConnectionChange" => {
            NativeEvent::IceConnectionChanged(parse_state(value, IceConnectionState::parse)?)
        }
        "onIceConnectionReceivingChange" => {
            NativeEvent::IceConnectionReceivingChanged(parse_bool(value)?)
        }
        "onIceGatheringChange" => {
            NativeEvent::IceGatheringChanged(parse_state(value, IceGatheringState::parse)?)
        }
        "onIceCandidate" => NativeEvent::IceCandidateDiscovered(
            serde_json::from_str(value)
                .map_err(|e| RtcError::Ice(format!("Invalid ICE candidate: {}", e)))?,
        ),
        "onRenegotiationNeeded" => NativeEvent::RenegotiationNeeded,
        "onCreateSuccess" => NativeEvent::SdpCreateSucceeded(
            serde_json::from_str(value)
                .map_err(|e| RtcError::Sdp(format!("Invalid session description: {}", e)))?,
        ),
        "onCreateFailure" => NativeEvent::SdpCreateFailed(value.to_string()),
        "onSetSuccess" => NativeEvent::SdpSetSucceeded,
        "onSetFailure" => NativeEvent::SdpSetFailed(value.to_string()),
        other => NativeEvent::Unknown(other.to_string()),
    };
    Ok(event)
}

fn parse_state<T>(value: &str, parse: fn(&str) -> Option<T>) -> Result<T, RtcError> {
    parse(value).ok_or_else(|| RtcError::Signaling(format!("Unknown state: {}", value)))
}

fn parse_bool(value: &str) -> Result<bool, RtcError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(RtcError::Signaling(format!("Invalid boolean: {}", value))),
    }
}

/// Lazy decoder over one batch. Entries whose value cannot be decoded are
/// dropped and counted.
pub struct EventLogDecoder<'a> {
    entries: std::slice::Iter<'a, EventLogEntry>,
    stats: &'a DecodeStats,
}

impl Iterator for EventLogDecoder<'_> {
    type Item = NativeEvent;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = self.entries.next()?;
            debug!("Event log: {} - {}", entry.key, entry.value);
            match decode_entry(entry) {
                Ok(event) => return Some(event),
                Err(e) => {
                    self.stats.record();
                    warn!("Dropping event log entry {}: {}", entry.key, e);
                }
            }
        }
    }
}

/// Count of native payloads that could not be decoded
#[derive(Debug, Default)]
pub struct DecodeStats {
    failures: AtomicU64,
}

impl DecodeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}
