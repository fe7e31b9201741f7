//! Value types exchanged with the native layer and the signaling peer.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Declares a state enumeration reported by the native layer as an uppercase
/// string, with a closed mapping and the value used when the string is unknown
/// or the native handle is gone.
macro_rules! native_state {
    (
        $(#[$meta:meta])*
        $name:ident, fallback = $fallback:ident, { $($variant:ident => $native:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Reported for unknown native strings and unavailable handles.
            pub const FALLBACK: Self = Self::$fallback;

            pub fn parse(value: &str) -> Option<Self> {
                let value = value.trim();
                $(
                    if value.eq_ignore_ascii_case($native) {
                        return Some(Self::$variant);
                    }
                )+
                None
            }

            pub fn from_native(value: &str) -> Self {
                Self::parse(value).unwrap_or(Self::FALLBACK)
            }

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $native),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

native_state!(
    /// Aggregate peer connection state
    PeerConnectionState, fallback = Failed, {
        New => "NEW",
        Connecting => "CONNECTING",
        Connected => "CONNECTED",
        Disconnected => "DISCONNECTED",
        Failed => "FAILED",
        Closed => "CLOSED",
    }
);

native_state!(
    /// ICE transport connectivity state
    IceConnectionState, fallback = Failed, {
        New => "NEW",
        Checking => "CHECKING",
        Connected => "CONNECTED",
        Completed => "COMPLETED",
        Failed => "FAILED",
        Disconnected => "DISCONNECTED",
        Closed => "CLOSED",
    }
);

native_state!(
    /// ICE candidate gathering progress
    IceGatheringState, fallback = New, {
        New => "NEW",
        Gathering => "GATHERING",
        Complete => "COMPLETE",
    }
);

native_state!(
    /// Offer/answer state of the connection
    SignalingState, fallback = Closed, {
        Stable => "STABLE",
        HaveLocalOffer => "HAVE_LOCAL_OFFER",
        HaveLocalPrAnswer => "HAVE_LOCAL_PRANSWER",
        HaveRemoteOffer => "HAVE_REMOTE_OFFER",
        HaveRemotePrAnswer => "HAVE_REMOTE_PRANSWER",
        Closed => "CLOSED",
    }
);

/// Session description type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SdpType {
    Offer,
    PrAnswer,
    Answer,
    Rollback,
}

impl SdpType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "offer" => Some(SdpType::Offer),
            "pranswer" => Some(SdpType::PrAnswer),
            "answer" => Some(SdpType::Answer),
            "rollback" => Some(SdpType::Rollback),
            _ => None,
        }
    }

    /// Spelling used on the signaling wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            SdpType::Offer => "offer",
            SdpType::PrAnswer => "pranswer",
            SdpType::Answer => "answer",
            SdpType::Rollback => "rollback",
        }
    }

    /// Spelling expected by the native layer.
    pub fn native_name(&self) -> &'static str {
        match self {
            SdpType::Offer => "OFFER",
            SdpType::PrAnswer => "PRANSWER",
            SdpType::Answer => "ANSWER",
            SdpType::Rollback => "ROLLBACK",
        }
    }
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SdpType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SdpType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        SdpType::parse(&value)
            .ok_or_else(|| de::Error::custom(format!("unknown session description type: {}", value)))
    }
}

/// SDP produced by the native layer or received from the remote peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    #[serde(rename = "description")]
    pub sdp: String,
}

impl SessionDescription {
    pub fn new(kind: SdpType, sdp: impl Into<String>) -> Self {
        Self { kind, sdp: sdp.into() }
    }
}

/// Locally discovered ICE candidate, in the shape the native layer emits and
/// the signaling peer expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    #[serde(rename = "adapterType", default)]
    pub adapter_type: String,
    pub sdp: String,
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: String,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: i32,
    #[serde(rename = "serverUrl", default)]
    pub server_url: String,
}

/// ICE candidate as sent by a browser peer (`RTCIceCandidate.toJSON()`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteIceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<i32>,
    #[serde(rename = "usernameFragment", default)]
    pub username_fragment: Option<String>,
}

impl RemoteIceCandidate {
    pub fn mid(&self) -> &str {
        self.sdp_mid.as_deref().unwrap_or_default()
    }

    pub fn mline_index(&self) -> i32 {
        self.sdp_mline_index.unwrap_or(0)
    }
}

/// Offer/answer constraints, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaConstraints {
    entries: Vec<(String, String)>,
}

impl MediaConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a constraint; an existing key keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Flat JSON object with string values, as the native create calls expect.
    pub fn to_json(&self) -> String {
        let map: Map<String, Value> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        Value::Object(map).to_string()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MediaConstraints {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut constraints = MediaConstraints::new();
        for (k, v) in iter {
            constraints.insert(k, v);
        }
        constraints
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_states_fall_back() {
        assert_eq!(PeerConnectionState::from_native("BOGUS"), PeerConnectionState::Failed);
        assert_eq!(IceConnectionState::from_native(""), IceConnectionState::Failed);
        assert_eq!(IceGatheringState::from_native("gathering?"), IceGatheringState::New);
        assert_eq!(SignalingState::from_native("HAVE_NOTHING"), SignalingState::Closed);
    }

    #[test]
    fn test_native_state_names() {
        assert_eq!(SignalingState::from_native("HAVE_LOCAL_OFFER"), SignalingState::HaveLocalOffer);
        assert_eq!(SignalingState::from_native("have_remote_pranswer"), SignalingState::HaveRemotePrAnswer);
        assert_eq!(IceConnectionState::from_native("COMPLETED"), IceConnectionState::Completed);
        assert_eq!(PeerConnectionState::Connected.to_string(), "CONNECTED");
    }

    #[test]
    fn test_session_description_accepts_native_casing() {
        let desc: SessionDescription =
            serde_json::from_str(r#"{"type":"OFFER","description":"v=0"}"#).unwrap();
        assert_eq!(desc.kind, SdpType::Offer);

        let json = serde_json::to_string(&desc).unwrap();
        assert_eq!(json, r#"{"type":"offer","description":"v=0"}"#);
    }

    #[test]
    fn test_session_description_rejects_unknown_type() {
        let result: Result<SessionDescription, _> =
            serde_json::from_str(r#"{"type":"banana","description":"v=0"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_candidate_field_order() {
        let candidate = IceCandidate {
            adapter_type: "WIFI".to_string(),
            sdp: "candidate:1 1 udp 2122260223 10.0.0.2 50000 typ host".to_string(),
            sdp_mid: "0".to_string(),
            sdp_mline_index: 0,
            server_url: String::new(),
        };
        let json = serde_json::to_string(&candidate).unwrap();
        assert!(json.starts_with(r#"{"adapterType":"WIFI","sdp":"candidate:1"#));
        assert!(json.ends_with(r#""sdpMid":"0","sdpMLineIndex":0,"serverUrl":""}"#));
    }

    #[test]
    fn test_remote_candidate_defaults() {
        let remote: RemoteIceCandidate =
            serde_json::from_str(r#"{"candidate":"candidate:2","sdpMid":null}"#).unwrap();
        assert_eq!(remote.mid(), "");
        assert_eq!(remote.mline_index(), 0);
        assert!(remote.username_fragment.is_none());
    }

    #[test]
    fn test_constraints_keep_insertion_order() {
        let mut constraints = MediaConstraints::new();
        constraints.insert("OfferToReceiveVideo", "false");
        constraints.insert("OfferToReceiveAudio", "true");
        constraints.insert("OfferToReceiveVideo", "true");

        assert_eq!(constraints.len(), 2);
        assert_eq!(
            constraints.to_json(),
            r#"{"OfferToReceiveVideo":"true","OfferToReceiveAudio":"true"}"#
        );
    }
}
