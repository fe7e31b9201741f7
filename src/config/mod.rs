//! Configuration management for projection-rtc

use crate::webrtc::{MediaConstraints, OrchestratorConfig, RtcError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Signaling server
    #[serde(default)]
    pub signaling: SignalingConfig,

    /// Peer connection settings
    #[serde(default)]
    pub webrtc: WebRTCConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalingConfig {
    /// WebSocket URL of the signaling server
    #[serde(default = "default_signaling_url")]
    pub url: String,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            url: default_signaling_url(),
        }
    }
}

/// One media constraint, kept as a list so the order survives TOML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintEntry {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebRTCConfig {
    /// ICE server URLs (STUN/TURN)
    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<String>,

    /// Offer/answer constraints, sent in this order
    #[serde(default = "default_constraints")]
    pub constraints: Vec<ConstraintEntry>,

    /// Request a video track
    #[serde(default = "default_true")]
    pub video: bool,

    /// Request an audio track
    #[serde(default = "default_true")]
    pub audio: bool,

    /// Native event-log polling interval
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Interval of the state snapshot log line
    #[serde(default = "default_state_log_interval_ms")]
    pub state_log_interval_ms: u64,
}

impl Default for WebRTCConfig {
    fn default() -> Self {
        Self {
            ice_servers: default_ice_servers(),
            constraints: default_constraints(),
            video: true,
            audio: true,
            poll_interval_ms: default_poll_interval_ms(),
            state_log_interval_ms: default_state_log_interval_ms(),
        }
    }
}

impl WebRTCConfig {
    pub fn media_constraints(&self) -> MediaConstraints {
        self.constraints
            .iter()
            .map(|c| (c.key.as_str(), c.value.as_str()))
            .collect()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            ice_servers: self.ice_servers.clone(),
            constraints: self.media_constraints(),
            video: self.video,
            audio: self.audio,
            state_log_interval: Duration::from_millis(self.state_log_interval_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), RtcError> {
        let url = self.signaling.url.trim();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(RtcError::Config(format!(
                "Signaling url must start with ws:// or wss://, got {:?}",
                self.signaling.url
            )));
        }

        // Servers are handed to the native layer joined by spaces.
        for server in &self.webrtc.ice_servers {
            if server.trim().is_empty() || server.split_whitespace().count() != 1 {
                return Err(RtcError::Config(format!("Invalid ICE server entry {:?}", server)));
            }
        }

        if self.webrtc.constraints.iter().any(|c| c.key.trim().is_empty()) {
            return Err(RtcError::Config("Constraint keys must be non-empty".to_string()));
        }

        if self.webrtc.poll_interval_ms == 0 {
            return Err(RtcError::Config("WebRTC poll interval must be non-zero".to_string()));
        }

        if self.webrtc.state_log_interval_ms < 1000 {
            return Err(RtcError::Config(
                "WebRTC state log interval must be at least 1000 ms".to_string(),
            ));
        }

        if self.logging.level.parse::<log::LevelFilter>().is_err() {
            return Err(RtcError::Config(format!("Unknown log level {:?}", self.logging.level)));
        }

        Ok(())
    }
}


fn default_signaling_url() -> String {
    "ws://localhost:8080".to_string()
}

fn default_ice_servers() -> Vec<String> {
    vec!["stun:stun.l.google.com:19302".to_string()]
}

fn default_constraints() -> Vec<ConstraintEntry> {
    vec![ConstraintEntry {
        key: "OfferToReceiveVideo".to_string(),
        value: "false".to_string(),
    }]
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 { 100 }
fn default_state_log_interval_ms() -> u64 { 1000 }

fn default_log_level() -> String {
    "info".to_string()
}
