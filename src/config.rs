//! Static bridge configuration.
//!
//! All ports, timeouts, retry counts and queue depths live here. Every field has
//! a default matching the deployed device firmware, so an empty YAML document is
//! a valid configuration. Durations are expressed in milliseconds.
//!
//! ```yaml
//! video:
//!   bind: "0.0.0.0:8888"
//!   ready_grace_ms: 15000
//! control:
//!   device_port: 9999
//!   ack_timeout_ms: 1000
//!   max_attempts: 3
//! beacon:
//!   host_ip: "192.168.1.20"
//! server:
//!   bind: "0.0.0.0:8080"
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{BridgeError, Result};

/// Top-level bridge configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub video: VideoConfig,
    pub control: ControlConfig,
    pub beacon: BeaconConfig,
    pub server: ServerConfig,
}

/// Video ingestion and distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// UDP address the device streams JPEG fragments to.
    pub bind: SocketAddr,
    /// Buffered bytes allowed while waiting for an end-of-image marker.
    pub max_pending_bytes: usize,
    /// Frames kept for the push broadcaster.
    pub broadcast_depth: usize,
    /// Frames kept for pull consumers.
    pub pull_depth: usize,
    /// How long a pull consumer waits for the first frame before being rejected.
    pub ready_grace_ms: u64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8888),
            max_pending_bytes: 4 * 1024 * 1024,
            broadcast_depth: 10,
            pull_depth: 1,
            ready_grace_ms: 15_000,
        }
    }
}

impl VideoConfig {
    pub fn ready_grace(&self) -> Duration {
        Duration::from_millis(self.ready_grace_ms)
    }
}

/// Command delivery to the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Local address of the control socket (commands out, ACKs in).
    pub bind: SocketAddr,
    /// Port the device listens on for commands.
    pub device_port: u16,
    pub ack_timeout_ms: u64,
    pub max_attempts: u32,
    /// Prefix of the reply confirming a command, e.g. `ACK` for `ACK2`.
    pub ack_prefix: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            device_port: 9999,
            ack_timeout_ms: 1_000,
            max_attempts: 3,
            ack_prefix: "ACK".to_string(),
        }
    }
}

impl ControlConfig {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

/// LAN presence advertisement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    pub enabled: bool,
    pub port: u16,
    /// Destination address, normally the limited broadcast address.
    pub target: IpAddr,
    pub tag: String,
    pub interval_ms: u64,
    /// Pause after a failed send before resuming the normal cadence.
    pub error_backoff_ms: u64,
    /// Address to advertise; detected from the routing table when unset.
    pub host_ip: Option<IpAddr>,
    /// Append the WebSocket server port to the advertisement.
    pub advertise_port: bool,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 9999,
            target: IpAddr::V4(Ipv4Addr::BROADCAST),
            tag: "FITNESS_MIRROR_SERVER_AT".to_string(),
            interval_ms: 5_000,
            error_backoff_ms: 10_000,
            host_ip: None,
            advertise_port: true,
        }
    }
}

impl BeaconConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn target_addr(&self) -> SocketAddr {
        SocketAddr::new(self.target, self.port)
    }
}

/// Client-facing WebSocket/HTTP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080) }
    }
}

impl BridgeConfig {
    /// Parse a YAML document; missing keys fall back to defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml).map_err(|e| BridgeError::Parse {
            context: "bridge configuration".to_string(),
            details: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::io(format!("reading {}", path.display()), e))?;
        Self::from_yaml_str(&yaml)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.video.broadcast_depth == 0 || self.video.pull_depth == 0 {
            return Err(BridgeError::config("frame queue depths must be at least 1"));
        }
        // Room for at least one start marker and one end marker.
        if self.video.max_pending_bytes < 4 {
            return Err(BridgeError::config("video.max_pending_bytes must be at least 4"));
        }
        if self.control.max_attempts == 0 {
            return Err(BridgeError::config("control.max_attempts must be at least 1"));
        }
        if self.control.ack_timeout_ms == 0 {
            return Err(BridgeError::config("control.ack_timeout_ms must be positive"));
        }
        if self.control.device_port == 0 {
            return Err(BridgeError::config("control.device_port must be non-zero"));
        }
        if self.control.ack_prefix.is_empty() || !self.control.ack_prefix.is_ascii() {
            return Err(BridgeError::config("control.ack_prefix must be non-empty ASCII"));
        }
        if self.beacon.enabled {
            if self.beacon.interval_ms == 0 {
                return Err(BridgeError::config("beacon.interval_ms must be positive"));
            }
            if self.beacon.tag.is_empty() || self.beacon.tag.contains(':') {
                return Err(BridgeError::config(
                    "beacon.tag must be non-empty and must not contain ':'",
                ));
            }
        }
        Ok(())
    }
}
