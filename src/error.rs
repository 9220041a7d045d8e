//! Error types for the device bridge.
//!
//! Every fallible operation in the crate returns [`BridgeError`]. Most runtime
//! failures (socket hiccups, bad replies from the device, malformed commands) are
//! logged and absorbed by the task that owns them; the variants below surface
//! only where a caller can do something about them.
//!
//! ## Error Categories
//!
//! - **Setup Errors**: binding sockets, invalid or unparsable configuration
//! - **Transient Errors**: I/O failures and timeouts, retried on the next cycle
//! - **Availability Errors**: the video source is not ready, or the device address
//!   has not been learned yet
//! - **Protocol Errors**: command payloads that are not digit tokens
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use mirror_bridge::BridgeError;
//! use std::time::Duration;
//!
//! let error = BridgeError::NotReady { waited: Duration::from_secs(15) };
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for bridge operations.
pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

/// Main error type for bridge operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BridgeError {
    #[error("Failed to bind {role} socket on {addr}")]
    Bind {
        role: &'static str,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error during {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Video source not ready after {waited:?}")]
    NotReady { waited: Duration },

    #[error("Device address unknown: no video datagram received yet")]
    Unreachable,

    #[error("Invalid command: {details}")]
    InvalidCommand { details: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Subscriber {id} stopped accepting frames: {reason}")]
    Sink { id: u64, reason: String },

    #[error("Bridge is shutting down")]
    Shutdown,
}

impl BridgeError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::Io { .. } => true,
            BridgeError::Timeout { .. } => true,
            BridgeError::NotReady { .. } => true,
            BridgeError::Unreachable => true,
            BridgeError::Bind { .. } => false,
            BridgeError::Config { .. } => false,
            BridgeError::Parse { .. } => false,
            BridgeError::InvalidCommand { .. } => false,
            BridgeError::Sink { .. } => false,
            BridgeError::Shutdown => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            BridgeError::Bind { .. } => vec![
                "Check that no other process is listening on the port",
                "Pick a different port in the configuration",
                "Verify permissions for privileged ports",
            ],
            BridgeError::Io { .. } => vec![
                "Check network connectivity to the device",
                "Verify firewall rules allow UDP traffic",
            ],
            BridgeError::Config { .. } | BridgeError::Parse { .. } => vec![
                "Check the configuration file syntax",
                "Compare against the documented defaults",
            ],
            BridgeError::NotReady { .. } => vec![
                "Ensure the device is powered on and streaming",
                "Verify the device targets the bridge's video port",
                "Retry the connection once frames arrive",
            ],
            BridgeError::Unreachable => vec![
                "Wait for the device to start streaming video",
                "Verify the device can reach the bridge's video port",
            ],
            BridgeError::InvalidCommand { .. } => {
                vec!["Send a JSON object with a non-negative integer `command` field"]
            }
            BridgeError::Timeout { .. } => vec![
                "Increase the timeout duration",
                "Check that the device is responding",
            ],
            BridgeError::Sink { .. } => vec!["Reconnect the viewer"],
            BridgeError::Shutdown => vec!["Restart the bridge"],
        }
    }

    /// Helper constructor for socket bind failures.
    pub fn bind_failed(role: &'static str, addr: SocketAddr, source: std::io::Error) -> Self {
        BridgeError::Bind { role, addr, source }
    }

    /// Helper constructor for I/O errors with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        BridgeError::Io { context: context.into(), source }
    }

    /// Helper constructor for configuration validation errors.
    pub fn config(reason: impl Into<String>) -> Self {
        BridgeError::Config { reason: reason.into() }
    }

    /// Helper constructor for rejected command payloads.
    pub fn invalid_command(details: impl Into<String>) -> Self {
        BridgeError::InvalidCommand { details: details.into() }
    }

    /// Helper constructor for subscriber delivery failures.
    pub fn sink(id: u64, reason: impl Into<String>) -> Self {
        BridgeError::Sink { id, reason: reason.into() }
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Io { context: "<unknown>".to_string(), source: err }
    }
}
