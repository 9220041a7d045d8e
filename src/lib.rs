//! Bridge between a UDP camera/actuator device and WebSocket viewers.
//!
//! The device streams JPEG images as raw UDP fragments and takes numeric
//! commands on a UDP control port. This crate turns that into something many
//! viewers can share:
//!
//! - **Reassembly**: fragments are stitched back into complete JPEG frames
//! - **Distribution**: bounded drop-oldest queues feed push subscribers and pull
//!   consumers without ever stalling the device stream
//! - **Commands**: acknowledged, retried, strictly ordered delivery over UDP
//! - **Discovery**: a periodic broadcast announces where the bridge lives
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use mirror_bridge::{Bridge, BridgeConfig, CommandToken};
//!
//! #[tokio::main]
//! async fn main() -> mirror_bridge::Result<()> {
//!     let bridge = Bridge::start(BridgeConfig::default()).await?;
//!
//!     // Pull consumers wait for the first frame (15 s by default).
//!     let consumer = bridge.attach_consumer().await?;
//!     if let Some(frame) = consumer.next_frame().await {
//!         println!("frame #{} ({} bytes)", frame.seq, frame.len());
//!     }
//!
//!     bridge.submit(CommandToken::from_number(2))?;
//!     bridge.shutdown().await;
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod config;
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Engine components
pub mod beacon;
pub mod command;
pub mod distributor;
pub mod endpoint;
pub mod gate;
pub mod reassembler;

// Task plumbing
pub mod bridge;
pub mod driver;
pub mod provider;
pub mod providers;

// Transport adapter
pub mod server;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use beacon::{Advertisement, BeaconStats, PresenceBeacon, detect_local_ip};
pub use bridge::Bridge;
pub use command::{CommandChannel, CommandPolicy, CommandSender, ControlTransport};
pub use config::BridgeConfig;
pub use distributor::{FrameConsumer, FrameDistributor, FrameSink, SubscriberId, SubscriberSet};
pub use endpoint::DeviceEndpointResolver;
pub use gate::ReadinessGate;
pub use reassembler::{FrameReassembler, ReassemblerStats};
