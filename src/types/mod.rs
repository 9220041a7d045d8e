//! Core data types flowing through the bridge.
//!
//! - [`VideoFrame`] is one complete JPEG image cut out of the device's UDP stream,
//!   shared zero-copy between all consumers.
//! - [`CommandToken`] is a validated command for the device, in the exact ASCII
//!   form that goes on the wire.
//! - [`CommandOutcome`] / [`CommandReport`] describe what happened to a command
//!   after the delivery state machine finished with it.
//!
//! ```rust
//! use mirror_bridge::types::{CommandToken, VideoFrame};
//!
//! let frame = VideoFrame::new(vec![0xFF, 0xD8, b'A', 0xFF, 0xD9], 0);
//! assert!(frame.is_delimited());
//!
//! let token = CommandToken::from_message(r#"{"command": 1}"#).unwrap();
//! assert_eq!(token.expected_ack("ACK"), b"ACK1");
//! ```

mod command;
mod frame;

pub use command::{CommandOutcome, CommandReport, CommandToken};
pub use frame::{JPEG_EOI, JPEG_SOI, VideoFrame};
