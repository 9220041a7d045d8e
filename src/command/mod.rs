//! Reliable command delivery to the device over UDP.
//!
//! UDP gives no delivery guarantee, so every command is confirmed by an
//! application-level acknowledgement:
//!
//! ```text
//! DRAIN_STALE -> SEND(attempt) -> WAIT_ACK -> matched:        Delivered
//!                     ^              |
//!                     +--------------+ timeout/mismatch/error: next attempt
//!                                      or Exhausted after the last one
//! ```
//!
//! Commands are queued by any number of producers through a [`CommandSender`]
//! and handled strictly one at a time, in submission order, by a single worker
//! task. The worker reads replies on the same socket it sends from.

mod channel;
mod transport;

pub use channel::{CommandChannel, CommandPolicy, CommandSender};
pub use transport::{ControlTransport, UdpControlTransport};
