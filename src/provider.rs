//! Source trait for inbound video datagrams

use std::net::SocketAddr;

use crate::Result;

/// One UDP payload together with the address that sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub payload: Vec<u8>,
    pub sender: SocketAddr,
}

/// Trait for video datagram sources
///
/// The ingestion driver pulls datagrams from a source in a loop. Sources handle
/// their own waiting; the driver races every call against shutdown.
#[async_trait::async_trait]
pub trait DatagramSource: Send + 'static {
    /// Wait for the next datagram
    ///
    /// Returns:
    /// - `Ok(Some(datagram))` - Payload received
    /// - `Ok(None)` - Source closed (normal termination)
    /// - `Err(e)` - Receive failed; the driver backs off and retries
    async fn next_datagram(&mut self) -> Result<Option<Datagram>>;
}
