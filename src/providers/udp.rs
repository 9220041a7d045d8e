//! UDP socket source for the device's video stream

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tracing::info;

use crate::provider::{Datagram, DatagramSource};
use crate::{BridgeError, Result};

/// Largest possible UDP payload.
const MAX_DATAGRAM_SIZE: usize = 65536;

/// Receives raw video fragments on a bound UDP socket.
pub struct UdpVideoSource {
    socket: UdpSocket,
    buffer: Box<[u8]>,
}

impl UdpVideoSource {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket =
            UdpSocket::bind(addr).await.map_err(|e| BridgeError::bind_failed("video", addr, e))?;
        let local = socket.local_addr().map_err(|e| BridgeError::io("video socket address", e))?;
        info!("Listening for video on udp://{}", local);
        Ok(Self { socket, buffer: vec![0u8; MAX_DATAGRAM_SIZE].into_boxed_slice() })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(|e| BridgeError::io("video socket address", e))
    }
}

#[async_trait::async_trait]
impl DatagramSource for UdpVideoSource {
    async fn next_datagram(&mut self) -> Result<Option<Datagram>> {
        let (len, sender) = self
            .socket
            .recv_from(&mut self.buffer)
            .await
            .map_err(|e| BridgeError::io("receiving video datagram", e))?;
        Ok(Some(Datagram { payload: self.buffer[..len].to_vec(), sender }))
    }
}
