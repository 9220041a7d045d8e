//! Datagram transport used by the command channel

use std::io::ErrorKind;
use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tracing::{debug, trace};

use crate::{BridgeError, Result};

/// Largest reply the device sends; longer datagrams are truncated.
const REPLY_BUFFER_SIZE: usize = 1024;

/// Datagram socket seen by the command state machine.
///
/// Sends go to an explicit target; replies are read back on the same socket.
#[async_trait::async_trait]
pub trait ControlTransport: Send + Sync + 'static {
    async fn send_to(&self, payload: &[u8], target: SocketAddr) -> Result<()>;

    /// Wait for the next inbound datagram.
    async fn recv(&self) -> Result<Vec<u8>>;

    /// Take an already queued datagram, if any, without waiting.
    fn try_recv(&self) -> Result<Option<Vec<u8>>>;
}

/// [`ControlTransport`] over a tokio UDP socket.
#[derive(Debug)]
pub struct UdpControlTransport {
    socket: UdpSocket,
}

impl UdpControlTransport {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket =
            UdpSocket::bind(addr).await.map_err(|e| BridgeError::bind_failed("control", addr, e))?;
        debug!("Control socket bound on {}", socket.local_addr()?);
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(|e| BridgeError::io("control socket address", e))
    }
}

#[async_trait::async_trait]
impl ControlTransport for UdpControlTransport {
    async fn send_to(&self, payload: &[u8], target: SocketAddr) -> Result<()> {
        self.socket
            .send_to(payload, target)
            .await
            .map_err(|e| BridgeError::io(format!("sending command to {target}"), e))?;
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>> {
        let mut buf = [0u8; REPLY_BUFFER_SIZE];
        let (len, from) = self
            .socket
            .recv_from(&mut buf)
            .await
            .map_err(|e| BridgeError::io("receiving command reply", e))?;
        trace!(%from, len, "Control reply");
        Ok(buf[..len].to_vec())
    }

    fn try_recv(&self) -> Result<Option<Vec<u8>>> {
        let mut buf = [0u8; REPLY_BUFFER_SIZE];
        match self.socket.try_recv_from(&mut buf) {
            Ok((len, _)) => Ok(Some(buf[..len].to_vec())),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(BridgeError::io("draining control socket", e)),
        }
    }
}
