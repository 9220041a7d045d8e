//! Presence beacon announcing the bridge on the local network.
//!
//! Devices and viewers find the bridge by listening for a UDP broadcast of the
//! form `<tag>:<host-ip>[:<port>]`, e.g.
//! `FITNESS_MIRROR_SERVER_AT:192.168.1.10:8080`. The beacon repeats it forever
//! and never gives up on send errors; it only slows down.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BeaconConfig;
use crate::{BridgeError, Result};

/// One presence announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub tag: String,
    pub host: IpAddr,
    pub port: Option<u16>,
}

impl Advertisement {
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

}

impl fmt::Display for Advertisement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tag, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        Ok(())
    }
}

/// Primary LAN address of this host.
///
/// Asks the routing table which local address would reach a public host. No
/// packet is sent. Falls back to loopback when there is no route.
pub fn detect_local_ip() -> IpAddr {
    std::net::UdpSocket::bind("0.0.0.0:0")
        .and_then(|s| {
            s.connect("8.8.8.8:80")?;
            s.local_addr()
        })
        .map(|a| a.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Counters reported by [`PresenceBeacon::run`] when it stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BeaconStats {
    pub sent: u64,
    pub failed: u64,
}

pub struct PresenceBeacon {
    socket: UdpSocket,
    target: SocketAddr,
    advertisement: Advertisement,
    interval: Duration,
    error_backoff: Duration,
}

impl PresenceBeacon {
    /// Bind the beacon socket.
    ///
    /// `server_port` is appended to the announcement when the configuration asks
    /// for it. A configured `host_ip` wins over auto-detection.
    pub async fn bind(config: &BeaconConfig, server_port: Option<u16>) -> Result<Self> {
        let target = config.target_addr();
        let local: SocketAddr = match target {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };

        let socket =
            UdpSocket::bind(local).await.map_err(|e| BridgeError::bind_failed("beacon", local, e))?;
        if target.is_ipv4() {
            socket.set_broadcast(true).map_err(|e| BridgeError::io("enabling broadcast", e))?;
        }

        let host = match config.host_ip {
            Some(ip) => ip,
            None => {
                let ip = detect_local_ip();
                debug!("Detected local address {}", ip);
                ip
            }
        };
        let advertisement = Advertisement {
            tag: config.tag.clone(),
            host,
            port: if config.advertise_port { server_port } else { None },
        };

        Ok(Self {
            socket,
            target,
            advertisement,
            interval: config.interval(),
            error_backoff: config.error_backoff(),
        })
    }

    pub fn advertisement(&self) -> &Advertisement {
        &self.advertisement
    }

    /// Announce until cancelled.
    ///
    /// A failed send is retried after `error_backoff` instead of `interval`.
    pub async fn run(self, cancel: CancellationToken) -> BeaconStats {
        let payload = self.advertisement.to_bytes();
        info!(target_addr = %self.target, "Presence beacon started: {}", self.advertisement);
        let mut stats = BeaconStats::default();

        loop {
            let pause = match self.socket.send_to(&payload, self.target).await {
                Ok(_) => {
                    stats.sent += 1;
                    debug!("Beacon sent: {}", self.advertisement);
                    self.interval
                }
                Err(e) => {
                    stats.failed += 1;
                    warn!("Beacon send to {} failed: {}", self.target, e);
                    self.error_backoff
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        info!("Presence beacon stopped ({} announcements, {} failed)", stats.sent, stats.failed);
        stats
    }
}
