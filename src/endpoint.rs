//! Device address learned from the video stream

use std::net::SocketAddr;
use std::sync::OnceLock;
use tracing::info;

/// Remembers where the device lives.
///
/// The device never announces itself; its address is taken from the first video
/// datagram and combined with the fixed control port. The first sender wins for
/// the lifetime of the process.
#[derive(Debug)]
pub struct DeviceEndpointResolver {
    control_port: u16,
    endpoint: OnceLock<SocketAddr>,
}

impl DeviceEndpointResolver {
    pub fn new(control_port: u16) -> Self {
        Self { control_port, endpoint: OnceLock::new() }
    }

    /// Record the sender of a video datagram.
    ///
    /// Returns `true` if this call set the endpoint.
    pub fn observe(&self, sender: SocketAddr) -> bool {
        let endpoint = SocketAddr::new(sender.ip(), self.control_port);
        let learned = self.endpoint.set(endpoint).is_ok();
        if learned {
            info!(%endpoint, video_sender = %sender, "Device endpoint discovered");
        }
        learned
    }

    /// The device control address, if a video datagram has been seen.
    pub fn resolve(&self) -> Option<SocketAddr> {
        self.endpoint.get().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sender_wins_with_control_port() {
        let resolver = DeviceEndpointResolver::new(9999);
        assert_eq!(resolver.resolve(), None);

        assert!(resolver.observe("192.168.1.50:40000".parse().unwrap()));
        assert!(!resolver.observe("192.168.1.51:40001".parse().unwrap()));

        assert_eq!(resolver.resolve(), Some("192.168.1.50:9999".parse().unwrap()));
    }

    #[test]
    fn keeps_ipv6_addresses() {
        let resolver = DeviceEndpointResolver::new(7);
        resolver.observe("[fe80::1]:5000".parse().unwrap());
        assert_eq!(resolver.resolve(), Some("[fe80::1]:7".parse().unwrap()));
    }
}
