//! Concrete [`DatagramSource`](crate::provider::DatagramSource) implementations

pub mod udp;

pub use udp::UdpVideoSource;
