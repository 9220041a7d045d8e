//! Video frame type shared by every consumer

use std::sync::Arc;

/// JPEG start-of-image marker.
pub const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// JPEG end-of-image marker.
pub const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// One complete encoded image, `FF D8 .. FF D9` inclusive.
///
/// This is the unit that flows from the reassembler to every consumer.
/// Cloning is cheap: the bytes are shared through an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    /// Encoded image bytes (zero-copy via Arc)
    pub data: Arc<[u8]>,

    /// Position of this frame in the reassembled stream, starting at 0
    pub seq: u64,
}

impl VideoFrame {
    /// Create a new frame
    pub fn new(data: Vec<u8>, seq: u64) -> Self {
        Self { data: data.into(), seq }
    }

    /// Create a frame by copying `data` once into shared storage
    pub fn from_slice(data: &[u8], seq: u64) -> Self {
        Self { data: Arc::from(data), seq }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Whether the bytes are bounded by the JPEG start and end markers.
    pub fn is_delimited(&self) -> bool {
        self.data.len() >= 4 && self.data.starts_with(&JPEG_SOI) && self.data.ends_with(&JPEG_EOI)
    }
}
