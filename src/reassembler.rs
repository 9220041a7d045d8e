//! JPEG frame reassembly from a continuous UDP byte stream.
//!
//! The device splits each JPEG image across as many datagrams as it needs and
//! adds no framing of its own: the JPEG start-of-image (`FF D8`) and
//! end-of-image (`FF D9`) markers are the only delimiters. [`FrameReassembler`]
//! accumulates datagrams and cuts every complete `FF D8 .. FF D9` span out of the
//! accumulated bytes.
//!
//! ## Buffer invariant
//!
//! After each [`FrameReassembler::ingest`] call the buffer holds no complete frame;
//! at most one trailing partial frame (plus whatever preceded its start marker)
//! remains for the next datagram.
//!
//! ## Pending-bytes cap
//!
//! A start marker whose end marker never arrives would otherwise grow the buffer
//! forever. Once the buffer exceeds `max_pending_bytes` it resynchronizes on the
//! most recent start marker, or drops everything if that alone is still too large.

use tracing::{info, warn};

use crate::gate::ReadinessGate;
use crate::types::{JPEG_EOI, JPEG_SOI, VideoFrame};

/// Counters describing what the reassembler has seen so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblerStats {
    /// Complete frames emitted
    pub frames: u64,
    /// Datagram bytes ingested
    pub bytes_in: u64,
    /// Times the pending-bytes cap forced a resynchronization
    pub resyncs: u64,
}

/// Extracts complete JPEG frames from fragmented datagrams.
#[derive(Debug)]
pub struct FrameReassembler {
    buffer: Vec<u8>,

    /// Bytes before this offset hold no end marker for the current pending frame.
    eoi_scanned: usize,

    max_pending_bytes: usize,
    next_seq: u64,
    gate: Option<ReadinessGate>,
    stats: ReassemblerStats,
}

impl FrameReassembler {
    pub fn new(max_pending_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            eoi_scanned: 0,
            max_pending_bytes: max_pending_bytes.max(JPEG_SOI.len() + JPEG_EOI.len()),
            next_seq: 0,
            gate: None,
            stats: ReassemblerStats::default(),
        }
    }

    /// Open `gate` when the first frame comes out.
    pub fn with_gate(mut self, gate: ReadinessGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Append a datagram and return every frame it completed, in stream order.
    pub fn ingest(&mut self, datagram: &[u8]) -> Vec<VideoFrame> {
        self.buffer.extend_from_slice(datagram);
        self.stats.bytes_in += datagram.len() as u64;

        let mut frames = Vec::new();
        let mut consumed = 0;

        loop {
            let pending = &self.buffer[consumed..];
            let Some(start) = find_marker(pending, &JPEG_SOI) else {
                break;
            };

            let search_from = (start + JPEG_SOI.len()).max(self.eoi_scanned.saturating_sub(consumed));
            let Some(end_rel) = find_marker(&pending[search_from..], &JPEG_EOI) else {
                // A marker may straddle the current tail, so rescan the last byte next time.
                self.eoi_scanned = consumed + pending.len().saturating_sub(1);
                break;
            };

            let end = search_from + end_rel + JPEG_EOI.len();
            frames.push(VideoFrame::from_slice(&pending[start..end], self.next_seq));
            self.next_seq += 1;
            consumed += end;
            self.eoi_scanned = consumed;
        }

        if consumed > 0 {
            self.buffer.drain(..consumed);
            self.eoi_scanned -= consumed;
        }

        if self.buffer.len() > self.max_pending_bytes {
            self.resync();
        }

        if !frames.is_empty() {
            self.stats.frames += frames.len() as u64;
            if let Some(gate) = &self.gate {
                if gate.mark_ready() {
                    info!(bytes = frames[0].len(), "First frame reassembled, video source ready");
                }
            }
        }

        frames
    }

    /// Bytes currently waiting for the rest of a frame.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> ReassemblerStats {
        self.stats
    }

    fn resync(&mut self) {
        let before = self.buffer.len();
        let keep_from = match rfind_marker(&self.buffer, &JPEG_SOI) {
            Some(pos) if before - pos <= self.max_pending_bytes => pos,
            // Keep a trailing 0xFF: it may be the first half of the next start marker.
            _ => before - usize::from(self.buffer.last() == Some(&0xFF)),
        };

        self.buffer.drain(..keep_from);
        self.eoi_scanned = 0;
        self.stats.resyncs += 1;

        warn!(
            dropped = keep_from,
            kept = self.buffer.len(),
            limit = self.max_pending_bytes,
            resyncs = self.stats.resyncs,
            "Pending frame exceeded buffer limit, resynchronizing"
        );
    }
}

fn find_marker(haystack: &[u8], marker: &[u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == marker)
}

fn rfind_marker(haystack: &[u8], marker: &[u8; 2]) -> Option<usize> {
    haystack.windows(2).rposition(|w| w == marker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fake_jpeg;

    const LIMIT: usize = 1024 * 1024;

    #[test]
    fn frame_split_mid_frame_keeps_trailing_bytes() {
        let mut r = FrameReassembler::new(LIMIT);

        assert!(r.ingest(&[0x10, 0x20, 0xFF, 0xD8, b'A']).is_empty());
        let frames = r.ingest(&[b'A', b'A', 0xFF, 0xD9, 0x01, 0x02]);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_bytes(), &[0xFF, 0xD8, b'A', b'A', b'A', 0xFF, 0xD9]);
        assert_eq!(r.pending_bytes(), 2);
    }

    #[test]
    fn two_back_to_back_frames_in_one_datagram() {
        let mut r = FrameReassembler::new(LIMIT);
        let first = fake_jpeg(b"first");
        let second = fake_jpeg(b"second");
        let datagram = [first.clone(), second.clone()].concat();

        let frames = r.ingest(&datagram);

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_bytes(), first.as_slice());
        assert_eq!(frames[1].as_bytes(), second.as_slice());
        assert_eq!((frames[0].seq, frames[1].seq), (0, 1));
        assert_eq!(r.pending_bytes(), 0);
    }

    #[test]
    fn markers_split_across_datagrams() {
        let mut r = FrameReassembler::new(LIMIT);
        assert!(r.ingest(&[0xFF]).is_empty());
        assert!(r.ingest(&[0xD8, b'x', 0xFF]).is_empty());
        let frames = r.ingest(&[0xD9]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_bytes(), &[0xFF, 0xD8, b'x', 0xFF, 0xD9]);
    }

    #[test]
    fn end_marker_is_searched_after_start_marker() {
        let mut r = FrameReassembler::new(LIMIT);
        // An end marker before the start marker is just garbage.
        let frames = r.ingest(&[0xFF, 0xD9, 0xFF, 0xD8, 0xFF, 0xD9]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_bytes(), &[0xFF, 0xD8, 0xFF, 0xD9]);
    }

    #[test]
    fn bytes_without_start_marker_are_kept() {
        let mut r = FrameReassembler::new(LIMIT);
        assert!(r.ingest(b"no markers here").is_empty());
        assert_eq!(r.pending_bytes(), 15);
    }

    #[test]
    fn open_frame_waits_for_more_data() {
        let mut r = FrameReassembler::new(LIMIT);
        let frame = fake_jpeg(&[0xAB; 300]);
        let (head, tail) = frame.split_at(150);

        for chunk in head.chunks(10) {
            assert!(r.ingest(chunk).is_empty());
        }
        assert_eq!(r.pending_bytes(), 150);

        let frames = r.ingest(tail);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_bytes(), frame.as_slice());
    }

    #[test]
    fn gate_opens_on_first_frame_only() {
        let gate = ReadinessGate::new();
        let mut r = FrameReassembler::new(LIMIT).with_gate(gate.clone());

        r.ingest(&[0xFF, 0xD8, 1, 2]);
        assert!(!gate.is_ready());

        r.ingest(&[0xFF, 0xD9]);
        assert!(gate.is_ready());

        for _ in 0..5 {
            r.ingest(&fake_jpeg(b"more"));
            assert!(gate.is_ready());
        }
        assert_eq!(r.stats().frames, 6);
    }

    #[test]
    fn oversized_partial_frame_is_dropped() {
        let mut r = FrameReassembler::new(64);
        r.ingest(&[0xFF, 0xD8]);
        r.ingest(&[0x00; 100]);

        assert_eq!(r.pending_bytes(), 0);
        assert_eq!(r.stats().resyncs, 1);

        // The stream recovers on the next well-formed frame.
        let frame = fake_jpeg(b"ok");
        assert_eq!(r.ingest(&frame).len(), 1);
    }

    #[test]
    fn resync_keeps_latest_start_marker() {
        let mut r = FrameReassembler::new(64);
        let mut junk = vec![0xFF, 0xD8];
        junk.extend_from_slice(&[0x11; 70]);
        junk.extend_from_slice(&[0xFF, 0xD8, b'n', b'e', b'w']);

        assert!(r.ingest(&junk).is_empty());
        assert_eq!(r.pending_bytes(), 5);

        let frames = r.ingest(&[0xFF, 0xD9]);
        assert_eq!(frames[0].as_bytes(), &[0xFF, 0xD8, b'n', b'e', b'w', 0xFF, 0xD9]);
    }

    #[test]
    fn resync_keeps_trailing_marker_byte() {
        let mut r = FrameReassembler::new(8);
        let mut junk = vec![0x00; 20];
        junk.push(0xFF);
        r.ingest(&junk);
        assert_eq!(r.pending_bytes(), 1);

        let frames = r.ingest(&[0xD8, 0x42, 0xFF, 0xD9]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_bytes(), &[0xFF, 0xD8, 0x42, 0xFF, 0xD9]);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        /// Frame payloads that never contain an end marker, so each frame is well-formed.
        fn payload() -> impl Strategy<Value = Vec<u8>> {
            prop::collection::vec(any::<u8>(), 0..200).prop_map(|mut bytes| {
                for i in 1..bytes.len() {
                    if bytes[i - 1] == 0xFF && bytes[i] == 0xD9 {
                        bytes[i] = 0x00;
                    }
                }
                if bytes.last() == Some(&0xFF) {
                    bytes.pop();
                }
                bytes
            })
        }

        proptest! {
            #[test]
            fn extraction_is_lossless_and_ordered(
                payloads in prop::collection::vec(payload(), 1..12),
                cuts in prop::collection::vec(1usize..300, 1..40)
            ) {
                let frames: Vec<Vec<u8>> = payloads.iter().map(|p| fake_jpeg(p)).collect();
                let stream = frames.concat();

                let mut r = FrameReassembler::new(LIMIT);
                let mut emitted = Vec::new();
                let mut offset = 0;
                for cut in cuts.iter().cycle() {
                    if offset >= stream.len() {
                        break;
                    }
                    let end = (offset + cut).min(stream.len());
                    emitted.extend(r.ingest(&stream[offset..end]));
                    offset = end;
                }

                prop_assert_eq!(emitted.len(), frames.len());
                for (i, (got, want)) in emitted.iter().zip(&frames).enumerate() {
                    prop_assert!(got.is_delimited());
                    prop_assert_eq!(got.as_bytes(), want.as_slice());
                    prop_assert_eq!(got.seq, i as u64);
                }
                prop_assert_eq!(r.pending_bytes(), 0);
            }

            #[test]
            fn arbitrary_bytes_never_panic_and_respect_the_cap(
                chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..64)
            ) {
                let mut r = FrameReassembler::new(128);
                for chunk in &chunks {
                    for frame in r.ingest(chunk) {
                        prop_assert!(frame.is_delimited());
                    }
                    prop_assert!(r.pending_bytes() <= 128);
                }
            }
        }
    }
}
