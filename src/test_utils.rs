//! Test utilities shared by unit tests, integration tests and benchmarks
//!
//! Fake JPEG payloads, in-memory datagram sources, recording frame sinks and a
//! scripted control transport that plays the device's side of the command
//! protocol.

#![cfg(any(test, feature = "benchmark"))]

use std::collections::HashMap;
use std::net::SocketAddr;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::command::ControlTransport;
use crate::distributor::FrameSink;
use crate::provider::{Datagram, DatagramSource};
use crate::types::{JPEG_EOI, JPEG_SOI, VideoFrame};
use crate::{BridgeError, Result};

/// Wrap `payload` in JPEG start and end markers.
pub fn fake_jpeg(payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(payload.len() + 4);
    bytes.extend_from_slice(&JPEG_SOI);
    bytes.extend_from_slice(payload);
    bytes.extend_from_slice(&JPEG_EOI);
    bytes
}

/// A small well-formed frame with the given sequence number.
pub fn fake_frame(seq: u64) -> VideoFrame {
    VideoFrame::new(fake_jpeg(&seq.to_be_bytes()), seq)
}

/// Cut `stream` into datagrams of at most `size` bytes, as the device does.
pub fn fragments(stream: &[u8], size: usize) -> Vec<Vec<u8>> {
    stream.chunks(size.max(1)).map(<[u8]>::to_vec).collect()
}

/// [`DatagramSource`] fed from an unbounded channel.
///
/// Dropping every sender closes the source.
pub struct ChannelSource {
    rx: mpsc::UnboundedReceiver<Result<Datagram>>,
}

impl ChannelSource {
    pub fn new() -> (Self, mpsc::UnboundedSender<Result<Datagram>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx }, tx)
    }

    pub fn datagram(payload: &[u8], sender: &str) -> Datagram {
        Datagram { payload: payload.to_vec(), sender: sender.parse().expect("valid socket address") }
    }
}

#[async_trait::async_trait]
impl DatagramSource for ChannelSource {
    async fn next_datagram(&mut self) -> Result<Option<Datagram>> {
        match self.rx.recv().await {
            Some(result) => result.map(Some),
            None => Ok(None),
        }
    }
}

/// Frame sink that keeps every frame it receives.
#[derive(Default)]
pub struct RecordingSink {
    frames: Mutex<Vec<VideoFrame>>,
}

impl RecordingSink {
    pub fn frames(&self) -> Vec<VideoFrame> {
        self.frames.lock().clone()
    }

    pub fn seqs(&self) -> Vec<u64> {
        self.frames.lock().iter().map(|f| f.seq).collect()
    }
}

#[async_trait::async_trait]
impl FrameSink for RecordingSink {
    async fn send_frame(&self, frame: VideoFrame) -> Result<()> {
        self.frames.lock().push(frame);
        Ok(())
    }
}

/// Frame sink that always fails, like a viewer whose connection dropped.
pub struct FailingSink;

#[async_trait::async_trait]
impl FrameSink for FailingSink {
    async fn send_frame(&self, _frame: VideoFrame) -> Result<()> {
        Err(BridgeError::sink(0, "connection closed"))
    }
}

type Responder = Box<dyn Fn(u32, &[u8]) -> Option<Vec<u8>> + Send + Sync>;

/// Control transport that plays a scripted device.
///
/// On every send the responder is called with the attempt number for that
/// payload (starting at 1) and may return a reply, which is queued for the next
/// receive. Sends are recorded with the time they happened.
pub struct ScriptedTransport {
    responder: Responder,
    fail_sends: bool,
    sent: Mutex<Vec<(Vec<u8>, SocketAddr, Instant)>>,
    attempts: Mutex<HashMap<Vec<u8>, u32>>,
    inbox_tx: mpsc::UnboundedSender<Vec<u8>>,
    inbox_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl ScriptedTransport {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(u32, &[u8]) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            responder: Box::new(responder),
            fail_sends: false,
            sent: Mutex::new(Vec::new()),
            attempts: Mutex::new(HashMap::new()),
            inbox_tx,
            inbox_rx: tokio::sync::Mutex::new(inbox_rx),
        }
    }

    /// A device that never answers.
    pub fn silent() -> Self {
        Self::new(|_, _| None)
    }

    /// Make every send fail.
    pub fn failing_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    /// Queue an unsolicited datagram, e.g. a late acknowledgement.
    pub fn inject(&self, payload: &[u8]) {
        let _ = self.inbox_tx.send(payload.to_vec());
    }

    pub fn sent(&self) -> Vec<(Vec<u8>, SocketAddr, Instant)> {
        self.sent.lock().clone()
    }
}

#[async_trait::async_trait]
impl ControlTransport for ScriptedTransport {
    async fn send_to(&self, payload: &[u8], target: SocketAddr) -> Result<()> {
        if self.fail_sends {
            return Err(BridgeError::io("scripted send", std::io::Error::other("network down")));
        }

        self.sent.lock().push((payload.to_vec(), target, Instant::now()));
        let attempt = {
            let mut attempts = self.attempts.lock();
            let count = attempts.entry(payload.to_vec()).or_insert(0);
            *count += 1;
            *count
        };
        if let Some(reply) = (self.responder)(attempt, payload) {
            self.inject(&reply);
        }
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>> {
        let mut inbox = self.inbox_rx.lock().await;
        match inbox.recv().await {
            Some(reply) => Ok(reply),
            // The sender lives in `self`, so the inbox never closes.
            None => std::future::pending().await,
        }
    }

    fn try_recv(&self) -> Result<Option<Vec<u8>>> {
        match self.inbox_rx.try_lock() {
            Ok(mut inbox) => Ok(inbox.try_recv().ok()),
            Err(_) => Ok(None),
        }
    }
}
