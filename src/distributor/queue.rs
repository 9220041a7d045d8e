//! Bounded drop-oldest frame queue

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::trace;

use crate::types::VideoFrame;

/// FIFO of at most `capacity` frames.
///
/// Publishing into a full queue evicts the oldest frame instead of waiting, so
/// the producer never blocks on a slow consumer. Consumers only ever see the most
/// recent frames.
#[derive(Debug)]
pub struct FrameQueue {
    frames: Mutex<VecDeque<VideoFrame>>,
    capacity: usize,
    available: Notify,
    dropped: AtomicU64,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            available: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Insert a frame, returning the evicted frame if the queue was full.
    pub fn publish(&self, frame: VideoFrame) -> Option<VideoFrame> {
        let evicted = {
            let mut frames = self.frames.lock();
            let evicted =
                if frames.len() >= self.capacity { frames.pop_front() } else { None };
            frames.push_back(frame);
            evicted
        };

        if let Some(old) = &evicted {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            trace!(seq = old.seq, "Queue full, dropped oldest frame");
        }
        self.available.notify_one();
        evicted
    }

    /// Take the oldest queued frame without waiting.
    pub fn try_consume(&self) -> Option<VideoFrame> {
        self.frames.lock().pop_front()
    }

    /// Wait for the next frame.
    ///
    /// Cancel-safe: dropping the future never loses a frame.
    pub async fn consume(&self) -> VideoFrame {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(frame) = self.try_consume() {
                return frame;
            }
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames evicted because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn frame(seq: u64) -> VideoFrame {
        VideoFrame::new(vec![0xFF, 0xD8, seq as u8, 0xFF, 0xD9], seq)
    }

    #[test]
    fn overflow_keeps_most_recent() {
        let queue = FrameQueue::new(10);
        for seq in 0..11 {
            queue.publish(frame(seq));
        }

        assert_eq!(queue.len(), 10);
        assert_eq!(queue.dropped(), 1);
        let seqs: Vec<u64> = std::iter::from_fn(|| queue.try_consume()).map(|f| f.seq).collect();
        assert_eq!(seqs, (1..11).collect::<Vec<_>>());
    }

    #[test]
    fn capacity_one_holds_latest() {
        let queue = FrameQueue::new(1);
        assert!(queue.publish(frame(0)).is_none());
        assert_eq!(queue.publish(frame(1)).map(|f| f.seq), Some(0));
        assert_eq!(queue.publish(frame(2)).map(|f| f.seq), Some(1));
        assert_eq!(queue.try_consume().map(|f| f.seq), Some(2));
        assert!(queue.is_empty());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        assert_eq!(FrameQueue::new(0).capacity(), 1);
    }

    #[tokio::test]
    async fn consume_waits_for_publish() {
        let queue = std::sync::Arc::new(FrameQueue::new(1));
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.consume().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        queue.publish(frame(5));
        let got = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("consumer woke up")
            .unwrap();
        assert_eq!(got.seq, 5);
    }

    #[tokio::test]
    async fn consume_returns_queued_frame_immediately() {
        let queue = FrameQueue::new(3);
        queue.publish(frame(1));
        queue.publish(frame(2));
        assert_eq!(queue.consume().await.seq, 1);
        assert_eq!(queue.consume().await.seq, 2);
    }
}
