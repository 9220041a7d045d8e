//! Frame distribution to push subscribers and pull consumers.
//!
//! Every reassembled frame lands in two bounded drop-oldest queues:
//!
//! - the **broadcast** queue, drained by a dedicated broadcaster task that fans
//!   each frame out to the [`SubscriberSet`];
//! - the **pull** queue, read on demand by [`FrameConsumer`]s.
//!
//! [`FrameDistributor::publish`] only touches the queues, so a slow subscriber
//! can never stall reassembly; it only loses old frames.

mod fanout;
mod queue;

pub use fanout::{FrameSink, SubscriberId, SubscriberSet};
pub use queue::FrameQueue;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::types::VideoFrame;

#[derive(Debug)]
pub struct FrameDistributor {
    broadcast: FrameQueue,
    pull: FrameQueue,
    subscribers: Arc<SubscriberSet>,
    published: AtomicU64,
}

impl FrameDistributor {
    pub fn new(broadcast_depth: usize, pull_depth: usize) -> Self {
        Self {
            broadcast: FrameQueue::new(broadcast_depth),
            pull: FrameQueue::new(pull_depth),
            subscribers: Arc::new(SubscriberSet::new()),
            published: AtomicU64::new(0),
        }
    }

    /// Queue a frame for both paths. Never blocks.
    pub fn publish(&self, frame: VideoFrame) {
        self.published.fetch_add(1, Ordering::Relaxed);
        self.pull.publish(frame.clone());
        self.broadcast.publish(frame);
    }

    /// Wait for the next frame on the pull path.
    pub async fn consume(&self) -> VideoFrame {
        self.pull.consume().await
    }

    pub fn subscribers(&self) -> &Arc<SubscriberSet> {
        &self.subscribers
    }

    pub fn broadcast_queue(&self) -> &FrameQueue {
        &self.broadcast
    }

    pub fn pull_queue(&self) -> &FrameQueue {
        &self.pull
    }

    /// Frames published since startup.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Attach a pull consumer that stops when `cancel` fires.
    pub fn consumer(self: &Arc<Self>, cancel: CancellationToken) -> FrameConsumer {
        FrameConsumer { distributor: Arc::clone(self), cancel }
    }

    /// Drain the broadcast queue into the subscriber set until cancelled.
    pub async fn run_broadcaster(self: Arc<Self>, cancel: CancellationToken) {
        info!("Broadcaster task started");
        let mut rounds = 0u64;

        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => break,
                frame = self.broadcast.consume() => frame,
            };

            let delivered = self.subscribers.fan_out(&frame).await;
            rounds += 1;
            if delivered > 0 {
                debug!(seq = frame.seq, delivered, "Frame broadcast");
            }
        }

        info!(
            "Broadcaster task ended ({} frames, {} dropped by queue)",
            rounds,
            self.broadcast.dropped()
        );
    }
}

/// Pull-side reader of the distributor.
///
/// Each call to [`FrameConsumer::next_frame`] takes the freshest queued frame.
/// Consumers share the pull queue; with the default depth of one, a slow consumer
/// always gets the newest frame rather than a backlog.
#[derive(Debug, Clone)]
pub struct FrameConsumer {
    distributor: Arc<FrameDistributor>,
    cancel: CancellationToken,
}

impl FrameConsumer {
    /// Next frame, or `None` once the bridge shuts down.
    pub async fn next_frame(&self) -> Option<VideoFrame> {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            frame = self.distributor.consume() => Some(frame),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{RecordingSink, fake_frame};
    use std::time::Duration;

    #[test]
    fn publish_fills_both_queues() {
        let distributor = FrameDistributor::new(10, 1);
        for seq in 0..11 {
            distributor.publish(fake_frame(seq));
        }

        assert_eq!(distributor.published(), 11);
        assert_eq!(distributor.broadcast_queue().len(), 10);
        assert_eq!(distributor.pull_queue().len(), 1);
        assert_eq!(distributor.pull_queue().try_consume().map(|f| f.seq), Some(10));
        assert_eq!(distributor.broadcast_queue().try_consume().map(|f| f.seq), Some(1));
    }

    #[tokio::test]
    async fn broadcaster_pushes_to_subscribers() {
        let distributor = Arc::new(FrameDistributor::new(10, 1));
        let sink = Arc::new(RecordingSink::default());
        distributor.subscribers().add(sink.clone());

        let cancel = CancellationToken::new();
        let task = tokio::spawn(distributor.clone().run_broadcaster(cancel.clone()));

        for seq in 0..3 {
            distributor.publish(fake_frame(seq));
        }

        tokio::time::timeout(Duration::from_secs(2), async {
            while sink.seqs().len() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("frames broadcast");
        assert_eq!(sink.seqs(), vec![0, 1, 2]);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn consumer_stops_on_cancel() {
        let distributor = Arc::new(FrameDistributor::new(10, 1));
        let cancel = CancellationToken::new();
        let consumer = distributor.consumer(cancel.clone());

        distributor.publish(fake_frame(4));
        assert_eq!(consumer.next_frame().await.map(|f| f.seq), Some(4));

        cancel.cancel();
        assert!(consumer.next_frame().await.is_none());
    }
}
