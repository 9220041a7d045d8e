//! Push delivery to connected subscribers

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::Result;
use crate::types::VideoFrame;

/// Destination for pushed video frames.
///
/// Transport adapters implement this for each connected viewer. An error means
/// the sink is gone; it is removed from the [`SubscriberSet`] after the current
/// round.
#[async_trait::async_trait]
pub trait FrameSink: Send + Sync + 'static {
    async fn send_frame(&self, frame: VideoFrame) -> Result<()>;
}

/// Handle identifying one subscriber in a [`SubscriberSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The currently connected push subscribers.
///
/// Iteration works on a snapshot, so connects and disconnects during a fan-out
/// round never block or invalidate it.
#[derive(Default)]
pub struct SubscriberSet {
    next_id: AtomicU64,
    sinks: Mutex<Vec<(SubscriberId, Arc<dyn FrameSink>)>>,
}

impl fmt::Debug for SubscriberSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberSet").field("len", &self.len()).finish()
    }
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, sink: Arc<dyn FrameSink>) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.sinks.lock().push((id, sink));
        debug!(subscriber = %id, "Subscriber added");
        id
    }

    /// Returns `false` if the subscriber was already gone.
    pub fn remove(&self, id: SubscriberId) -> bool {
        let mut sinks = self.sinks.lock();
        let before = sinks.len();
        sinks.retain(|(sid, _)| *sid != id);
        let removed = sinks.len() != before;
        if removed {
            debug!(subscriber = %id, "Subscriber removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sinks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<(SubscriberId, Arc<dyn FrameSink>)> {
        self.sinks.lock().clone()
    }

    /// Deliver `frame` to every subscriber concurrently.
    ///
    /// Subscribers whose sink fails are logged and removed. Returns the number of
    /// successful deliveries.
    pub async fn fan_out(&self, frame: &VideoFrame) -> usize {
        let snapshot = self.snapshot();
        if snapshot.is_empty() {
            return 0;
        }

        let results = join_all(snapshot.iter().map(|(id, sink)| {
            let frame = frame.clone();
            async move { (*id, sink.send_frame(frame).await) }
        }))
        .await;

        let mut delivered = 0;
        for (id, result) in results {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(subscriber = %id, "Dropping subscriber: {}", e);
                    self.remove(id);
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FailingSink, RecordingSink, fake_frame};

    #[tokio::test]
    async fn delivers_to_every_subscriber() {
        let set = SubscriberSet::new();
        let a = Arc::new(RecordingSink::default());
        let b = Arc::new(RecordingSink::default());
        set.add(a.clone());
        set.add(b.clone());

        assert_eq!(set.fan_out(&fake_frame(0)).await, 2);
        assert_eq!(set.fan_out(&fake_frame(1)).await, 2);

        assert_eq!(a.seqs(), vec![0, 1]);
        assert_eq!(b.seqs(), vec![0, 1]);
    }

    #[tokio::test]
    async fn failing_subscriber_is_removed_others_continue() {
        let set = SubscriberSet::new();
        let good = Arc::new(RecordingSink::default());
        set.add(Arc::new(FailingSink));
        set.add(good.clone());

        assert_eq!(set.fan_out(&fake_frame(0)).await, 1);
        assert_eq!(set.len(), 1);

        assert_eq!(set.fan_out(&fake_frame(1)).await, 1);
        assert_eq!(good.seqs(), vec![0, 1]);
    }

    #[tokio::test]
    async fn removed_subscriber_gets_nothing() {
        let set = SubscriberSet::new();
        let sink = Arc::new(RecordingSink::default());
        let id = set.add(sink.clone());

        assert!(set.remove(id));
        assert!(!set.remove(id));
        assert!(set.is_empty());

        assert_eq!(set.fan_out(&fake_frame(0)).await, 0);
        assert!(sink.seqs().is_empty());
    }

    #[test]
    fn ids_are_unique() {
        let set = SubscriberSet::new();
        let a = set.add(Arc::new(RecordingSink::default()));
        let b = set.add(Arc::new(RecordingSink::default()));
        assert_ne!(a, b);
        assert_eq!(set.snapshot().len(), 2);
    }
}
