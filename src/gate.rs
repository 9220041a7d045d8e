//! One-shot readiness signal for the video source

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

use crate::{BridgeError, Result};

/// Flips to ready once the first frame has been reassembled and never flips back.
///
/// Consumers that need video (pull consumers, snapshot requests) wait on the gate
/// so they never attach to an empty stream. Cloning shares the same flag.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }

    /// Mark the gate as ready.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn mark_ready(&self) -> bool {
        self.tx.send_if_modified(|ready| {
            if *ready {
                false
            } else {
                *ready = true;
                true
            }
        })
    }

    /// Wait until the gate is ready, with no upper bound.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    /// Wait up to `timeout` for the gate.
    ///
    /// A timeout is a rejection ([`BridgeError::NotReady`]), which connection
    /// handlers translate into "service unavailable".
    pub async fn await_ready(&self, timeout: Duration) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }
        debug!("Waiting up to {:?} for the video source", timeout);
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| BridgeError::NotReady { waited: timeout })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_happens_once() {
        let gate = ReadinessGate::new();
        assert!(!gate.is_ready());
        assert!(gate.mark_ready());
        assert!(!gate.mark_ready());
        assert!(gate.is_ready());
        assert!(gate.clone().is_ready());
    }

    #[tokio::test]
    async fn ready_gate_returns_immediately() {
        let gate = ReadinessGate::new();
        gate.mark_ready();
        gate.await_ready(Duration::ZERO).await.expect("already ready");
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_with_not_ready() {
        let gate = ReadinessGate::new();
        let start = tokio::time::Instant::now();
        let err = gate.await_ready(Duration::from_secs(15)).await.unwrap_err();

        assert!(matches!(err, BridgeError::NotReady { waited } if waited == Duration::from_secs(15)));
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn waiters_wake_when_marked() {
        let gate = ReadinessGate::new();
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.await_ready(Duration::from_secs(15)).await })
        };

        tokio::time::sleep(Duration::from_secs(3)).await;
        gate.mark_ready();

        waiter.await.unwrap().expect("waiter released by mark_ready");
    }
}
