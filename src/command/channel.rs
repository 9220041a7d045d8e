//! Command delivery state machine and its worker task

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::transport::ControlTransport;
use crate::config::ControlConfig;
use crate::endpoint::DeviceEndpointResolver;
use crate::types::{CommandOutcome, CommandReport, CommandToken};
use crate::{BridgeError, Result};

/// Capacity of the outcome broadcast; slow telemetry readers skip old reports.
const REPORT_CAPACITY: usize = 64;

/// Retry parameters for command delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPolicy {
    pub ack_timeout: Duration,
    pub max_attempts: u32,
    pub ack_prefix: String,
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self::from(&ControlConfig::default())
    }
}

impl From<&ControlConfig> for CommandPolicy {
    fn from(config: &ControlConfig) -> Self {
        Self {
            ack_timeout: config.ack_timeout(),
            max_attempts: config.max_attempts.max(1),
            ack_prefix: config.ack_prefix.clone(),
        }
    }
}

/// Where a single command currently is in its delivery.
#[derive(Debug)]
enum Phase {
    DrainStale,
    Send { attempt: u32 },
    WaitAck { attempt: u32 },
    Done(CommandOutcome),
}

/// Delivers commands to the device one at a time.
///
/// Each command runs through drain, send and wait-for-ack phases, retrying up to
/// the policy's attempt limit. Replies are matched byte-for-byte against
/// `<ack_prefix><token>`.
pub struct CommandChannel {
    transport: Arc<dyn ControlTransport>,
    resolver: Arc<DeviceEndpointResolver>,
    policy: CommandPolicy,
}

impl CommandChannel {
    pub fn new(
        transport: Arc<dyn ControlTransport>,
        resolver: Arc<DeviceEndpointResolver>,
        policy: CommandPolicy,
    ) -> Self {
        Self { transport, resolver, policy }
    }

    /// Run one command to completion.
    pub async fn deliver(&self, token: &CommandToken, cancel: &CancellationToken) -> CommandOutcome {
        let expected = token.expected_ack(&self.policy.ack_prefix);
        let mut last_reply = None;
        let mut phase = Phase::DrainStale;

        loop {
            phase = match phase {
                Phase::DrainStale => {
                    let stale = self.drain_stale();
                    if stale > 0 {
                        debug!(%token, stale, "Discarded stale control datagrams");
                    }
                    Phase::Send { attempt: 1 }
                }
                Phase::Send { attempt } => {
                    let Some(target) = self.resolver.resolve() else {
                        return CommandOutcome::Unreachable;
                    };
                    debug!(%token, %target, attempt, "Sending command");
                    match self.transport.send_to(token.as_bytes(), target).await {
                        Ok(()) => Phase::WaitAck { attempt },
                        Err(e) => {
                            warn!(%token, attempt, "Command send failed: {}", e);
                            self.after_failed_attempt(attempt, &mut last_reply)
                        }
                    }
                }
                Phase::WaitAck { attempt } => {
                    let reply = tokio::select! {
                        _ = cancel.cancelled() => {
                            return CommandOutcome::Cancelled { attempts: attempt };
                        }
                        reply = tokio::time::timeout(self.policy.ack_timeout, self.transport.recv()) => reply,
                    };

                    match reply {
                        Ok(Ok(bytes)) if bytes == expected => {
                            Phase::Done(CommandOutcome::Delivered { attempts: attempt })
                        }
                        Ok(Ok(bytes)) => {
                            warn!(
                                %token,
                                attempt,
                                reply = %String::from_utf8_lossy(&bytes),
                                "Unexpected reply from device"
                            );
                            last_reply = Some(bytes);
                            self.after_failed_attempt(attempt, &mut last_reply)
                        }
                        Ok(Err(e)) => {
                            warn!(%token, attempt, "Control socket error: {}", e);
                            self.after_failed_attempt(attempt, &mut last_reply)
                        }
                        Err(_) => {
                            debug!(
                                %token,
                                attempt,
                                "No acknowledgement within {:?}",
                                self.policy.ack_timeout
                            );
                            self.after_failed_attempt(attempt, &mut last_reply)
                        }
                    }
                }
                Phase::Done(outcome) => return outcome,
            };
        }
    }

    fn after_failed_attempt(&self, attempt: u32, last_reply: &mut Option<Vec<u8>>) -> Phase {
        if attempt < self.policy.max_attempts {
            Phase::Send { attempt: attempt + 1 }
        } else {
            Phase::Done(CommandOutcome::Exhausted { attempts: attempt, last_reply: last_reply.take() })
        }
    }

    fn drain_stale(&self) -> usize {
        let mut drained = 0;
        loop {
            match self.transport.try_recv() {
                Ok(Some(_)) => drained += 1,
                Ok(None) => break,
                Err(e) => {
                    // ICMP errors from earlier sends surface here; keep draining.
                    debug!("Ignoring control socket error while draining: {}", e);
                    drained += 1;
                }
            }
            if drained >= 1024 {
                break;
            }
        }
        drained
    }

    /// Process queued commands in submission order until cancelled or every
    /// sender is dropped.
    pub async fn run(
        self,
        mut commands: mpsc::UnboundedReceiver<CommandToken>,
        reports: broadcast::Sender<CommandReport>,
        cancel: CancellationToken,
    ) {
        info!("Command channel started");
        let mut handled = 0u64;

        loop {
            let token = tokio::select! {
                _ = cancel.cancelled() => break,
                token = commands.recv() => match token {
                    Some(token) => token,
                    None => {
                        debug!("All command senders dropped");
                        break;
                    }
                },
            };

            let outcome = self.deliver(&token, &cancel).await;
            log_outcome(&token, &outcome);
            handled += 1;

            let cancelled = matches!(outcome, CommandOutcome::Cancelled { .. });
            // No telemetry subscribers is fine.
            let _ = reports.send(CommandReport { token, outcome });
            if cancelled {
                break;
            }
        }

        info!("Command channel ended ({} commands handled)", handled);
    }

    /// Spawn the worker task and return the submission handle.
    pub fn spawn(self, cancel: CancellationToken) -> (CommandSender, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (reports, _) = broadcast::channel(REPORT_CAPACITY);
        let sender = CommandSender { tx, reports: reports.clone() };
        let handle = tokio::spawn(self.run(rx, reports, cancel));
        (sender, handle)
    }
}

fn log_outcome(token: &CommandToken, outcome: &CommandOutcome) {
    match outcome {
        CommandOutcome::Delivered { attempts } => {
            info!(%token, attempts, "Command acknowledged by device");
        }
        CommandOutcome::Exhausted { attempts, last_reply } => {
            let last = last_reply.as_deref().map(String::from_utf8_lossy);
            error!(%token, attempts, last_reply = ?last, "Command delivery failed");
        }
        CommandOutcome::Unreachable => {
            warn!(%token, "Command dropped: {}", BridgeError::Unreachable);
        }
        CommandOutcome::Cancelled { attempts } => {
            debug!(%token, attempts, "Command cancelled by shutdown");
        }
    }
}

/// Cloneable handle for submitting commands.
///
/// Submission only enqueues; the outcome is reported asynchronously on
/// [`CommandSender::outcomes`].
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<CommandToken>,
    reports: broadcast::Sender<CommandReport>,
}

impl CommandSender {
    pub fn submit(&self, token: CommandToken) -> Result<()> {
        self.tx.send(token).map_err(|_| BridgeError::Shutdown)
    }

    /// Reports for commands finished after this call.
    pub fn outcomes(&self) -> impl Stream<Item = CommandReport> + Send + 'static {
        BroadcastStream::new(self.reports.subscribe()).filter_map(|report| async move { report.ok() })
    }
}
