//! The bridge engine: one handle owning every long-running task.
//!
//! [`Bridge::start`] binds the sockets and spawns:
//!
//! - the video ingestion task (source -> reassembler -> distributor),
//! - the broadcaster task (broadcast queue -> subscribers),
//! - the command channel worker,
//! - the presence beacon, when enabled.
//!
//! Transport adapters then plug into the handle: push viewers register a
//! [`FrameSink`] with [`Bridge::add_subscriber`], pull consumers call
//! [`Bridge::attach_consumer`], and command producers use [`Bridge::submit`].
//! Dropping the handle cancels every task; [`Bridge::shutdown`] also waits for
//! them.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::beacon::{Advertisement, PresenceBeacon};
use crate::command::{CommandChannel, CommandPolicy, CommandSender, ControlTransport, UdpControlTransport};
use crate::config::BridgeConfig;
use crate::distributor::{FrameConsumer, FrameDistributor, FrameSink, SubscriberId};
use crate::driver::{Driver, IngestTargets};
use crate::endpoint::DeviceEndpointResolver;
use crate::gate::ReadinessGate;
use crate::provider::DatagramSource;
use crate::providers::UdpVideoSource;
use crate::reassembler::{FrameReassembler, ReassemblerStats};
use crate::types::CommandToken;
use crate::Result;

#[cfg(test)]
mod tests;

#[derive(Default)]
struct Tasks {
    ingest: Option<JoinHandle<ReassemblerStats>>,
    workers: Vec<(&'static str, JoinHandle<()>)>,
}

/// Running device bridge
pub struct Bridge {
    config: BridgeConfig,
    gate: ReadinessGate,
    resolver: Arc<DeviceEndpointResolver>,
    distributor: Arc<FrameDistributor>,
    commands: CommandSender,
    advertisement: Option<Advertisement>,
    video_addr: Option<SocketAddr>,
    control_addr: Option<SocketAddr>,

    /// Cancellation token for stopping tasks
    cancel: CancellationToken,
    tasks: Mutex<Tasks>,
}

impl Bridge {
    /// Bind the video, control and beacon sockets and start every task.
    ///
    /// Only configuration and bind errors are returned; everything after
    /// startup is logged and absorbed by the owning task.
    pub async fn start(config: BridgeConfig) -> Result<Self> {
        config.validate()?;
        info!("Starting device bridge");

        let source = UdpVideoSource::bind(config.video.bind).await?;
        let video_addr = source.local_addr()?;

        let transport = UdpControlTransport::bind(config.control.bind).await?;
        let control_addr = transport.local_addr()?;

        let beacon = if config.beacon.enabled {
            Some(PresenceBeacon::bind(&config.beacon, Some(config.server.bind.port())).await?)
        } else {
            debug!("Presence beacon disabled");
            None
        };

        let mut bridge = Self::from_parts(config, source, Arc::new(transport), beacon);
        bridge.video_addr = Some(video_addr);
        bridge.control_addr = Some(control_addr);

        info!(video = %video_addr, control = %control_addr, "Device bridge running");
        Ok(bridge)
    }

    /// Start the bridge tasks on already constructed I/O endpoints.
    ///
    /// Must be called inside a tokio runtime.
    pub fn from_parts<S>(
        config: BridgeConfig,
        source: S,
        transport: Arc<dyn ControlTransport>,
        beacon: Option<PresenceBeacon>,
    ) -> Self
    where
        S: DatagramSource,
    {
        let cancel = CancellationToken::new();
        let gate = ReadinessGate::new();
        let resolver = Arc::new(DeviceEndpointResolver::new(config.control.device_port));
        let distributor =
            Arc::new(FrameDistributor::new(config.video.broadcast_depth, config.video.pull_depth));

        let mut tasks = Tasks::default();

        let targets = IngestTargets {
            reassembler: FrameReassembler::new(config.video.max_pending_bytes).with_gate(gate.clone()),
            resolver: resolver.clone(),
            distributor: distributor.clone(),
        };
        tasks.ingest = Some(Driver::spawn(source, targets, cancel.child_token()));

        tasks
            .workers
            .push(("broadcaster", tokio::spawn(distributor.clone().run_broadcaster(cancel.child_token()))));

        let channel =
            CommandChannel::new(transport, resolver.clone(), CommandPolicy::from(&config.control));
        let (commands, handle) = channel.spawn(cancel.child_token());
        tasks.workers.push(("commands", handle));

        let advertisement = beacon.map(|beacon| {
            let advertisement = beacon.advertisement().clone();
            let token = cancel.child_token();
            tasks.workers.push((
                "beacon",
                tokio::spawn(async move {
                    beacon.run(token).await;
                }),
            ));
            advertisement
        });

        Self {
            config,
            gate,
            resolver,
            distributor,
            commands,
            advertisement,
            video_addr: None,
            control_addr: None,
            cancel,
            tasks: Mutex::new(tasks),
        }
    }

    /// Queue a command for the device.
    ///
    /// Returns once the command is queued; delivery is reported on
    /// [`CommandSender::outcomes`].
    pub fn submit(&self, token: CommandToken) -> Result<()> {
        self.commands.submit(token)
    }

    pub fn commands(&self) -> &CommandSender {
        &self.commands
    }

    /// Register a push subscriber for every future frame.
    pub fn add_subscriber(&self, sink: Arc<dyn FrameSink>) -> SubscriberId {
        self.distributor.subscribers().add(sink)
    }

    pub fn remove_subscriber(&self, id: SubscriberId) -> bool {
        self.distributor.subscribers().remove(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.distributor.subscribers().len()
    }

    /// Attach a pull consumer, waiting up to the configured grace period for the
    /// first frame.
    pub async fn attach_consumer(&self) -> Result<FrameConsumer> {
        self.attach_consumer_within(self.config.video.ready_grace()).await
    }

    /// Attach a pull consumer, waiting up to `grace` for the first frame.
    ///
    /// Fails with [`BridgeError::NotReady`](crate::BridgeError::NotReady) when
    /// the video source stays silent.
    pub async fn attach_consumer_within(&self, grace: Duration) -> Result<FrameConsumer> {
        self.gate.await_ready(grace).await?;
        Ok(self.distributor.consumer(self.cancel.child_token()))
    }

    pub fn gate(&self) -> &ReadinessGate {
        &self.gate
    }

    pub fn is_ready(&self) -> bool {
        self.gate.is_ready()
    }

    /// Control address of the device, once it has sent video.
    pub fn device_endpoint(&self) -> Option<SocketAddr> {
        self.resolver.resolve()
    }

    pub fn frames_published(&self) -> u64 {
        self.distributor.published()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// What the presence beacon announces, if it runs.
    pub fn advertisement(&self) -> Option<&Advertisement> {
        self.advertisement.as_ref()
    }

    /// Local address of the video socket (set by [`Bridge::start`]).
    pub fn video_addr(&self) -> Option<SocketAddr> {
        self.video_addr
    }

    /// Local address of the control socket (set by [`Bridge::start`]).
    pub fn control_addr(&self) -> Option<SocketAddr> {
        self.control_addr
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel every task and wait for them to finish.
    ///
    /// Pending command retries are abandoned. Calling this twice is harmless.
    pub async fn shutdown(&self) -> Option<ReassemblerStats> {
        self.cancel.cancel();
        let Tasks { ingest, workers } = std::mem::take(&mut *self.tasks.lock());

        let results = join_all(workers.into_iter().map(|(name, handle)| async move {
            (name, handle.await)
        }))
        .await;
        for (name, result) in results {
            if let Err(e) = result {
                warn!("{} task failed: {}", name, e);
            }
        }

        let stats = match ingest {
            Some(handle) => match handle.await {
                Ok(stats) => Some(stats),
                Err(e) => {
                    warn!("Ingestion task failed: {}", e);
                    None
                }
            },
            None => None,
        };

        info!("Device bridge stopped");
        stats
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        debug!("Dropping device bridge");
        // Cancel tasks on drop for clean shutdown
        self.cancel.cancel();
    }
}
