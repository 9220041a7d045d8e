//! Driver spawns and manages the video ingestion task

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace};

use crate::distributor::FrameDistributor;
use crate::endpoint::DeviceEndpointResolver;
use crate::provider::DatagramSource;
use crate::reassembler::{FrameReassembler, ReassemblerStats};

/// How often throughput is logged while frames are flowing.
const STATS_INTERVAL: Duration = Duration::from_secs(30);

/// Everything the ingestion task writes to.
pub struct IngestTargets {
    pub reassembler: FrameReassembler,
    pub resolver: Arc<DeviceEndpointResolver>,
    pub distributor: Arc<FrameDistributor>,
}

/// Driver spawns the task that turns datagrams into published frames
///
/// The task owns the source and the reassembler, so reassembly is single-writer
/// by construction. It is the only producer for the distributor.
pub struct Driver;

impl Driver {
    /// Spawn the ingestion task for the given source
    ///
    /// The task ends when `cancel` fires or the source closes, and returns the
    /// final reassembler statistics.
    pub fn spawn<S>(source: S, targets: IngestTargets, cancel: CancellationToken) -> JoinHandle<ReassemblerStats>
    where
        S: DatagramSource,
    {
        tokio::spawn(Self::ingest_task(source, targets, cancel))
    }

    async fn ingest_task<S>(mut source: S, targets: IngestTargets, cancel: CancellationToken) -> ReassemblerStats
    where
        S: DatagramSource,
    {
        info!("Video ingestion task started");
        let IngestTargets { mut reassembler, resolver, distributor } = targets;
        let mut datagrams = 0u64;
        let mut error_count = 0u32;
        let mut last_report = Instant::now();
        let mut frames_at_report = 0u64;

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Video ingestion cancelled");
                    break;
                }
                result = source.next_datagram() => result,
            };

            match result {
                Ok(Some(datagram)) => {
                    datagrams += 1;
                    error_count = 0;
                    trace!(len = datagram.payload.len(), sender = %datagram.sender, "Video datagram");

                    resolver.observe(datagram.sender);
                    for frame in reassembler.ingest(&datagram.payload) {
                        trace!(seq = frame.seq, bytes = frame.len(), "Frame reassembled");
                        distributor.publish(frame);
                    }

                    if last_report.elapsed() >= STATS_INTERVAL {
                        let stats = reassembler.stats();
                        let fps = (stats.frames - frames_at_report) as f64
                            / last_report.elapsed().as_secs_f64();
                        info!(
                            frames = stats.frames,
                            bytes_in = stats.bytes_in,
                            resyncs = stats.resyncs,
                            subscribers = distributor.subscribers().len(),
                            "Video throughput {:.1} fps",
                            fps
                        );
                        frames_at_report = stats.frames;
                        last_report = Instant::now();
                    }
                }
                Ok(None) => {
                    info!("Video source closed after {} datagrams", datagrams);
                    break;
                }
                Err(e) => {
                    // Transient socket failures never stop ingestion.
                    error_count += 1;
                    error!("Video source error ({} in a row): {}", error_count, e);

                    // Exponential backoff: 100ms, 200ms, ... capped at 1.6s
                    let backoff = Duration::from_millis(50 * (1 << error_count.min(5)));
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }

        let stats = reassembler.stats();
        info!(
            "Video ingestion task ended ({} datagrams, {} frames, {} resyncs)",
            datagrams, stats.frames, stats.resyncs
        );
        stats
    }
}
