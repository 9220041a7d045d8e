use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mirror_bridge::{Bridge, BridgeConfig, server};

/// mirror-bridge command line arguments
#[derive(Parser, Debug)]
#[command(name = "mirror-bridge")]
#[command(version, about = "Bridge a UDP camera/actuator device to WebSocket viewers", long_about = None)]
struct CliArgs {
    /// YAML configuration file (defaults apply when omitted)
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// UDP address for the device's video stream (overrides config)
    #[arg(long, value_name = "ADDRESS")]
    video_bind: Option<SocketAddr>,

    /// HTTP/WebSocket listen address (overrides config)
    #[arg(short = 'a', long, value_name = "ADDRESS")]
    http_bind: Option<SocketAddr>,

    /// Device control port (overrides config)
    #[arg(long, value_name = "PORT")]
    device_port: Option<u16>,

    /// Host address to announce instead of the detected one
    #[arg(long, value_name = "IP")]
    host_ip: Option<IpAddr>,

    /// Do not broadcast presence announcements
    #[arg(long)]
    no_beacon: bool,
}

impl CliArgs {
    fn load_config(&self) -> Result<BridgeConfig> {
        let mut config = match &self.config {
            Some(path) => BridgeConfig::load(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => BridgeConfig::default(),
        };

        if let Some(addr) = self.video_bind {
            config.video.bind = addr;
        }
        if let Some(addr) = self.http_bind {
            config.server.bind = addr;
        }
        if let Some(port) = self.device_port {
            config.control.device_port = port;
        }
        if let Some(ip) = self.host_ip {
            config.beacon.host_ip = Some(ip);
        }
        if self.no_beacon {
            config.beacon.enabled = false;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    info!("mirror-bridge v{}", env!("CARGO_PKG_VERSION"));

    match run(CliArgs::parse()).await {
        Ok(()) => {
            info!("mirror-bridge exited cleanly");
            Ok(())
        }
        Err(e) => {
            error!("Fatal error: {:#}", e);
            Err(e)
        }
    }
}

async fn run(args: CliArgs) -> Result<()> {
    let config = args.load_config()?;
    let http_bind = config.server.bind;

    let bridge = Arc::new(Bridge::start(config).await.context("starting bridge")?);
    if let Some(advertisement) = bridge.advertisement() {
        info!("Announcing {}", advertisement);
    }

    let mut server = tokio::spawn(server::serve(bridge.clone(), http_bind));

    let server_result = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("waiting for Ctrl-C")?;
            info!("Shutdown requested");
            None
        }
        // The server only returns early when it failed to start.
        result = &mut server => Some(result),
    };

    if let Some(stats) = bridge.shutdown().await {
        info!(
            "Reassembled {} frames from {} bytes ({} resyncs)",
            stats.frames, stats.bytes_in, stats.resyncs
        );
    }

    let result = match server_result {
        Some(result) => result,
        None => server.await,
    };
    result.context("server task panicked")?.context("http server")?;
    Ok(())
}
