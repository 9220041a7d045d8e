//! Tests for the bridge engine
//!
//! These run the full task graph against an in-memory video source and a
//! scripted device on the control side.

use super::*;
use crate::BridgeError;
use crate::test_utils::{ChannelSource, RecordingSink, ScriptedTransport, fake_jpeg, fragments};
use crate::types::CommandOutcome;
use futures::StreamExt;
use tokio::sync::mpsc;

const DEVICE: &str = "192.168.50.7:34567";

fn test_config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.beacon.enabled = false;
    config
}

fn acking_device() -> Arc<ScriptedTransport> {
    Arc::new(ScriptedTransport::new(|_, payload| Some([b"ACK".as_slice(), payload].concat())))
}

fn start(
    transport: Arc<ScriptedTransport>,
) -> (Bridge, mpsc::UnboundedSender<Result<crate::provider::Datagram>>) {
    let (source, tx) = ChannelSource::new();
    let bridge = Bridge::from_parts(test_config(), source, transport, None);
    (bridge, tx)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition reached in time");
}

#[tokio::test]
async fn frames_reach_subscribers_in_order() {
    let (bridge, video) = start(acking_device());
    let sink = Arc::new(RecordingSink::default());
    bridge.add_subscriber(sink.clone());

    let stream: Vec<u8> = (0..5u8).flat_map(|i| fake_jpeg(&[i; 40])).collect();
    for chunk in fragments(&stream, 33) {
        video.send(Ok(ChannelSource::datagram(&chunk, DEVICE))).unwrap();
    }

    wait_until(|| sink.frames().len() == 5).await;
    for (i, frame) in sink.frames().iter().enumerate() {
        assert_eq!(frame.as_bytes(), fake_jpeg(&[i as u8; 40]).as_slice());
    }
    assert!(bridge.is_ready());
    assert_eq!(bridge.frames_published(), 5);

    bridge.shutdown().await;
}

#[tokio::test]
async fn device_endpoint_comes_from_first_video_sender() {
    let (bridge, video) = start(acking_device());
    assert_eq!(bridge.device_endpoint(), None);

    video.send(Ok(ChannelSource::datagram(b"\x00", DEVICE))).unwrap();
    video.send(Ok(ChannelSource::datagram(b"\x00", "192.168.50.8:1111"))).unwrap();

    wait_until(|| bridge.device_endpoint().is_some()).await;
    assert_eq!(bridge.device_endpoint(), Some("192.168.50.7:9999".parse().unwrap()));

    bridge.shutdown().await;
}

#[tokio::test]
async fn commands_are_delivered_to_learned_device() {
    let transport = acking_device();
    let (bridge, video) = start(transport.clone());
    let mut outcomes = Box::pin(bridge.commands().outcomes());

    // Before any video the device is unknown.
    bridge.submit(CommandToken::from_number(1)).unwrap();
    let report = outcomes.next().await.unwrap();
    assert_eq!(report.outcome, CommandOutcome::Unreachable);

    video.send(Ok(ChannelSource::datagram(&fake_jpeg(b"f"), DEVICE))).unwrap();
    wait_until(|| bridge.device_endpoint().is_some()).await;

    bridge.submit(CommandToken::from_number(2)).unwrap();
    let report = outcomes.next().await.unwrap();
    assert_eq!(report.token.as_str(), "2");
    assert_eq!(report.outcome, CommandOutcome::Delivered { attempts: 1 });

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, "192.168.50.7:9999".parse().unwrap());

    bridge.shutdown().await;
}

#[tokio::test]
async fn pull_consumer_gets_latest_frame() {
    let (bridge, video) = start(acking_device());

    for i in 0..3u8 {
        video.send(Ok(ChannelSource::datagram(&fake_jpeg(&[i]), DEVICE))).unwrap();
    }
    wait_until(|| bridge.frames_published() == 3).await;

    let consumer = bridge.attach_consumer().await.expect("video is ready");
    let frame = consumer.next_frame().await.expect("a frame");
    assert_eq!(frame.as_bytes(), fake_jpeg(&[2]).as_slice());

    bridge.shutdown().await;
    assert!(consumer.next_frame().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn pull_consumer_rejected_when_source_silent() {
    let (bridge, _video) = start(acking_device());

    let err = bridge.attach_consumer().await.unwrap_err();
    assert!(matches!(err, BridgeError::NotReady { waited } if waited == Duration::from_secs(15)));

    bridge.shutdown().await;
}

#[tokio::test]
async fn shutdown_returns_stats_and_closes_submission() {
    let (bridge, video) = start(acking_device());
    video.send(Ok(ChannelSource::datagram(&fake_jpeg(b"abc"), DEVICE))).unwrap();
    wait_until(|| bridge.is_ready()).await;

    let stats = bridge.shutdown().await.expect("ingestion stats");
    assert_eq!(stats.frames, 1);
    assert!(bridge.submit(CommandToken::from_number(1)).is_err());

    // Second shutdown has nothing left to wait for.
    assert!(bridge.shutdown().await.is_none());
}
