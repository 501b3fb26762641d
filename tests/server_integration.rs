// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/cid-relay

//! Integration tests over real loopback TCP.
//!
//! Each test starts a device server on a free port and talks to it as an
//! alarm device would; relay tests add a fake upstream receiver.

use cid_relay::admission::{AdmissionConfig, UnsolicitedDevicePolicy};
use cid_relay::core::HistoryConfig;
use cid_relay::protocol::{CidRules, ACK, NACK};
use cid_relay::relay::{RelayConfig, UpstreamClient};
use cid_relay::server::ServerConfig;
use cid_relay::{DeliveryQueue, DeviceServer, LogBuffer, QueryFacade, RelayHandle, ServerCore};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::{timeout, Duration};

const FRAME: &[u8] = b"5040 182109E60300000\x14";
const REWRITTEN: &str = "5040 184209E60200000";

struct Harness {
    addr: SocketAddr,
    query: QueryFacade,
    core: Arc<ServerCore>,
    shutdown: broadcast::Sender<()>,
}

async fn start(admission: AdmissionConfig, relay: Option<RelayHandle>) -> Harness {
    let core = ServerCore::new(&HistoryConfig::default(), admission);
    let config = ServerConfig {
        bind_address: "127.0.0.1".to_string(),
        port: 0,
        max_frame_len: 64,
    };
    let server = DeviceServer::bind(&config, CidRules::default(), core.clone(), relay.clone())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();

    let (shutdown, rx) = broadcast::channel(1);
    tokio::spawn(server.run(rx));

    Harness {
        addr,
        query: QueryFacade::new(core.clone(), LogBuffer::new(10), relay),
        core,
        shutdown,
    }
}

async fn send_frame(stream: &mut TcpStream, frame: &[u8]) -> u8 {
    stream.write_all(frame).await.unwrap();
    let mut reply = [0u8; 1];
    timeout(Duration::from_secs(5), stream.read_exact(&mut reply))
        .await
        .expect("reply in time")
        .unwrap();
    reply[0]
}

/// Wait until the peer closes the socket
async fn expect_closed(stream: &mut TcpStream) {
    let mut buf = [0u8; 8];
    let n = timeout(Duration::from_secs(5), stream.read(&mut buf))
        .await
        .expect("close in time")
        .unwrap_or(0);
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_local_ack_records_event() {
    let h = start(AdmissionConfig::default(), None).await;
    let mut device = TcpStream::connect(h.addr).await.unwrap();

    assert_eq!(send_frame(&mut device, FRAME).await, ACK);

    let devices = h.query.get_devices();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].id, 4209);
    assert_eq!(devices[0].last_event, REWRITTEN);

    let global = h.query.get_global_events();
    assert_eq!(global.len(), 1);
    assert_eq!(global[0].device_id, 4209);
    assert_eq!(h.query.get_stats().accepted, 1);
}

#[tokio::test]
async fn test_invalid_frame_nack_keeps_session() {
    let h = start(AdmissionConfig::default(), None).await;
    let mut device = TcpStream::connect(h.addr).await.unwrap();

    assert_eq!(send_frame(&mut device, b"1040 182109E60300000\x14").await, NACK);
    assert_eq!(send_frame(&mut device, b"5040 18XXXXE60300000\x14").await, NACK);
    assert_eq!(send_frame(&mut device, FRAME).await, ACK);

    assert_eq!(h.query.get_device_events(4209).len(), 1);
    assert_eq!(h.query.get_stats().rejected, 0);
}

#[tokio::test]
async fn test_partial_frame_nack_and_close() {
    let h = start(AdmissionConfig::default(), None).await;
    let mut device = TcpStream::connect(h.addr).await.unwrap();

    device.write_all(b"5040 1821").await.unwrap();
    device.shutdown().await.unwrap();

    let mut reply = Vec::new();
    timeout(Duration::from_secs(5), device.read_to_end(&mut reply))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply, vec![NACK]);
    assert!(h.query.get_devices().is_empty());
}

#[tokio::test]
async fn test_oversized_frame_closes_session() {
    let h = start(AdmissionConfig::default(), None).await;
    let mut device = TcpStream::connect(h.addr).await.unwrap();

    device.write_all(&[b'5'; 64]).await.unwrap();
    let mut reply = [0u8; 1];
    device.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[0], NACK);
    expect_closed(&mut device).await;
}

#[tokio::test]
async fn test_rejected_session_is_closed() {
    let h = start(
        AdmissionConfig {
            max_device_id: 4000,
            ..Default::default()
        },
        None,
    )
    .await;
    let mut device = TcpStream::connect(h.addr).await.unwrap();

    // 2109 is rewritten to 4209, outside the allowed range
    assert_eq!(send_frame(&mut device, FRAME).await, NACK);
    expect_closed(&mut device).await;

    let stats = h.query.get_stats();
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.accepted, 0);
    assert!(h.query.get_devices().is_empty());
}

#[tokio::test]
async fn test_reconnect_counted_and_lease_released() {
    let h = start(AdmissionConfig::default(), None).await;

    {
        let mut device = TcpStream::connect(h.addr).await.unwrap();
        assert_eq!(send_frame(&mut device, FRAME).await, ACK);
    }

    // The first session ends asynchronously after the socket drops
    for _ in 0..50 {
        if h.core.active_sessions() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(h.core.active_sessions(), 0);

    let mut device = TcpStream::connect(h.addr).await.unwrap();
    assert_eq!(send_frame(&mut device, FRAME).await, ACK);

    let stats = h.query.get_stats();
    assert_eq!(stats.accepted, 2);
    assert_eq!(stats.reconnects, 1);
    assert_eq!(h.query.get_device_events(4209).len(), 2);
}

#[tokio::test]
async fn test_duplicate_session_rejected() {
    let h = start(
        AdmissionConfig {
            reject_duplicate_sessions: true,
            ..Default::default()
        },
        None,
    )
    .await;

    let mut first = TcpStream::connect(h.addr).await.unwrap();
    assert_eq!(send_frame(&mut first, FRAME).await, ACK);

    let mut second = TcpStream::connect(h.addr).await.unwrap();
    assert_eq!(send_frame(&mut second, FRAME).await, NACK);

    assert_eq!(send_frame(&mut first, FRAME).await, ACK);
    let stats = h.query.get_stats();
    assert_eq!((stats.accepted, stats.rejected), (1, 1));
}

async fn fake_upstream(answer: u8) -> (u16, tokio::task::JoinHandle<Vec<Vec<u8>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let task = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    received.push(buf[..n].to_vec());
                    if socket.write_all(&[answer]).await.is_err() {
                        break;
                    }
                }
            }
        }
        received
    });
    (port, task)
}

fn relay_config(port: u16) -> RelayConfig {
    RelayConfig {
        port,
        reply_timeout_secs: 2,
        reconnect_initial_ms: 10,
        reconnect_max_ms: 50,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_relay_forwards_rewritten_frame() {
    let (port, upstream) = fake_upstream(ACK).await;
    let config = relay_config(port);
    let (handle, queue) = DeliveryQueue::channel(config.buffer_size, config.reply_timeout());
    let h = start(AdmissionConfig::default(), Some(handle)).await;
    let client = tokio::spawn(UpstreamClient::new(config, queue).run(h.shutdown.subscribe()));

    let mut device = TcpStream::connect(h.addr).await.unwrap();
    assert_eq!(send_frame(&mut device, FRAME).await, ACK);

    let relay = h.query.get_relay_stats().unwrap();
    assert_eq!(relay.delivered, 1);
    assert_eq!(h.query.get_device_events(4209)[0].data, REWRITTEN);

    h.shutdown.send(()).unwrap();
    client.await.unwrap().unwrap();
    let received = upstream.await.unwrap();
    assert_eq!(received.concat(), b"5040 184209E60200000\x14".to_vec());
}

#[tokio::test]
async fn test_upstream_nack_is_passed_to_device() {
    let (port, _upstream) = fake_upstream(NACK).await;
    let config = relay_config(port);
    let (handle, queue) = DeliveryQueue::channel(config.buffer_size, config.reply_timeout());
    let h = start(AdmissionConfig::default(), Some(handle)).await;
    tokio::spawn(UpstreamClient::new(config, queue).run(h.shutdown.subscribe()));

    let mut device = TcpStream::connect(h.addr).await.unwrap();
    assert_eq!(send_frame(&mut device, FRAME).await, NACK);

    // Recorded even though upstream refused it
    assert_eq!(h.query.get_device_events(4209).len(), 1);
    assert_eq!(h.query.get_relay_stats().unwrap().refused, 1);
}

#[tokio::test]
async fn test_refused_unsolicited_event_is_not_relayed() {
    let (port, upstream) = fake_upstream(ACK).await;
    let config = relay_config(port);
    let (handle, queue) = DeliveryQueue::channel(config.buffer_size, config.reply_timeout());
    let admission = AdmissionConfig {
        unsolicited_devices: UnsolicitedDevicePolicy::Reject,
        ..Default::default()
    };
    let h = start(admission, Some(handle)).await;
    let client = tokio::spawn(UpstreamClient::new(config, queue).run(h.shutdown.subscribe()));

    let mut device = TcpStream::connect(h.addr).await.unwrap();
    assert_eq!(send_frame(&mut device, b"5040 180001E60300000\x14").await, ACK);
    // Foreign account on the same session, never admitted
    assert_eq!(send_frame(&mut device, b"5040 180002E60300000\x14").await, NACK);

    assert_eq!(h.query.get_device_events(1).len(), 1);
    assert!(h.query.get_device_events(2).is_empty());
    assert_eq!(h.query.get_relay_stats().unwrap().delivered, 1);

    h.shutdown.send(()).unwrap();
    client.await.unwrap().unwrap();
    let received = upstream.await.unwrap();
    assert_eq!(received.concat(), b"5040 180001E60200000\x14".to_vec());
}

#[tokio::test]
async fn test_full_registry_event_is_not_relayed() {
    let (handle, _queue) = DeliveryQueue::channel(4, Duration::from_millis(200));
    let admission = AdmissionConfig {
        max_devices: 1,
        ..Default::default()
    };
    let h = start(admission, Some(handle.clone())).await;

    let mut device = TcpStream::connect(h.addr).await.unwrap();
    // Admitted device fills the registry; nothing drains the queue so it times out
    assert_eq!(send_frame(&mut device, b"5040 180001E60300000\x14").await, NACK);
    assert_eq!(handle.queued(), 1);

    assert_eq!(send_frame(&mut device, b"5040 180002E60300000\x14").await, NACK);
    assert_eq!(handle.queued(), 1);
    assert!(h.query.get_device_events(2).is_empty());
    assert_eq!(h.query.get_devices().len(), 1);
}

#[tokio::test]
async fn test_full_queue_nacks_without_recording() {
    // No upstream client drains the queue
    let (handle, _queue) = DeliveryQueue::channel(1, Duration::from_millis(200));
    let h = start(AdmissionConfig::default(), Some(handle.clone())).await;

    let _occupied = handle.try_enqueue(b"placeholder".to_vec()).unwrap();

    let mut device = TcpStream::connect(h.addr).await.unwrap();
    assert_eq!(send_frame(&mut device, FRAME).await, NACK);

    assert!(h.query.get_device_events(4209).is_empty());
    assert!(h.query.get_global_events().is_empty());
    assert_eq!(h.query.get_relay_stats().unwrap().queue_full, 1);
}

#[tokio::test]
async fn test_reply_timeout_nacks() {
    let (handle, _queue) = DeliveryQueue::channel(4, Duration::from_millis(100));
    let h = start(AdmissionConfig::default(), Some(handle)).await;

    let mut device = TcpStream::connect(h.addr).await.unwrap();
    assert_eq!(send_frame(&mut device, FRAME).await, NACK);

    // Recorded before the upstream verdict was awaited
    assert_eq!(h.query.get_device_events(4209).len(), 1);
    assert_eq!(h.query.get_relay_stats().unwrap().timeouts, 1);
}

#[tokio::test]
async fn test_shutdown_closes_sessions() {
    let h = start(AdmissionConfig::default(), None).await;
    let mut device = TcpStream::connect(h.addr).await.unwrap();
    assert_eq!(send_frame(&mut device, FRAME).await, ACK);

    h.shutdown.send(()).unwrap();
    expect_closed(&mut device).await;
}
