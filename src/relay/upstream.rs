// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/cid-relay

//! Upstream TCP client

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::{next_backoff, DeliveryQueue, RelayConfig, RelayStats};
use crate::protocol::ACK;

/// Dial attempts logged as errors before dropping to warnings
const NOISY_ATTEMPTS: u32 = 10;

enum ConnectionEnd {
    Shutdown,
    QueueClosed,
    Lost,
}

/// Forwards queued frames to the upstream receiver, one at a time.
///
/// Every frame is written and the receiver's answer read before the next
/// one is taken off the queue. A lone ACK byte is success; any other
/// answer is a refusal.
pub struct UpstreamClient {
    config: RelayConfig,
    queue: DeliveryQueue,
    stats: Arc<RelayStats>,
}

impl UpstreamClient {
    /// Client draining `queue` towards `config.address()`
    pub fn new(config: RelayConfig, queue: DeliveryQueue) -> Self {
        let stats = queue.stats();
        Self { config, queue, stats }
    }

    /// Connect, forward, reconnect with backoff until shutdown
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let addr = self.config.address();
        let mut delay = self.config.reconnect_initial();
        let mut attempts: u32 = 0;

        loop {
            let connected = tokio::select! {
                result = TcpStream::connect(&addr) => result,
                _ = shutdown.recv() => {
                    info!("Upstream client shutting down");
                    return Ok(());
                }
            };

            let stream = match connected {
                Ok(stream) => stream,
                Err(e) => {
                    attempts += 1;
                    self.stats.record_reconnect();
                    if attempts > NOISY_ATTEMPTS {
                        warn!("Dial {} failed (attempt {}), retrying in {:?}: {}", addr, attempts, delay, e);
                    } else {
                        error!("Dial {} failed (attempt {}), retrying in {:?}: {}", addr, attempts, delay, e);
                    }

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.recv() => {
                            info!("Upstream client shutting down");
                            return Ok(());
                        }
                    }
                    delay = next_backoff(delay, self.config.reconnect_max());
                    continue;
                }
            };

            info!("Connected to upstream {}", addr);
            attempts = 0;

            match self.forward(stream, &mut shutdown).await {
                ConnectionEnd::Shutdown => {
                    info!("Upstream client shutting down");
                    return Ok(());
                }
                ConnectionEnd::QueueClosed => {
                    info!("Relay queue closed, upstream client stopping");
                    return Ok(());
                }
                ConnectionEnd::Lost => {
                    delay = self.config.reconnect_initial();
                    info!("Upstream connection closed, reconnecting");
                }
            }
        }
    }

    async fn forward(&mut self, mut stream: TcpStream, shutdown: &mut broadcast::Receiver<()>) -> ConnectionEnd {
        let read_timeout = self.config.reply_timeout();
        let mut reply = [0u8; 1024];

        loop {
            let delivery = tokio::select! {
                next = self.queue.recv() => match next {
                    Some(delivery) => delivery,
                    None => return ConnectionEnd::QueueClosed,
                },
                _ = shutdown.recv() => return ConnectionEnd::Shutdown,
            };

            if let Err(e) = stream.write_all(&delivery.payload).await {
                error!("Write to upstream failed: {}", e);
                return ConnectionEnd::Lost;
            }
            debug!("Wrote to upstream: {:?}", String::from_utf8_lossy(&delivery.payload));

            let n = match read_reply(&mut stream, &mut reply, read_timeout).await {
                Ok(n) => n,
                Err(e) => {
                    error!("Read from upstream failed: {}", e);
                    return ConnectionEnd::Lost;
                }
            };

            let accepted = n == 1 && reply[0] == ACK;
            if accepted {
                debug!("Upstream ACK");
                self.stats.record_delivered();
            } else {
                warn!("Upstream answered NACK or other non-ACK response ({} bytes)", n);
                self.stats.record_refused();
            }
            // The session may have given up waiting already
            let _ = delivery.reply.send(accepted);
        }
    }
}

async fn read_reply(stream: &mut TcpStream, buf: &mut [u8], limit: Duration) -> std::io::Result<usize> {
    match tokio::time::timeout(limit, stream.read(buf)).await {
        Ok(Ok(0)) => Err(std::io::ErrorKind::UnexpectedEof.into()),
        Ok(result) => result,
        Err(_) => Err(std::io::ErrorKind::TimedOut.into()),
    }
}
