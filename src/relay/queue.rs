// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/cid-relay

//! Bounded hand-off between device sessions and the upstream client

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// One frame waiting for the upstream verdict
#[derive(Debug)]
pub struct Delivery {
    /// Rewritten frame, delimiter included
    pub payload: Vec<u8>,
    /// `true` for ACK; dropping the sender counts as NACK
    pub reply: oneshot::Sender<bool>,
}

/// Why a frame was not queued
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// Buffer at capacity
    #[error("relay queue is full")]
    Full,

    /// The upstream client has stopped
    #[error("relay queue is closed")]
    Closed,
}

/// How a relayed frame ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Upstream answered ACK
    Ack,
    /// Upstream answered anything else
    Nack,
    /// No verdict within the reply timeout
    Timeout,
    /// The upstream connection went away before answering
    Dropped,
}

impl RelayOutcome {
    /// Whether the device should get ACK
    pub fn is_ack(self) -> bool {
        self == RelayOutcome::Ack
    }
}

/// Relay counters
#[derive(Debug, Default)]
pub struct RelayStats {
    delivered: AtomicU64,
    refused: AtomicU64,
    upstream_reconnects: AtomicU64,
    queue_full: AtomicU64,
    timeouts: AtomicU64,
}

/// Relay counters for the query surface
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatsSnapshot {
    /// Frames the upstream acknowledged
    pub delivered: u64,
    /// Frames the upstream refused
    pub refused: u64,
    /// Failed dials and dropped upstream connections
    pub upstream_reconnects: u64,
    /// Frames refused because the queue was full
    pub queue_full: u64,
    /// Frames whose verdict timed out
    pub timeouts: u64,
    /// Frames waiting right now
    pub queued: usize,
}

impl RelayStats {
    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_refused(&self) {
        self.refused.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect(&self) {
        self.upstream_reconnects.fetch_add(1, Ordering::Relaxed);
    }

    fn record_queue_full(&self) {
        self.queue_full.fetch_add(1, Ordering::Relaxed);
    }

    fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Reconnect attempts so far
    pub fn upstream_reconnects(&self) -> u64 {
        self.upstream_reconnects.load(Ordering::Relaxed)
    }

    fn snapshot(&self, queued: usize) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            refused: self.refused.load(Ordering::Relaxed),
            upstream_reconnects: self.upstream_reconnects(),
            queue_full: self.queue_full.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            queued,
        }
    }
}

/// Receiving side, owned by the upstream client
pub struct DeliveryQueue {
    rx: mpsc::Receiver<Delivery>,
    stats: Arc<RelayStats>,
}

impl DeliveryQueue {
    /// Create a queue holding at most `capacity` frames
    pub fn channel(capacity: usize, reply_timeout: Duration) -> (RelayHandle, DeliveryQueue) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let stats = Arc::new(RelayStats::default());

        let handle = RelayHandle {
            tx,
            stats: stats.clone(),
            reply_timeout,
        };
        (handle, DeliveryQueue { rx, stats })
    }

    /// Next frame, `None` once every handle is gone
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    /// Shared relay counters
    pub fn stats(&self) -> Arc<RelayStats> {
        self.stats.clone()
    }
}

/// Sending side, cloned into every device session
#[derive(Clone)]
pub struct RelayHandle {
    tx: mpsc::Sender<Delivery>,
    stats: Arc<RelayStats>,
    reply_timeout: Duration,
}

impl RelayHandle {
    /// Queue a frame without waiting for space
    pub fn try_enqueue(&self, payload: Vec<u8>) -> Result<PendingReply, EnqueueError> {
        let (reply, rx) = oneshot::channel();
        match self.tx.try_send(Delivery { payload, reply }) {
            Ok(()) => Ok(PendingReply {
                rx,
                timeout: self.reply_timeout,
                stats: self.stats.clone(),
            }),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.record_queue_full();
                Err(EnqueueError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(EnqueueError::Closed),
        }
    }

    /// Frames currently waiting in the queue
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Shared relay counters
    pub fn stats(&self) -> Arc<RelayStats> {
        self.stats.clone()
    }

    /// Counters plus current queue depth
    pub fn snapshot(&self) -> RelayStatsSnapshot {
        self.stats.snapshot(self.queued())
    }
}

/// Upstream verdict for one queued frame
pub struct PendingReply {
    rx: oneshot::Receiver<bool>,
    timeout: Duration,
    stats: Arc<RelayStats>,
}

impl PendingReply {
    /// Wait for the upstream verdict, bounded by the reply timeout
    pub async fn wait(self) -> RelayOutcome {
        match tokio::time::timeout(self.timeout, self.rx).await {
            Ok(Ok(true)) => RelayOutcome::Ack,
            Ok(Ok(false)) => RelayOutcome::Nack,
            Ok(Err(_)) => RelayOutcome::Dropped,
            Err(_) => {
                self.stats.record_timeout();
                RelayOutcome::Timeout
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueue_and_ack() {
        let (handle, mut queue) = DeliveryQueue::channel(4, Duration::from_secs(1));
        let pending = handle.try_enqueue(b"frame".to_vec()).unwrap();
        assert_eq!(handle.queued(), 1);

        let delivery = queue.recv().await.unwrap();
        assert_eq!(delivery.payload, b"frame");
        delivery.reply.send(true).unwrap();

        assert_eq!(pending.wait().await, RelayOutcome::Ack);
        assert_eq!(handle.queued(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_refuses_immediately() {
        let (handle, _queue) = DeliveryQueue::channel(1, Duration::from_secs(1));
        let _first = handle.try_enqueue(vec![1]).unwrap();

        assert_eq!(handle.try_enqueue(vec![2]).err(), Some(EnqueueError::Full));
        assert_eq!(handle.snapshot().queue_full, 1);
    }

    #[tokio::test]
    async fn test_dropped_reply_is_not_ack() {
        let (handle, mut queue) = DeliveryQueue::channel(1, Duration::from_secs(1));
        let pending = handle.try_enqueue(vec![1]).unwrap();
        drop(queue.recv().await.unwrap());

        assert_eq!(pending.wait().await, RelayOutcome::Dropped);
    }

    #[tokio::test]
    async fn test_reply_timeout() {
        let (handle, _queue) = DeliveryQueue::channel(1, Duration::from_millis(20));
        let pending = handle.try_enqueue(vec![1]).unwrap();

        assert_eq!(pending.wait().await, RelayOutcome::Timeout);
        assert_eq!(handle.snapshot().timeouts, 1);
    }

    #[tokio::test]
    async fn test_closed_queue() {
        let (handle, queue) = DeliveryQueue::channel(1, Duration::from_secs(1));
        drop(queue);
        assert_eq!(handle.try_enqueue(vec![1]).err(), Some(EnqueueError::Closed));
    }
}
