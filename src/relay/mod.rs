// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/cid-relay

//! Relay module - forwards accepted frames to the upstream receiver

mod queue;
mod upstream;

pub use queue::{
    Delivery, DeliveryQueue, EnqueueError, PendingReply, RelayHandle, RelayOutcome, RelayStats,
    RelayStatsSnapshot,
};
pub use upstream::UpstreamClient;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Forward frames upstream; when false frames are acknowledged locally
    pub enabled: bool,

    /// Upstream receiver host
    pub host: String,

    /// Upstream receiver port
    pub port: u16,

    /// Frames that may wait for the upstream connection
    pub buffer_size: usize,

    /// How long a device session waits for the upstream verdict
    pub reply_timeout_secs: u64,

    /// First reconnect delay
    pub reconnect_initial_ms: u64,

    /// Reconnect delay ceiling
    pub reconnect_max_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 20004,
            buffer_size: 100,
            reply_timeout_secs: 10,
            reconnect_initial_ms: 1000,
            reconnect_max_ms: 60_000,
        }
    }
}

impl RelayConfig {
    /// Upstream as `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// How long a session waits for the upstream verdict
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.reply_timeout_secs)
    }

    /// First reconnect delay
    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_ms)
    }

    /// Reconnect delay cap
    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }
}

/// Next reconnect delay: doubled, capped at `max`
pub(crate) fn next_backoff(delay: Duration, max: Duration) -> Duration {
    delay.saturating_mul(2).min(max)
}
