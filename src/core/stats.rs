// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/cid-relay

//! Process-wide admission counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Accepted / rejected / reconnect counters plus the server start time.
///
/// Counters only ever increase. Uptime is derived on every snapshot and
/// never stored.
#[derive(Debug)]
pub struct StatsCounter {
    accepted: AtomicU64,
    rejected: AtomicU64,
    reconnects: AtomicU64,
    started: Instant,
}

/// Point-in-time copy of [`StatsCounter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Admitted connections
    pub accepted: u64,
    /// Refused connections
    pub rejected: u64,
    /// Admissions of devices seen before
    pub reconnects: u64,
    /// Time since the counter was created
    pub uptime: Duration,
}

impl StatsCounter {
    /// Zeroed counters, uptime starts now
    pub fn new() -> Self {
        Self {
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Count one admitted connection, and a reconnect when the device
    /// had been admitted before.
    pub fn record_accepted(&self, reconnect: bool) {
        if reconnect {
            self.reconnects.fetch_add(1, Ordering::Relaxed);
        }
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one refused connection
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Admitted connections so far
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Refused connections so far
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Reconnects so far
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    /// Time since startup
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Copy of every counter
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            accepted: self.accepted(),
            rejected: self.rejected(),
            reconnects: self.reconnects(),
            uptime: self.uptime(),
        }
    }
}

impl Default for StatsCounter {
    fn default() -> Self {
        Self::new()
    }
}
