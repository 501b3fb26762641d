// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/cid-relay

//! Core module - event histories, counters and the ingestion engine

mod engine;
mod event_log;
mod stats;

pub use engine::{IngestError, ServerCore};
pub use event_log::EventLog;
pub use stats::{StatsCounter, StatsSnapshot};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wall-clock time attached to every recorded event
pub type Timestamp = DateTime<Utc>;

/// One event as kept in a device's own history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEvent {
    /// Server receive time
    pub time: Timestamp,
    /// Frame text, delimiter stripped
    pub data: String,
}

/// One event as kept in the server-wide history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalEntry {
    /// Server receive time
    pub time: Timestamp,
    /// Device the event belongs to
    pub device_id: u32,
    /// Frame text, delimiter stripped
    pub data: String,
}

/// History capacities
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Events retained per device
    pub device_capacity: usize,

    /// Events retained in the global log
    pub global_capacity: usize,

    /// Diagnostic log lines retained for the query surface
    pub log_capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            device_capacity: 100,
            global_capacity: 500,
            log_capacity: 100,
        }
    }
}

/// RFC 3339 UTC with milliseconds, e.g. `2026-10-16T08:30:00.123Z`
pub fn format_timestamp(time: &Timestamp) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `HH:MM:SS`; hours keep growing past 99
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
