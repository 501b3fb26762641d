// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/cid-relay

//! Query module - read-only surface for the desktop shell
//!
//! Every call returns an owned snapshot. Nothing here writes to shared
//! state, and locks are held only long enough to copy.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::{format_timestamp, format_uptime, DeviceEvent, GlobalEntry, ServerCore};
use crate::devices::DeviceState;
use crate::logging::LogBuffer;
use crate::relay::{RelayHandle, RelayStatsSnapshot};

/// Counters as shown to the shell
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stats {
    /// Admitted connections
    pub accepted: u64,
    /// Refused connections
    pub rejected: u64,
    /// `HH:MM:SS`
    pub uptime: String,
    /// Admissions of devices seen before
    pub reconnects: u64,
}

/// One row of the device list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSummary {
    /// Device id (rewritten account number)
    pub id: u32,
    /// Empty until the device's first event
    pub last_event_time: String,
    /// Text of the newest event, empty until the first
    pub last_event: String,
}

/// Entry of the server-wide history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GlobalEvent {
    /// RFC 3339, milliseconds, UTC
    pub time: String,
    /// Device the event belongs to
    #[serde(rename = "deviceID")]
    pub device_id: u32,
    /// Frame text
    pub data: String,
}

/// Entry of one device's history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    /// RFC 3339, milliseconds, UTC
    pub time: String,
    /// Frame text
    pub data: String,
}

impl From<&DeviceState> for DeviceSummary {
    fn from(dev: &DeviceState) -> Self {
        Self {
            id: dev.id,
            last_event_time: dev.last_event_time.as_ref().map(format_timestamp).unwrap_or_default(),
            last_event: dev.last_event.clone().unwrap_or_default(),
        }
    }
}

impl From<&DeviceEvent> for Event {
    fn from(event: &DeviceEvent) -> Self {
        Self {
            time: format_timestamp(&event.time),
            data: event.data.clone(),
        }
    }
}

impl From<GlobalEntry> for GlobalEvent {
    fn from(entry: GlobalEntry) -> Self {
        Self {
            time: format_timestamp(&entry.time),
            device_id: entry.device_id,
            data: entry.data,
        }
    }
}

/// The shell's only entry point into the server
#[derive(Clone)]
pub struct QueryFacade {
    core: Arc<ServerCore>,
    logs: LogBuffer,
    relay: Option<RelayHandle>,
}

impl QueryFacade {
    /// `relay` is `None` when frames are acknowledged locally
    pub fn new(core: Arc<ServerCore>, logs: LogBuffer, relay: Option<RelayHandle>) -> Self {
        Self { core, logs, relay }
    }

    /// Session counters and uptime
    pub fn get_stats(&self) -> Stats {
        let snap = self.core.stats().snapshot();
        Stats {
            accepted: snap.accepted,
            rejected: snap.rejected,
            uptime: format_uptime(snap.uptime),
            reconnects: snap.reconnects,
        }
    }

    /// Diagnostic log lines, oldest first
    pub fn get_logs(&self) -> Vec<String> {
        self.logs.lines()
    }

    /// Devices in first-seen order
    pub fn get_devices(&self) -> Vec<DeviceSummary> {
        self.core
            .registry()
            .list()
            .iter()
            .map(|handle| DeviceSummary::from(&*handle.lock()))
            .collect()
    }

    /// One device, `None` when unknown
    pub fn get_device(&self, id: u32) -> Option<DeviceSummary> {
        self.core
            .registry()
            .get(id)
            .map(|handle| DeviceSummary::from(&*handle.lock()))
    }

    /// Global history, oldest first
    pub fn get_global_events(&self) -> Vec<GlobalEvent> {
        self.core.global_events().into_iter().map(GlobalEvent::from).collect()
    }

    /// Newest `n` global events, oldest first
    pub fn get_global_events_tail(&self, n: usize) -> Vec<GlobalEvent> {
        self.core.global_tail(n).into_iter().map(GlobalEvent::from).collect()
    }

    /// Device history, oldest first; empty for an unknown id
    pub fn get_device_events(&self, id: u32) -> Vec<Event> {
        match self.core.registry().get(id) {
            Some(handle) => handle.lock().events.iter().map(Event::from).collect(),
            None => Vec::new(),
        }
    }

    /// `None` when the relay is disabled
    pub fn get_relay_stats(&self) -> Option<RelayStatsSnapshot> {
        self.relay.as_ref().map(RelayHandle::snapshot)
    }
}
