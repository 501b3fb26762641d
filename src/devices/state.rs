// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/cid-relay

//! Per-device state

use crate::core::{DeviceEvent, EventLog, Timestamp};
use chrono::Utc;

/// Everything the server knows about one device.
///
/// `last_event_time` / `last_event` always mirror the newest entry of
/// `events`; the only writer is [`DeviceState::record`].
#[derive(Debug, Clone)]
pub struct DeviceState {
    /// Device id (rewritten account number)
    pub id: u32,
    /// When the state was created
    pub first_seen: Timestamp,
    /// Time of the newest event
    pub last_event_time: Option<Timestamp>,
    /// Text of the newest event
    pub last_event: Option<String>,
    /// Bounded history, oldest first
    pub events: EventLog<DeviceEvent>,
    /// Admitted connections over the device's lifetime
    pub connections: u64,
    /// Sessions currently holding a lease on this device
    pub active_sessions: usize,
}

impl DeviceState {
    /// Fresh state with no events or connections
    pub fn new(id: u32, log_capacity: usize) -> Self {
        Self {
            id,
            first_seen: Utc::now(),
            last_event_time: None,
            last_event: None,
            events: EventLog::new(log_capacity),
            connections: 0,
            active_sessions: 0,
        }
    }

    /// Append an event and move the last-event fields to it
    pub fn record(&mut self, time: Timestamp, data: String) {
        self.last_event_time = Some(time);
        self.last_event = Some(data.clone());
        self.events.append(DeviceEvent { time, data });
    }

    /// True once any connection for this device has been admitted
    pub fn has_connected(&self) -> bool {
        self.connections > 0
    }
}
