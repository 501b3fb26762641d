// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/cid-relay

//! Server core - admission, ingestion and the global history

use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use super::{EventLog, GlobalEntry, HistoryConfig, StatsCounter, Timestamp};
use crate::admission::{AdmissionConfig, AdmitDecision, ConnectionAdmitter, UnsolicitedDevicePolicy};
use crate::devices::{DeviceHandle, DeviceRegistry, RegistryError};

/// Why an event could not be recorded
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// Policy `reject` and the device was never admitted
    #[error("event from device {0} which was never admitted")]
    UnsolicitedDevice(u32),

    /// The registry refused a new device
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Owns every piece of shared server state.
///
/// Lock order is always device first, then the global log. Both appends of
/// one event happen while both locks are held, so no reader can see an
/// event in one history and not the other.
pub struct ServerCore {
    registry: DeviceRegistry,
    global: Mutex<EventLog<GlobalEntry>>,
    stats: StatsCounter,
    admitter: ConnectionAdmitter,
}

impl ServerCore {
    /// Empty core sized by `history` and governed by `admission`
    pub fn new(history: &HistoryConfig, admission: AdmissionConfig) -> Arc<Self> {
        info!(
            "Server core: {} events/device, {} global, {} devices max",
            history.device_capacity, history.global_capacity, admission.max_devices
        );

        Arc::new(Self {
            registry: DeviceRegistry::new(admission.max_devices, history.device_capacity),
            global: Mutex::new(EventLog::new(history.global_capacity)),
            stats: StatsCounter::new(),
            admitter: ConnectionAdmitter::new(admission),
        })
    }

    /// Decide on a new session for `device_id`
    pub fn admit(&self, device_id: u32) -> AdmitDecision {
        self.admitter.admit(&self.registry, &self.stats, device_id)
    }

    /// Append one event to the device history and the global history
    pub fn record_event(&self, device_id: u32, time: Timestamp, data: impl Into<String>) -> Result<(), IngestError> {
        let device = self.device_for_event(device_id)?;
        self.append_event(&device, device_id, time, data);
        Ok(())
    }

    /// Resolve the device an event will be recorded under.
    ///
    /// Fails when the unsolicited-device policy or the registry limit
    /// refuses the event. Nothing is appended yet; under the `create` policy
    /// an unseen device is registered here.
    pub fn device_for_event(&self, device_id: u32) -> Result<DeviceHandle, IngestError> {
        match self.admitter.config().unsolicited_devices {
            UnsolicitedDevicePolicy::Create => {
                let (device, created) = self.registry.resolve(device_id)?;
                if created {
                    debug!("Device {} created by unsolicited event", device_id);
                }
                Ok(device)
            }
            UnsolicitedDevicePolicy::Reject => self
                .registry
                .get(device_id)
                .ok_or(IngestError::UnsolicitedDevice(device_id)),
        }
    }

    /// Append to a device obtained from [`ServerCore::device_for_event`]
    pub fn append_event(&self, device: &DeviceHandle, device_id: u32, time: Timestamp, data: impl Into<String>) {
        let data = data.into();
        let mut state = device.lock();
        let mut global = self.global.lock();
        state.record(time, data.clone());
        global.append(GlobalEntry { time, device_id, data });
    }

    /// Every known device
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Session counters
    pub fn stats(&self) -> &StatsCounter {
        &self.stats
    }

    /// Sessions currently holding a lease
    pub fn active_sessions(&self) -> usize {
        self.admitter.active_sessions()
    }

    /// Global history, oldest first
    pub fn global_events(&self) -> Vec<GlobalEntry> {
        self.global.lock().all()
    }

    /// Newest `n` global entries, oldest first
    pub fn global_tail(&self, n: usize) -> Vec<GlobalEntry> {
        self.global.lock().tail(n)
    }

    /// Events ever recorded, including evicted ones
    pub fn total_events(&self) -> u64 {
        self.global.lock().total_appended()
    }
}
