// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/cid-relay

//! Admission module - accept/reject decisions for device sessions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::StatsCounter;
use crate::devices::{DeviceHandle, DeviceRegistry};

/// What to do with an event whose device was never admitted
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UnsolicitedDevicePolicy {
    /// Create the device state on the fly, without touching the counters
    Create,
    /// Drop the event
    Reject,
}

/// Admission configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Concurrent admitted sessions across all devices
    pub max_sessions: usize,

    /// Distinct devices the registry will hold
    pub max_devices: usize,

    /// Refuse a second concurrent session for the same device id
    pub reject_duplicate_sessions: bool,

    /// Lowest acceptable device id
    pub min_device_id: u32,

    /// Highest acceptable device id
    pub max_device_id: u32,

    /// What to do with events from devices that were never admitted
    pub unsolicited_devices: UnsolicitedDevicePolicy,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 256,
            max_devices: 10_000,
            reject_duplicate_sessions: false,
            min_device_id: 1,
            max_device_id: 9999,
            unsolicited_devices: UnsolicitedDevicePolicy::Create,
        }
    }
}

/// Why a session was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Device id outside the configured range
    MalformedId,
    /// Every session slot is taken
    SessionLimit,
    /// The device already has a live session
    DuplicateSession,
    /// No room for another device
    RegistryFull,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RejectReason::MalformedId => "device id out of range",
            RejectReason::SessionLimit => "session limit reached",
            RejectReason::DuplicateSession => "device already has an active session",
            RejectReason::RegistryFull => "device registry full",
        };
        f.write_str(text)
    }
}

/// Result of [`ConnectionAdmitter::admit`]
#[derive(Debug)]
pub enum AdmitDecision {
    /// Session admitted; the lease holds its slot
    Accepted {
        /// Releases the slot when dropped
        lease: SessionLease,
        /// The device had been admitted before
        reconnect: bool,
    },
    /// Session refused, nothing was created
    Rejected(RejectReason),
}

impl AdmitDecision {
    /// Whether the session was admitted
    pub fn is_accepted(&self) -> bool {
        matches!(self, AdmitDecision::Accepted { .. })
    }

    /// Reason for a rejection, `None` when accepted
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            AdmitDecision::Rejected(reason) => Some(*reason),
            AdmitDecision::Accepted { .. } => None,
        }
    }
}

/// Proof of an admitted session.
///
/// Holds one session slot and one active-session mark on the device;
/// both are released on drop.
#[derive(Debug)]
pub struct SessionLease {
    session_id: Uuid,
    device_id: u32,
    device: DeviceHandle,
    slots: Arc<AtomicUsize>,
}

impl SessionLease {
    /// Unique id of this session
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Device the session was admitted for
    pub fn device_id(&self) -> u32 {
        self.device_id
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        {
            let mut dev = self.device.lock();
            dev.active_sessions = dev.active_sessions.saturating_sub(1);
        }
        self.slots.fetch_sub(1, Ordering::AcqRel);
        debug!("Session {} for device {} released", self.session_id, self.device_id);
    }
}

/// Decides whether a device session may proceed.
///
/// Every call to [`ConnectionAdmitter::admit`] moves exactly one of the
/// accepted/rejected counters.
pub struct ConnectionAdmitter {
    config: AdmissionConfig,
    active: Arc<AtomicUsize>,
}

impl ConnectionAdmitter {
    /// Admitter with no live sessions
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            config,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Active policy
    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Sessions currently holding a lease
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Admit or reject one session, moving exactly one counter
    pub fn admit(&self, registry: &DeviceRegistry, stats: &StatsCounter, device_id: u32) -> AdmitDecision {
        match self.try_admit(registry, device_id) {
            Ok((lease, reconnect)) => {
                stats.record_accepted(reconnect);
                debug!(
                    "Admitted device {} (session {}, reconnect: {})",
                    device_id, lease.session_id, reconnect
                );
                AdmitDecision::Accepted { lease, reconnect }
            }
            Err(reason) => {
                stats.record_rejected();
                warn!("Rejected device {}: {}", device_id, reason);
                AdmitDecision::Rejected(reason)
            }
        }
    }

    fn try_admit(&self, registry: &DeviceRegistry, device_id: u32) -> Result<(SessionLease, bool), RejectReason> {
        if device_id < self.config.min_device_id || device_id > self.config.max_device_id {
            return Err(RejectReason::MalformedId);
        }

        let max = self.config.max_sessions;
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .map_err(|_| RejectReason::SessionLimit)?;

        let device = match registry.resolve(device_id) {
            Ok((device, _)) => device,
            Err(_) => {
                self.active.fetch_sub(1, Ordering::AcqRel);
                return Err(RejectReason::RegistryFull);
            }
        };

        let reconnect = {
            let mut dev = device.lock();
            if self.config.reject_duplicate_sessions && dev.active_sessions > 0 {
                drop(dev);
                self.active.fetch_sub(1, Ordering::AcqRel);
                return Err(RejectReason::DuplicateSession);
            }
            let reconnect = dev.has_connected();
            dev.connections += 1;
            dev.active_sessions += 1;
            reconnect
        };

        let lease = SessionLease {
            session_id: Uuid::new_v4(),
            device_id,
            device,
            slots: self.active.clone(),
        };
        Ok((lease, reconnect))
    }
}
