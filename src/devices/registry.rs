// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/cid-relay

//! Device registry - owns every [`DeviceState`]

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::DeviceState;

/// Shared handle to one device; the mutex is the per-device lock
pub type DeviceHandle = Arc<Mutex<DeviceState>>;

/// Why the registry refused a device
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// `max_devices` reached
    #[error("device registry is full ({limit} devices)")]
    CapacityExceeded {
        /// Configured `max_devices`
        limit: usize,
    },
}

#[derive(Default)]
struct Inner {
    index: HashMap<u32, usize>,
    /// First-seen order
    entries: Vec<DeviceHandle>,
}

/// Map from device id to state, created lazily on first contact.
///
/// The registry lock only guards the id index; each device carries its own
/// mutex so unrelated devices never contend.
pub struct DeviceRegistry {
    inner: RwLock<Inner>,
    max_devices: usize,
    log_capacity: usize,
}

impl DeviceRegistry {
    /// `log_capacity` sizes each new device history
    pub fn new(max_devices: usize, log_capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            max_devices,
            log_capacity,
        }
    }

    /// Return the device for `id`, creating it when absent.
    ///
    /// The boolean is true when this call created the entry.
    pub fn resolve(&self, id: u32) -> Result<(DeviceHandle, bool), RegistryError> {
        if let Some(handle) = self.get(id) {
            return Ok((handle, false));
        }

        let mut inner = self.inner.write();
        // Another session may have created it between the two locks
        if let Some(&slot) = inner.index.get(&id) {
            return Ok((inner.entries[slot].clone(), false));
        }
        if inner.entries.len() >= self.max_devices {
            return Err(RegistryError::CapacityExceeded {
                limit: self.max_devices,
            });
        }

        let handle = Arc::new(Mutex::new(DeviceState::new(id, self.log_capacity)));
        let slot = inner.entries.len();
        inner.entries.push(handle.clone());
        inner.index.insert(id, slot);
        debug!("Registered device {} ({} known)", id, slot + 1);

        Ok((handle, true))
    }

    /// Existing device, never creates
    pub fn get(&self, id: u32) -> Option<DeviceHandle> {
        let inner = self.inner.read();
        inner.index.get(&id).map(|&slot| inner.entries[slot].clone())
    }

    /// Consistent copy of one device
    pub fn snapshot(&self, id: u32) -> Option<DeviceState> {
        self.get(id).map(|handle| handle.lock().clone())
    }

    /// Every device in first-seen order.
    ///
    /// Handles are collected under the registry lock and each device is
    /// then read under its own lock.
    pub fn list(&self) -> Vec<DeviceHandle> {
        self.inner.read().entries.clone()
    }

    /// Whether `id` is known
    pub fn contains(&self, id: u32) -> bool {
        self.inner.read().index.contains_key(&id)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Whether nothing is retained
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Device limit
    pub fn max_devices(&self) -> usize {
        self.max_devices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_creates_once() {
        let registry = DeviceRegistry::new(10, 5);

        let (a, created) = registry.resolve(7).unwrap();
        assert!(created);
        let (b, created) = registry.resolve(7).unwrap();
        assert!(!created);

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_list_is_first_seen_order() {
        let registry = DeviceRegistry::new(10, 5);
        for id in [30, 10, 20, 10] {
            registry.resolve(id).unwrap();
        }

        let ids: Vec<u32> = registry.list().iter().map(|d| d.lock().id).collect();
        assert_eq!(ids, vec![30, 10, 20]);

        let again: Vec<u32> = registry.list().iter().map(|d| d.lock().id).collect();
        assert_eq!(ids, again);
    }

    #[test]
    fn test_capacity_exceeded() {
        let registry = DeviceRegistry::new(2, 5);
        registry.resolve(1).unwrap();
        registry.resolve(2).unwrap();

        assert_eq!(
            registry.resolve(3).unwrap_err(),
            RegistryError::CapacityExceeded { limit: 2 }
        );
        // Existing devices still resolve at the limit
        assert!(registry.resolve(1).is_ok());
        assert!(!registry.contains(3));
    }

    #[test]
    fn test_get_unknown() {
        let registry = DeviceRegistry::new(2, 5);
        assert!(registry.get(99).is_none());
        assert!(registry.snapshot(99).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_resolve_single_entry() {
        let registry = Arc::new(DeviceRegistry::new(100, 5));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.resolve(5).unwrap().1)
            })
            .collect();

        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|c| *c)
            .count();
        assert_eq!(created, 1);
        assert_eq!(registry.len(), 1);
    }
}
