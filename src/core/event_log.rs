// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/cid-relay

//! Bounded, append-only event history

/// Fixed-capacity ring buffer that evicts its oldest entry when full.
///
/// Storage grows up to `capacity` and is then reused in place: `head`
/// always points at the oldest retained entry, so appends stay O(1) and
/// no separate eviction pass is ever needed. Entries are never mutated
/// after they are appended.
#[derive(Debug, Clone)]
pub struct EventLog<T> {
    slots: Vec<T>,
    head: usize,
    capacity: usize,
    appended: u64,
}

impl<T> EventLog<T> {
    /// Create an empty log. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity.min(1024)),
            head: 0,
            capacity,
            appended: 0,
        }
    }

    /// Append an entry, evicting the oldest one when at capacity.
    pub fn append(&mut self, entry: T) {
        if self.slots.len() < self.capacity {
            self.slots.push(entry);
        } else {
            self.slots[self.head] = entry;
            self.head = (self.head + 1) % self.capacity;
        }
        self.appended += 1;
    }

    /// Iterate retained entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let (newer, older) = self.slots.split_at(self.head);
        older.iter().chain(newer.iter())
    }

    /// Most recently appended entry.
    pub fn last(&self) -> Option<&T> {
        if self.slots.is_empty() {
            None
        } else if self.head == 0 {
            self.slots.last()
        } else {
            self.slots.get(self.head - 1)
        }
    }

    /// Entries currently retained
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether nothing is retained
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Maximum retained entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total number of appends over the lifetime of the log.
    pub fn total_appended(&self) -> u64 {
        self.appended
    }

    /// Number of entries dropped by eviction so far.
    pub fn evicted(&self) -> u64 {
        self.appended - self.slots.len() as u64
    }
}

impl<T: Clone> EventLog<T> {
    /// The `n` most recent entries, oldest first.
    pub fn tail(&self, n: usize) -> Vec<T> {
        let skip = self.slots.len().saturating_sub(n);
        self.iter().skip(skip).cloned().collect()
    }

    /// Every retained entry, oldest first.
    pub fn all(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}
