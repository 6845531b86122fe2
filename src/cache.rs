//! Block cache with capacity bound and time-based expiry.
//!
//! Entries are keyed by block index and stamped with the time they were
//! filled. Eviction is by fill time, oldest first: reads do not promote
//! entries. Timestamps are passed in by the caller so the cache stays free of
//! clocks and I/O.

use std::collections::HashMap;
use std::time::Duration;

use crate::config::duration_ms;
use crate::types::Row;

/// One materialized block.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub block_index: u64,
    pub rows: Vec<Row>,
    /// Milliseconds on the owning clock when the rows were stored
    pub fetched_at: u64,
}

/// A bounded map of block index to rows.
#[derive(Debug)]
pub struct BlockCache {
    entries: HashMap<u64, CacheEntry>,
    capacity: usize,
    timeout_ms: u64,
}

impl BlockCache {
    /// Create a cache holding at most `capacity` blocks, each valid for `timeout`.
    pub fn new(capacity: usize, timeout: Duration) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity.saturating_add(1)),
            capacity,
            timeout_ms: duration_ms(timeout),
        }
    }

    fn is_expired(&self, entry: &CacheEntry, now: u64) -> bool {
        now.saturating_sub(entry.fetched_at) > self.timeout_ms
    }

    /// Look up a block. An expired entry is removed and reported absent.
    pub fn get(&mut self, block_index: u64, now: u64) -> Option<&CacheEntry> {
        let expired = self
            .entries
            .get(&block_index)
            .is_some_and(|entry| self.is_expired(entry, now));
        if expired {
            self.entries.remove(&block_index);
            return None;
        }
        self.entries.get(&block_index)
    }

    /// Look up a fresh block without removing expired entries.
    pub fn peek(&self, block_index: u64, now: u64) -> Option<&CacheEntry> {
        self.entries
            .get(&block_index)
            .filter(|entry| !self.is_expired(entry, now))
    }

    /// Whether the block is present and not expired.
    pub fn contains_fresh(&self, block_index: u64, now: u64) -> bool {
        self.peek(block_index, now).is_some()
    }

    /// Store a block's rows stamped with `now`, replacing any previous entry,
    /// then enforce the capacity. Returns the evicted block indices.
    pub fn put(&mut self, block_index: u64, rows: Vec<Row>, now: u64) -> Vec<u64> {
        self.entries.insert(
            block_index,
            CacheEntry {
                block_index,
                rows,
                fetched_at: now,
            },
        );
        self.evict_if_over_capacity()
    }

    /// Remove oldest-filled entries until at capacity. Ties go to the lower
    /// block index first.
    pub fn evict_if_over_capacity(&mut self) -> Vec<u64> {
        let excess = self.entries.len().saturating_sub(self.capacity);
        if excess == 0 {
            return Vec::new();
        }
        let mut by_age: Vec<(u64, u64)> = self
            .entries
            .values()
            .map(|entry| (entry.fetched_at, entry.block_index))
            .collect();
        by_age.sort_unstable();
        let evicted: Vec<u64> = by_age
            .into_iter()
            .take(excess)
            .map(|(_, block_index)| block_index)
            .collect();
        for block_index in &evicted {
            self.entries.remove(block_index);
        }
        evicted
    }

    /// Drop every expired entry. Returns the removed block indices, ascending.
    pub fn purge_expired(&mut self, now: u64) -> Vec<u64> {
        let mut expired: Vec<u64> = self
            .entries
            .values()
            .filter(|entry| self.is_expired(entry, now))
            .map(|entry| entry.block_index)
            .collect();
        expired.sort_unstable();
        for block_index in &expired {
            self.entries.remove(block_index);
        }
        expired
    }

    /// Number of stored entries, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
