// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-handle operation counters.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Operation counters for one cache handle.
///
/// All counters are atomic and updated with relaxed ordering; they are
/// monitoring data, not synchronization. When the handle's statistics are
/// disabled every mutation is a no-op and every read returns zero.
///
/// Updates are modelled as one logical put plus as many internal gets as the
/// backend needed tries, so [`on_update`](Self::on_update) feeds the try
/// count into both the get and hit counters. Hit-ratio reporting stays
/// consistent with that convention.
#[derive(Debug, Default)]
pub struct HandleStats {
    enabled: bool,
    add_calls: AtomicU64,
    put_calls: AtomicU64,
    get_calls: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    remove_calls: AtomicU64,
    clear_calls: AtomicU64,
    items: AtomicI64,
}

impl HandleStats {
    /// Creates a counter block, active only when `enabled` is true.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    /// Returns true if counters are collected.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Records a successful add.
    pub fn on_add(&self) {
        if self.enabled {
            self.add_calls.fetch_add(1, Ordering::Relaxed);
            self.items.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a put; `item_added` tells an insert from an overwrite.
    pub fn on_put(&self, item_added: bool) {
        if self.enabled {
            self.put_calls.fetch_add(1, Ordering::Relaxed);
            if item_added {
                self.items.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Records a get that found a live entry.
    pub fn on_hit(&self) {
        if self.enabled {
            self.get_calls.fetch_add(1, Ordering::Relaxed);
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a get that found nothing.
    pub fn on_miss(&self) {
        if self.enabled {
            self.get_calls.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a successful remove.
    pub fn on_remove(&self) {
        if self.enabled {
            self.remove_calls.fetch_add(1, Ordering::Relaxed);
            self.items.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Records a clear; the item count resets to zero.
    pub fn on_clear(&self) {
        if self.enabled {
            self.clear_calls.fetch_add(1, Ordering::Relaxed);
            self.items.store(0, Ordering::Relaxed);
        }
    }

    /// Records a completed update that took `tries` attempts.
    pub fn on_update(&self, tries: u32) {
        if self.enabled {
            self.get_calls.fetch_add(u64::from(tries), Ordering::Relaxed);
            self.hits.fetch_add(u64::from(tries), Ordering::Relaxed);
            self.put_calls.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a removal the handle decided on its own (expiration,
    /// eviction). Only the item count moves.
    pub fn on_handle_remove(&self) {
        if self.enabled {
            self.items.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Number of add calls that stored an item.
    #[must_use]
    pub fn add_calls(&self) -> u64 {
        self.read(&self.add_calls)
    }

    /// Number of put calls.
    #[must_use]
    pub fn put_calls(&self) -> u64 {
        self.read(&self.put_calls)
    }

    /// Number of get calls (hits plus misses).
    #[must_use]
    pub fn get_calls(&self) -> u64 {
        self.read(&self.get_calls)
    }

    /// Number of gets that found a live entry.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.read(&self.hits)
    }

    /// Number of gets that found nothing.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.read(&self.misses)
    }

    /// Number of remove calls that removed an entry.
    #[must_use]
    pub fn remove_calls(&self) -> u64 {
        self.read(&self.remove_calls)
    }

    /// Number of clear calls.
    #[must_use]
    pub fn clear_calls(&self) -> u64 {
        self.read(&self.clear_calls)
    }

    /// Current number of stored items as tracked by the counters.
    #[must_use]
    pub fn items(&self) -> i64 {
        if self.enabled {
            self.items.load(Ordering::Relaxed)
        } else {
            0
        }
    }

    /// Fraction of gets that hit, in [0, 1]. Zero when nothing was read.
    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        let gets = self.get_calls();
        if gets == 0 {
            return 0.0;
        }
        self.hits() as f64 / gets as f64
    }

    fn read(&self, counter: &AtomicU64) -> u64 {
        if self.enabled {
            counter.load(Ordering::Relaxed)
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_stats_stay_at_zero() {
        let stats = HandleStats::new(false);
        stats.on_add();
        stats.on_hit();
        stats.on_put(true);
        assert_eq!(stats.add_calls(), 0);
        assert_eq!(stats.hits(), 0);
        assert_eq!(stats.items(), 0);
    }

    #[test]
    fn put_distinguishes_insert_from_overwrite() {
        let stats = HandleStats::new(true);
        stats.on_put(true);
        stats.on_put(false);
        assert_eq!(stats.put_calls(), 2);
        assert_eq!(stats.items(), 1);
    }

    #[test]
    fn update_counts_tries_as_gets_and_hits() {
        let stats = HandleStats::new(true);
        stats.on_update(3);
        assert_eq!(stats.get_calls(), 3);
        assert_eq!(stats.hits(), 3);
        assert_eq!(stats.put_calls(), 1);
    }

    #[test]
    fn clear_resets_items() {
        let stats = HandleStats::new(true);
        stats.on_add();
        stats.on_add();
        stats.on_clear();
        assert_eq!(stats.items(), 0);
        assert_eq!(stats.clear_calls(), 1);
        assert_eq!(stats.add_calls(), 2);
    }

    #[test]
    fn hit_ratio_reflects_hits_and_misses() {
        let stats = HandleStats::new(true);
        stats.on_hit();
        stats.on_hit();
        stats.on_miss();
        stats.on_miss();
        assert!((stats.hit_ratio() - 0.5).abs() < f64::EPSILON);
    }
}
