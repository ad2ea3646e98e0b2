// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The in-memory handle: a concurrent map with expiry-only eviction.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{Mutex, RwLock};

use strata_core::{
    CacheHandle, CacheItem, Clock, HandleConfig, HandleRemovalEvent, HandleStats, RemovalListener,
    RemovalReason, Result, UpdateFactory, UpdateOutcome, resolve_item_expiration,
};

use crate::builder::InMemoryHandleBuilder;
use crate::scanner;

/// An in-memory cache handle backed by a concurrent map.
///
/// The handle evicts only on expiry: a background scanner sweeps expired
/// entries on an interval and reads drop expired entries lazily, each firing
/// the removal event once. Clones share storage.
///
/// Dropping the last clone shuts the scanner down.
pub struct InMemoryHandle<K, V> {
    inner: Arc<HandleInner<K, V>>,
}

pub(crate) struct HandleInner<K, V> {
    pub(crate) config: HandleConfig,
    pub(crate) stats: HandleStats,
    pub(crate) clock: Clock,
    pub(crate) map: DashMap<K, CacheItem<K, V>>,
    /// Serializes read-modify-write so in-process updates never lose writes.
    update_lock: Mutex<()>,
    pub(crate) removal_listener: RwLock<Option<RemovalListener<K, V>>>,
    pub(crate) sweep_running: AtomicBool,
    /// Owned so that dropping the handle disconnects the scanner's channel.
    _shutdown: crossbeam_channel::Sender<()>,
}

impl<K, V> Clone for InMemoryHandle<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> fmt::Debug for InMemoryHandle<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryHandle")
            .field("name", &self.inner.config.name())
            .field("entries", &self.inner.map.len())
            .finish_non_exhaustive()
    }
}

impl<K, V> Default for InMemoryHandle<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> InMemoryHandle<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a handle with default configuration and a system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a builder for configuring the handle.
    #[must_use]
    pub fn builder() -> InMemoryHandleBuilder<K, V> {
        InMemoryHandleBuilder::new()
    }

    pub(crate) fn from_builder(builder: InMemoryHandleBuilder<K, V>) -> Self {
        let stats = HandleStats::new(builder.config.statistics_enabled());
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::unbounded();
        let inner = Arc::new(HandleInner {
            config: builder.config,
            stats,
            clock: builder.clock,
            map: DashMap::new(),
            update_lock: Mutex::new(()),
            removal_listener: RwLock::new(None),
            sweep_running: AtomicBool::new(false),
            _shutdown: shutdown_tx,
        });
        scanner::spawn(Arc::downgrade(&inner), builder.sweep_interval, shutdown_rx);
        Self { inner }
    }

    /// Sweeps expired entries immediately and returns how many were evicted.
    ///
    /// The background scanner calls this on its interval; it is public for
    /// manual maintenance and deterministic tests. A sweep already running
    /// on another thread makes this call return zero without scanning.
    pub fn evict_expired(&self) -> usize {
        self.inner.evict_expired()
    }
}

impl<K, V> HandleInner<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn notify_removal(&self, event: HandleRemovalEvent<K, V>) {
        let listener = self.removal_listener.read().clone();
        if let Some(listener) = listener {
            listener(event);
        }
    }

    /// Removes the entry if it is still expired and fires the removal event.
    ///
    /// The re-check under the map lock keeps the event single-shot when a
    /// sweep, a lazy read, and a concurrent put race on the same key.
    pub(crate) fn remove_expired(&self, key: &K, now: std::time::SystemTime) -> bool {
        let Some((key, item)) = self.map.remove_if(key, |_, item| item.is_expired(now)) else {
            return false;
        };
        self.stats.on_handle_remove();
        self.notify_removal(HandleRemovalEvent {
            key,
            reason: RemovalReason::Expired,
            value: Some(item.into_value()),
        });
        true
    }
}

impl<K, V> CacheHandle<K, V> for InMemoryHandle<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn config(&self) -> &HandleConfig {
        &self.inner.config
    }

    fn stats(&self) -> &HandleStats {
        &self.inner.stats
    }

    fn add(&self, item: CacheItem<K, V>) -> Result<bool> {
        let item = resolve_item_expiration(item, &self.inner.config)?;
        let now = self.inner.clock.system_time();

        let mut replaced_expired = None;
        let added = match self.inner.map.entry(item.key().clone()) {
            Entry::Occupied(mut occupied) => {
                // An expired occupant counts as absent.
                if occupied.get().is_expired(now) {
                    let key = occupied.key().clone();
                    let old = occupied.insert(item);
                    replaced_expired = Some((key, old));
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(item);
                true
            }
        };

        // Fired after the shard guard above is released.
        if let Some((key, old)) = replaced_expired {
            self.inner.stats.on_handle_remove();
            self.inner.notify_removal(HandleRemovalEvent {
                key,
                reason: RemovalReason::Expired,
                value: Some(old.into_value()),
            });
        }
        Ok(added)
    }

    fn get(&self, key: &K) -> Result<Option<CacheItem<K, V>>> {
        let now = self.inner.clock.system_time();
        if let Some(entry) = self.inner.map.get(key) {
            if !entry.is_expired(now) {
                let item = entry.value().clone();
                drop(entry);
                item.touch(now);
                return Ok(Some(item));
            }
        }
        self.inner.remove_expired(key, now);
        Ok(None)
    }

    fn put(&self, item: CacheItem<K, V>) -> Result<()> {
        let item = resolve_item_expiration(item, &self.inner.config)?;
        self.inner.map.insert(item.key().clone(), item);
        Ok(())
    }

    fn remove(&self, key: &K) -> Result<bool> {
        Ok(self.inner.map.remove(key).is_some())
    }

    fn clear(&self) -> Result<()> {
        self.inner.map.clear();
        Ok(())
    }

    fn exists(&self, key: &K) -> Result<bool> {
        let now = self.inner.clock.system_time();
        Ok(self
            .inner
            .map
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now)))
    }

    fn count(&self) -> u64 {
        self.inner.map.len() as u64
    }

    fn update(
        &self,
        key: &K,
        factory: UpdateFactory<'_, V>,
        _max_retries: u32,
    ) -> Result<UpdateOutcome<K, V>> {
        let _serialized = self.inner.update_lock.lock();
        let Some(item) = self.get(key)? else {
            return Ok(UpdateOutcome::ItemDidNotExist);
        };
        let Some(new_value) = factory(item.value()) else {
            return Ok(UpdateOutcome::FactoryReturnedNone);
        };
        let updated = item.with_value(new_value);
        updated.touch(self.inner.clock.system_time());
        self.inner.map.insert(updated.key().clone(), updated.clone());
        Ok(UpdateOutcome::Success {
            item: updated,
            tries: 1,
        })
    }

    fn set_removal_listener(&self, listener: Option<RemovalListener<K, V>>) {
        *self.inner.removal_listener.write() = listener;
    }
}
