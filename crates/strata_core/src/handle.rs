// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The core trait for cache storage layers.
//!
//! [`CacheHandle`] defines the interface every storage layer must implement.
//! The coordinator in the `strata` crate composes an ordered list of handles
//! behind one key-value surface; implement this trait to plug in a custom
//! backend (a distributed store, a system cache, and so on).

use std::sync::Arc;
use std::time::Duration;

use crate::error::{CacheError, Result};
use crate::item::{CacheItem, ExpirationMode};
use crate::stats::HandleStats;
use crate::update::UpdateOutcome;

/// Why a handle dropped an item on its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemovalReason {
    /// The item passed its expiration deadline.
    Expired,
    /// The backend evicted the item (memory pressure, capacity).
    Evicted,
    /// The item disappeared from the backend outside this process.
    ExternalDelete,
}

/// A removal decided inside a handle, as opposed to a caller-invoked remove.
///
/// The value may be absent when the backend cannot return it.
#[derive(Clone, Debug)]
pub struct HandleRemovalEvent<K, V> {
    /// The removed key.
    pub key: K,
    /// Why the handle dropped the item.
    pub reason: RemovalReason,
    /// The removed value, if the backend still had it.
    pub value: Option<V>,
}

/// Observer for [`HandleRemovalEvent`]s. The coordinator registers one per
/// handle to propagate evictions across layers.
pub type RemovalListener<K, V> = Arc<dyn Fn(HandleRemovalEvent<K, V>) + Send + Sync>;

/// The read-modify-write closure passed to [`CacheHandle::update`].
///
/// Returning `None` declines the update and aborts the operation.
pub type UpdateFactory<'a, V> = &'a (dyn Fn(&V) -> Option<V> + Send + Sync);

/// Configuration for a single cache handle.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use strata_core::{ExpirationMode, HandleConfig};
///
/// let config = HandleConfig::new("l1")
///     .with_expiration(ExpirationMode::Sliding, Duration::from_secs(300))
///     .with_backplane_source(true);
/// assert_eq!(config.name(), "l1");
/// ```
#[derive(Clone, Debug)]
pub struct HandleConfig {
    name: String,
    key: String,
    expiration_mode: ExpirationMode,
    expiration_timeout: Duration,
    enable_statistics: bool,
    enable_performance_counters: bool,
    is_backplane_source: bool,
}

impl HandleConfig {
    /// Creates a configuration with the given name.
    ///
    /// The configuration key defaults to the name; statistics are enabled,
    /// performance counters disabled, and the expiration default is
    /// [`ExpirationMode::Default`] (no handle-level expiration).
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            key: name.clone(),
            name,
            expiration_mode: ExpirationMode::Default,
            expiration_timeout: Duration::ZERO,
            enable_statistics: true,
            enable_performance_counters: false,
            is_backplane_source: false,
        }
    }

    /// Sets the configuration key, used to look the handle up in external
    /// configuration sources.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Sets the default expiration applied to items that do not carry their
    /// own policy.
    #[must_use]
    pub fn with_expiration(mut self, mode: ExpirationMode, timeout: Duration) -> Self {
        self.expiration_mode = mode;
        self.expiration_timeout = timeout;
        self
    }

    /// Enables or disables statistics for this handle.
    #[must_use]
    pub fn with_statistics(mut self, enabled: bool) -> Self {
        self.enable_statistics = enabled;
        self
    }

    /// Enables or disables performance counters.
    ///
    /// Performance counters require statistics, so enabling them forces
    /// statistics on.
    #[must_use]
    pub fn with_performance_counters(mut self, enabled: bool) -> Self {
        self.enable_performance_counters = enabled;
        self
    }

    /// Marks this handle as the backplane source: the layer whose writes are
    /// considered the origin of this node's change notifications.
    #[must_use]
    pub fn with_backplane_source(mut self, source: bool) -> Self {
        self.is_backplane_source = source;
        self
    }

    /// Returns the handle name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the configuration key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the handle's default expiration mode.
    #[must_use]
    pub fn expiration_mode(&self) -> ExpirationMode {
        self.expiration_mode
    }

    /// Returns the handle's default expiration timeout.
    #[must_use]
    pub fn expiration_timeout(&self) -> Duration {
        self.expiration_timeout
    }

    /// Returns true if statistics are enabled, directly or because
    /// performance counters require them.
    #[must_use]
    pub fn statistics_enabled(&self) -> bool {
        self.enable_statistics || self.enable_performance_counters
    }

    /// Returns true if performance counters are enabled.
    #[must_use]
    pub fn performance_counters_enabled(&self) -> bool {
        self.enable_performance_counters
    }

    /// Returns true if this handle is the backplane source.
    #[must_use]
    pub fn is_backplane_source(&self) -> bool {
        self.is_backplane_source
    }

    /// Checks the configuration for structural problems.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidArgument`] on an empty name or an expiration
    /// default that pairs a mode with an impossible timeout.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(CacheError::InvalidArgument(
                "handle name must not be empty",
            ));
        }
        match self.expiration_mode {
            ExpirationMode::Sliding | ExpirationMode::Absolute
                if self.expiration_timeout.is_zero() =>
            {
                Err(CacheError::InvalidArgument(
                    "a handle expiration default requires a timeout greater than zero",
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Trait for cache storage layers.
///
/// Implementations must be safe for concurrent callers. Before storing an
/// item, `add` and `put` must apply the expiration resolution rule of
/// [`resolve_item_expiration`](crate::expiry::resolve_item_expiration) so
/// that handle defaults take effect.
///
/// A successful `get` refreshes the item's last-accessed timestamp.
pub trait CacheHandle<K, V>: Send + Sync {
    /// Returns this handle's configuration.
    fn config(&self) -> &HandleConfig;

    /// Returns this handle's statistics counters.
    fn stats(&self) -> &HandleStats;

    /// Returns true if the backend is shared between nodes (for example a
    /// distributed key-value store). The coordinator uses this to decide
    /// which layers a remote notification still needs to invalidate.
    fn is_distributed(&self) -> bool {
        false
    }

    /// Stores the item only if the key is not present. Returns true if the
    /// item was stored.
    fn add(&self, item: CacheItem<K, V>) -> Result<bool>;

    /// Returns the item for `key`, or `None` when absent or expired.
    fn get(&self, key: &K) -> Result<Option<CacheItem<K, V>>>;

    /// Stores the item unconditionally, replacing any existing entry.
    fn put(&self, item: CacheItem<K, V>) -> Result<()>;

    /// Removes the entry for `key`. Returns true if an entry was removed.
    fn remove(&self, key: &K) -> Result<bool>;

    /// Removes all entries.
    fn clear(&self) -> Result<()>;

    /// Returns true if a live (non-expired) entry exists for `key`, without
    /// refreshing its last-accessed timestamp.
    fn exists(&self, key: &K) -> Result<bool>;

    /// Returns the number of stored entries.
    fn count(&self) -> u64;

    /// Atomically applies `factory` to the cached value.
    ///
    /// Backends with optimistic concurrency retry up to `max_retries` times
    /// and report [`UpdateOutcome::TooManyRetries`] on exhaustion; a backend
    /// that serializes updates locally succeeds in one try.
    fn update(
        &self,
        key: &K,
        factory: UpdateFactory<'_, V>,
        max_retries: u32,
    ) -> Result<UpdateOutcome<K, V>>;

    /// Registers or clears the observer for removals the handle decides on
    /// its own (expiration, eviction). At most one listener is active.
    fn set_removal_listener(&self, listener: Option<RemovalListener<K, V>>);
}
