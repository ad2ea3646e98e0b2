// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for constructing a multi-tier cache.

use std::sync::Arc;
use std::time::Duration;

use strata_core::{Backplane, CacheHandle, Clock, Result};

use crate::Cache;
use crate::config::{CacheConfig, UpdateMode};

#[cfg(feature = "memory")]
use std::hash::Hash;
#[cfg(feature = "memory")]
use strata_core::HandleConfig;
#[cfg(feature = "memory")]
use strata_memory::InMemoryHandle;

/// Builder for a [`Cache`].
///
/// Handles are layered in the order they are given: the first is the front
/// (fastest, consulted first), the last is the back (authoritative).
///
/// # Examples
///
/// ```
/// use strata::{Cache, Clock};
///
/// let clock = Clock::new_frozen();
/// let cache = Cache::builder::<String, i32>(clock)
///     .name("two-tier")
///     .memory()
///     .memory()
///     .build()?;
/// assert_eq!(cache.handles().len(), 2);
/// # Ok::<(), strata::CacheError>(())
/// ```
pub struct CacheBuilder<K, V> {
    pub(crate) clock: Clock,
    pub(crate) config: CacheConfig,
    pub(crate) handles: Vec<Arc<dyn CacheHandle<K, V>>>,
    pub(crate) backplane: Option<Arc<dyn Backplane<K>>>,
}

impl<K, V> CacheBuilder<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(clock: Clock) -> Self {
        Self {
            clock,
            config: CacheConfig::default(),
            handles: Vec::new(),
            backplane: None,
        }
    }

    /// Sets the cache name, used in logging.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Sets how handle-side evictions propagate to other layers.
    #[must_use]
    pub fn update_mode(mut self, mode: UpdateMode) -> Self {
        self.config.update_mode = mode;
        self
    }

    /// Sets the default retry bound for update loops.
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    /// Sets the delay distributed handles should leave between
    /// optimistic-retry attempts.
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    /// Appends a storage layer. Order matters: earlier handles are consulted
    /// first on reads, the last handle is the authoritative one.
    #[must_use]
    pub fn handle(mut self, handle: impl CacheHandle<K, V> + 'static) -> Self {
        self.handles.push(Arc::new(handle));
        self
    }

    /// Appends an already shared storage layer.
    #[must_use]
    pub fn shared_handle(mut self, handle: Arc<dyn CacheHandle<K, V>>) -> Self {
        self.handles.push(handle);
        self
    }

    /// Appends an in-memory layer with default configuration, sharing this
    /// builder's clock.
    #[cfg(feature = "memory")]
    #[must_use]
    pub fn memory(self) -> Self
    where
        K: Eq + Hash,
    {
        let clock = self.clock.clone();
        self.handle(InMemoryHandle::builder().clock(clock).build())
    }

    /// Appends an in-memory layer with the given configuration, sharing this
    /// builder's clock.
    #[cfg(feature = "memory")]
    #[must_use]
    pub fn memory_with(self, config: HandleConfig) -> Self
    where
        K: Eq + Hash,
    {
        let clock = self.clock.clone();
        self.handle(InMemoryHandle::builder().config(config).clock(clock).build())
    }

    /// Sets the cross-node notification channel.
    ///
    /// Exactly one handle must then be marked as the backplane source.
    #[must_use]
    pub fn backplane(mut self, backplane: impl Backplane<K> + 'static) -> Self {
        self.backplane = Some(Arc::new(backplane));
        self
    }

    /// Builds the cache and wires handle and backplane events.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvariantViolation`](strata_core::CacheError::InvariantViolation)
    /// when no handle was configured, more than one handle claims to be the
    /// backplane source, or a backplane was configured without a source
    /// handle; [`CacheError::InvalidArgument`](strata_core::CacheError::InvalidArgument)
    /// when a handle configuration is malformed.
    pub fn build(self) -> Result<Cache<K, V>> {
        Cache::from_builder(self)
    }
}
