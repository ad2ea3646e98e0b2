// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for configuring an in-memory handle.

use std::hash::Hash;
use std::marker::PhantomData;
use std::time::Duration;

use strata_core::{Clock, HandleConfig};

use crate::handle::InMemoryHandle;

/// How often the expiration scanner sweeps by default.
pub(crate) const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(5000);

/// Builder for an [`InMemoryHandle`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use strata_core::{Clock, ExpirationMode, HandleConfig};
/// use strata_memory::InMemoryHandle;
///
/// let handle = InMemoryHandle::<String, i32>::builder()
///     .config(HandleConfig::new("l1").with_expiration(
///         ExpirationMode::Sliding,
///         Duration::from_secs(300),
///     ))
///     .clock(Clock::system())
///     .sweep_interval(Duration::from_secs(10))
///     .build();
/// ```
#[derive(Debug)]
pub struct InMemoryHandleBuilder<K, V> {
    pub(crate) config: HandleConfig,
    pub(crate) clock: Clock,
    pub(crate) sweep_interval: Duration,
    _phantom: PhantomData<(K, V)>,
}

impl<K, V> InMemoryHandleBuilder<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            config: HandleConfig::new("memory"),
            clock: Clock::system(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            _phantom: PhantomData,
        }
    }

    /// Sets the handle configuration (name, expiration defaults,
    /// statistics, backplane-source flag).
    #[must_use]
    pub fn config(mut self, config: HandleConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the clock used for expiration checks.
    ///
    /// Frozen clocks make expiry deterministic in tests.
    #[must_use]
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Sets how often the expiration scanner sweeps. Defaults to five
    /// seconds; the first sweep is jittered so handles constructed together
    /// do not sweep together.
    #[must_use]
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Builds the handle and starts its expiration scanner.
    #[must_use]
    pub fn build(self) -> InMemoryHandle<K, V>
    where
        K: Clone + Eq + Hash + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        InMemoryHandle::from_builder(self)
    }
}

impl<K, V> Default for InMemoryHandleBuilder<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
