// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Coordinator configuration.

use std::time::Duration;

/// Default bound on retry loops (update, add-or-update, get-or-add).
pub const DEFAULT_MAX_RETRIES: u32 = 50;

/// Default delay a distributed handle should leave between optimistic
/// retries.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// How an eviction decided inside one handle propagates to the others.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UpdateMode {
    /// Do not propagate.
    None,
    /// Evict the key from every handle in front of the one that dropped it,
    /// so faster layers cannot serve a copy the slower layer gave up on.
    #[default]
    Up,
    /// Evict the key from every other handle.
    Full,
}

/// Configuration of a [`Cache`](crate::Cache).
#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub(crate) name: String,
    pub(crate) update_mode: UpdateMode,
    pub(crate) max_retries: u32,
    pub(crate) retry_delay: Duration,
}

impl CacheConfig {
    /// Returns the cache name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the eviction propagation mode.
    #[must_use]
    pub fn update_mode(&self) -> UpdateMode {
        self.update_mode
    }

    /// Returns the default retry bound for update loops.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns the delay distributed handles should leave between
    /// optimistic-retry attempts.
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: "cache".to_string(),
            update_mode: UpdateMode::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}
