// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The cache item: a value plus its timestamps and expiration policy.
//!
//! A [`CacheItem`] is immutable except for its last-accessed timestamp, which
//! a successful read refreshes. All other changes go through the `with_`
//! factories, which return new instances.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::clock::{from_unix_nanos, unix_nanos};
use crate::error::{CacheError, Result};

/// The largest accepted expiration timeout (one year).
pub const MAX_EXPIRATION_TIMEOUT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// How a cached item expires.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpirationMode {
    /// The item never expires.
    None,
    /// The item expires a fixed duration after its last access.
    Sliding,
    /// The item expires a fixed duration after its creation.
    Absolute,
    /// The item inherits the expiration configured on the handle storing it.
    #[default]
    Default,
}

/// A cached value with its key, timestamps, and expiration policy.
///
/// The last-accessed timestamp is shared between clones of the same item, so
/// refreshing it on a copy handed out by a storage layer is visible to the
/// copy the layer keeps. This mirrors sliding expiration semantics without a
/// lock: the deadline moves for every holder at once.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use strata_core::{CacheItem, ExpirationMode};
///
/// let item = CacheItem::new("key".to_string(), 42);
/// assert_eq!(item.expiration_mode(), ExpirationMode::Default);
///
/// let item = item.with_sliding_expiration(Duration::from_secs(60))?;
/// assert_eq!(item.expiration_mode(), ExpirationMode::Sliding);
/// # Ok::<(), strata_core::CacheError>(())
/// ```
pub struct CacheItem<K, V> {
    key: K,
    value: V,
    created: SystemTime,
    /// Nanoseconds since the Unix epoch; the one mutable field.
    last_accessed: Arc<AtomicU64>,
    expiration_mode: ExpirationMode,
    expiration_timeout: Duration,
    uses_default_expiration: bool,
}

impl<K, V> CacheItem<K, V> {
    /// Creates an item that inherits the storing handle's expiration
    /// defaults. Timestamps are set to the current system time.
    pub fn new(key: K, value: V) -> Self {
        Self::new_at(key, value, SystemTime::now())
    }

    /// Creates an item with explicit timestamps, for callers that read time
    /// through a [`Clock`](crate::Clock).
    pub fn new_at(key: K, value: V, now: SystemTime) -> Self {
        Self {
            key,
            value,
            created: now,
            last_accessed: Arc::new(AtomicU64::new(unix_nanos(now))),
            expiration_mode: ExpirationMode::Default,
            expiration_timeout: Duration::ZERO,
            uses_default_expiration: true,
        }
    }

    /// Creates an item with an explicit expiration policy.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidArgument`] if the timeout is out of range for the
    /// mode: sliding and absolute expiration require a timeout in
    /// (0, [`MAX_EXPIRATION_TIMEOUT`]], while none and default require zero.
    pub fn new_with_expiration(
        key: K,
        value: V,
        mode: ExpirationMode,
        timeout: Duration,
    ) -> Result<Self> {
        validate_expiration(mode, timeout)?;
        let mut item = Self::new(key, value);
        item.expiration_mode = mode;
        item.expiration_timeout = timeout;
        item.uses_default_expiration = mode == ExpirationMode::Default;
        Ok(item)
    }

    /// Returns the item's key.
    #[must_use]
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Returns a reference to the cached value.
    #[must_use]
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Consumes the item and returns the cached value.
    #[must_use]
    pub fn into_value(self) -> V {
        self.value
    }

    /// Returns the creation timestamp (UTC).
    #[must_use]
    pub fn created(&self) -> SystemTime {
        self.created
    }

    /// Returns the last-accessed timestamp (UTC).
    #[must_use]
    pub fn last_accessed(&self) -> SystemTime {
        from_unix_nanos(self.last_accessed.load(Ordering::Acquire))
    }

    /// Refreshes the last-accessed timestamp.
    ///
    /// Shared between clones: every holder of this item observes the new
    /// timestamp, which is what restarts a sliding expiration window.
    pub fn touch(&self, now: SystemTime) {
        self.last_accessed.store(unix_nanos(now), Ordering::Release);
    }

    /// Returns the expiration mode.
    #[must_use]
    pub fn expiration_mode(&self) -> ExpirationMode {
        self.expiration_mode
    }

    /// Returns the expiration timeout.
    #[must_use]
    pub fn expiration_timeout(&self) -> Duration {
        self.expiration_timeout
    }

    /// Returns true if the item inherits the storing handle's expiration.
    #[must_use]
    pub fn uses_default_expiration(&self) -> bool {
        self.uses_default_expiration
    }

    /// Returns true if the item has passed its expiration deadline.
    ///
    /// Absolute items expire at `created + timeout`, sliding items at
    /// `last_accessed + timeout`; both deadlines are inclusive.
    #[must_use]
    pub fn is_expired(&self, now: SystemTime) -> bool {
        match self.expiration_mode {
            ExpirationMode::Absolute => self.created + self.expiration_timeout <= now,
            ExpirationMode::Sliding => self.last_accessed() + self.expiration_timeout <= now,
            ExpirationMode::None | ExpirationMode::Default => false,
        }
    }
}

impl<K, V> CacheItem<K, V>
where
    K: Clone,
    V: Clone,
{
    /// Returns a copy carrying `value`; everything else is preserved.
    #[must_use]
    pub fn with_value(&self, value: V) -> Self {
        Self {
            value,
            ..self.snapshot()
        }
    }

    /// Returns a copy created at `created`; the last-accessed timestamp is
    /// preserved.
    #[must_use]
    pub fn with_created(&self, created: SystemTime) -> Self {
        Self {
            created,
            ..self.snapshot()
        }
    }

    /// Returns a copy with the given expiration policy.
    ///
    /// `uses_default` marks the copy as carrying a handle default rather
    /// than an explicit per-item choice, which matters when the item is
    /// later stored by a handle with different defaults.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidArgument`] on an out-of-range timeout.
    pub fn with_expiration(
        &self,
        mode: ExpirationMode,
        timeout: Duration,
        uses_default: bool,
    ) -> Result<Self> {
        validate_expiration(mode, timeout)?;
        let mut item = self.snapshot();
        item.expiration_mode = mode;
        item.expiration_timeout = timeout;
        item.uses_default_expiration = uses_default;
        Ok(item)
    }

    /// Returns a copy that expires `timeout` after `now`.
    ///
    /// The creation timestamp is reset to `now`: the absolute clock restarts.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidArgument`] on an out-of-range timeout.
    pub fn with_absolute_expiration(&self, timeout: Duration, now: SystemTime) -> Result<Self> {
        let item = self.with_expiration(ExpirationMode::Absolute, timeout, false)?;
        Ok(item.with_created(now))
    }

    /// Returns a copy that expires `timeout` after its last access.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidArgument`] on an out-of-range timeout.
    pub fn with_sliding_expiration(&self, timeout: Duration) -> Result<Self> {
        self.with_expiration(ExpirationMode::Sliding, timeout, false)
    }

    /// Returns a copy that never expires.
    #[must_use]
    pub fn with_no_expiration(&self) -> Self {
        let mut item = self.snapshot();
        item.expiration_mode = ExpirationMode::None;
        item.expiration_timeout = Duration::ZERO;
        item.uses_default_expiration = false;
        item
    }

    /// Returns a copy that inherits the storing handle's expiration again.
    #[must_use]
    pub fn with_default_expiration(&self) -> Self {
        let mut item = self.snapshot();
        item.expiration_mode = ExpirationMode::Default;
        item.expiration_timeout = Duration::ZERO;
        item.uses_default_expiration = true;
        item
    }

    /// Copies all fields with a detached last-accessed timestamp.
    ///
    /// Unlike `clone`, the copy no longer shares touches with the original.
    fn snapshot(&self) -> Self {
        Self {
            key: self.key.clone(),
            value: self.value.clone(),
            created: self.created,
            last_accessed: Arc::new(AtomicU64::new(self.last_accessed.load(Ordering::Acquire))),
            expiration_mode: self.expiration_mode,
            expiration_timeout: self.expiration_timeout,
            uses_default_expiration: self.uses_default_expiration,
        }
    }

    /// Rebuilds an item from previously captured state, preserving both
    /// timestamps. Used when decoding the serializer carrier.
    pub(crate) fn from_captured(
        key: K,
        value: V,
        created: SystemTime,
        last_accessed: SystemTime,
        mode: ExpirationMode,
        timeout: Duration,
        uses_default: bool,
    ) -> Result<Self> {
        validate_expiration(mode, timeout)?;
        Ok(Self {
            key,
            value,
            created,
            last_accessed: Arc::new(AtomicU64::new(unix_nanos(last_accessed))),
            expiration_mode: mode,
            expiration_timeout: timeout,
            uses_default_expiration: uses_default,
        })
    }
}

fn validate_expiration(mode: ExpirationMode, timeout: Duration) -> Result<()> {
    if timeout > MAX_EXPIRATION_TIMEOUT {
        return Err(CacheError::InvalidArgument(
            "expiration timeout must not exceed 365 days",
        ));
    }
    match mode {
        ExpirationMode::Sliding | ExpirationMode::Absolute if timeout.is_zero() => {
            Err(CacheError::InvalidArgument(
                "sliding and absolute expiration require a timeout greater than zero",
            ))
        }
        ExpirationMode::None | ExpirationMode::Default if !timeout.is_zero() => {
            Err(CacheError::InvalidArgument(
                "an expiration timeout requires a sliding or absolute mode",
            ))
        }
        _ => Ok(()),
    }
}

impl<K: Clone, V: Clone> Clone for CacheItem<K, V> {
    /// Clones share the last-accessed timestamp; use a `with_` factory for a
    /// detached copy.
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            value: self.value.clone(),
            created: self.created,
            last_accessed: Arc::clone(&self.last_accessed),
            expiration_mode: self.expiration_mode,
            expiration_timeout: self.expiration_timeout,
            uses_default_expiration: self.uses_default_expiration,
        }
    }
}

impl<K: PartialEq, V: PartialEq> PartialEq for CacheItem<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
            && self.value == other.value
            && self.created == other.created
            && self.last_accessed() == other.last_accessed()
            && self.expiration_mode == other.expiration_mode
            && self.expiration_timeout == other.expiration_timeout
            && self.uses_default_expiration == other.uses_default_expiration
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for CacheItem<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheItem")
            .field("key", &self.key)
            .field("value", &self.value)
            .field("created", &self.created)
            .field("last_accessed", &self.last_accessed())
            .field("expiration_mode", &self.expiration_mode)
            .field("expiration_timeout", &self.expiration_timeout)
            .field("uses_default_expiration", &self.uses_default_expiration)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> CacheItem<String, String> {
        CacheItem::new("k".to_string(), "v".to_string())
    }

    #[test]
    fn new_item_inherits_defaults() {
        let item = item();
        assert_eq!(item.expiration_mode(), ExpirationMode::Default);
        assert_eq!(item.expiration_timeout(), Duration::ZERO);
        assert!(item.uses_default_expiration());
        assert_eq!(item.created(), item.last_accessed());
    }

    #[test]
    fn explicit_expiration_clears_defaults_flag() {
        let item = CacheItem::new_with_expiration(
            "k".to_string(),
            1,
            ExpirationMode::Sliding,
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(!item.uses_default_expiration());
    }

    #[test]
    fn zero_timeout_rejected_for_sliding_and_absolute() {
        for mode in [ExpirationMode::Sliding, ExpirationMode::Absolute] {
            let result =
                CacheItem::new_with_expiration("k".to_string(), 1, mode, Duration::ZERO);
            assert!(matches!(result, Err(CacheError::InvalidArgument(_))));
        }
    }

    #[test]
    fn nonzero_timeout_rejected_for_none_and_default() {
        for mode in [ExpirationMode::None, ExpirationMode::Default] {
            let result =
                CacheItem::new_with_expiration("k".to_string(), 1, mode, Duration::from_secs(1));
            assert!(matches!(result, Err(CacheError::InvalidArgument(_))));
        }
    }

    #[test]
    fn oversized_timeout_rejected() {
        let result = CacheItem::new_with_expiration(
            "k".to_string(),
            1,
            ExpirationMode::Absolute,
            MAX_EXPIRATION_TIMEOUT + Duration::from_secs(1),
        );
        assert!(matches!(result, Err(CacheError::InvalidArgument(_))));
    }

    #[test]
    fn absolute_expiry_is_inclusive_at_the_deadline() {
        let now = SystemTime::now();
        let item = CacheItem::new_at("k".to_string(), 1, now)
            .with_absolute_expiration(Duration::from_millis(100), now)
            .unwrap();

        assert!(!item.is_expired(now + Duration::from_millis(99)));
        assert!(item.is_expired(now + Duration::from_millis(100)));
        assert!(item.is_expired(now + Duration::from_millis(500)));
    }

    #[test]
    fn sliding_expiry_follows_last_access() {
        let now = SystemTime::now();
        let item = CacheItem::new_at("k".to_string(), 1, now)
            .with_sliding_expiration(Duration::from_millis(200))
            .unwrap();

        assert!(!item.is_expired(now + Duration::from_millis(150)));
        item.touch(now + Duration::from_millis(150));
        assert!(!item.is_expired(now + Duration::from_millis(300)));
        assert!(item.is_expired(now + Duration::from_millis(350)));
    }

    #[test]
    fn touch_is_visible_through_clones() {
        let now = SystemTime::now();
        let original = CacheItem::new_at("k".to_string(), 1, now);
        let clone = original.clone();

        let later = now + Duration::from_secs(10);
        clone.touch(later);
        assert_eq!(original.last_accessed(), later);
    }

    #[test]
    fn with_factories_detach_last_accessed() {
        let now = SystemTime::now();
        let original = CacheItem::new_at("k".to_string(), 1, now);
        let copy = original.with_value(2);

        original.touch(now + Duration::from_secs(10));
        assert_eq!(copy.last_accessed(), now);
        assert_eq!(*copy.value(), 2);
    }

    #[test]
    fn with_absolute_expiration_restarts_the_clock() {
        let created = SystemTime::now();
        let item = CacheItem::new_at("k".to_string(), 1, created);

        let later = created + Duration::from_secs(30);
        let expiring = item
            .with_absolute_expiration(Duration::from_secs(60), later)
            .unwrap();
        assert_eq!(expiring.created(), later);

        let sliding = item.with_sliding_expiration(Duration::from_secs(60)).unwrap();
        assert_eq!(sliding.created(), created);
    }

    #[test]
    fn with_no_expiration_clears_policy() {
        let item = CacheItem::new_with_expiration(
            "k".to_string(),
            1,
            ExpirationMode::Absolute,
            Duration::from_secs(60),
        )
        .unwrap();
        let cleared = item.with_no_expiration();
        assert_eq!(cleared.expiration_mode(), ExpirationMode::None);
        assert_eq!(cleared.expiration_timeout(), Duration::ZERO);
        assert!(!cleared.is_expired(SystemTime::now() + Duration::from_secs(3600)));
    }
}
