// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A serializer-neutral carrier for cache items.
//!
//! Serializers for distributed backends work with [`CacheItemSnapshot`]
//! instead of [`CacheItem`] directly: a plain, serde-derived record that
//! freezes both timestamps so a decoded item keeps its original creation and
//! last-access times (and with them its expiration deadline).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::clock::unix_nanos;
use crate::error::Result;
use crate::item::{CacheItem, ExpirationMode};

/// One tick is 100 nanoseconds, counted from the Unix epoch.
const NANOS_PER_TICK: u64 = 100;

/// A flattened cache item ready for serialization.
///
/// The `value_type` tag is opaque to the cache; serializers that need a type
/// hint for decoding can use it, everyone else can ignore it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheItemSnapshot<K, V> {
    /// The item key.
    pub key: K,
    /// The item value.
    pub value: V,
    /// An opaque tag describing the value type.
    pub value_type: String,
    /// Creation time in 100 ns ticks since the Unix epoch.
    pub created_ticks: u64,
    /// Last-access time in 100 ns ticks since the Unix epoch.
    pub last_accessed_ticks: u64,
    /// The expiration mode.
    pub expiration_mode: ExpirationMode,
    /// The expiration timeout in milliseconds.
    pub expiration_timeout_ms: u64,
    /// True if the item inherits the storing handle's expiration.
    pub uses_default_expiration: bool,
}

impl<K, V> CacheItemSnapshot<K, V>
where
    K: Clone,
    V: Clone,
{
    /// Captures an item into its serializable form.
    #[must_use]
    pub fn capture(item: &CacheItem<K, V>) -> Self {
        Self {
            key: item.key().clone(),
            value: item.value().clone(),
            value_type: std::any::type_name::<V>().to_string(),
            created_ticks: to_ticks(item.created()),
            last_accessed_ticks: to_ticks(item.last_accessed()),
            expiration_mode: item.expiration_mode(),
            expiration_timeout_ms: u64::try_from(item.expiration_timeout().as_millis())
                .unwrap_or(u64::MAX),
            uses_default_expiration: item.uses_default_expiration(),
        }
    }

    /// Rebuilds the cache item, preserving the captured timestamps.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidArgument`](crate::CacheError::InvalidArgument)
    /// if the snapshot carries an impossible mode/timeout pairing.
    pub fn into_item(self) -> Result<CacheItem<K, V>> {
        CacheItem::from_captured(
            self.key,
            self.value,
            from_ticks(self.created_ticks),
            from_ticks(self.last_accessed_ticks),
            self.expiration_mode,
            Duration::from_millis(self.expiration_timeout_ms),
            self.uses_default_expiration,
        )
    }
}

fn to_ticks(time: SystemTime) -> u64 {
    unix_nanos(time) / NANOS_PER_TICK
}

fn from_ticks(ticks: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_nanos(ticks.saturating_mul(NANOS_PER_TICK))
}
