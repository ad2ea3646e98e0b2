// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Expiration resolution applied by every handle before storing an item.

use std::time::Duration;

use crate::error::{CacheError, Result};
use crate::handle::HandleConfig;
use crate::item::{CacheItem, ExpirationMode};

/// Computes the effective expiration for an item entering a handle.
///
/// A per-item policy wins over the handle default; a handle default wins
/// over nothing. In detail: if the item carries its own policy (it does not
/// use defaults and its mode is not [`ExpirationMode::Default`]) the item is
/// stored as-is. Otherwise, a configured handle default is applied and the
/// item is marked as carrying a default. With neither, the item falls back
/// to no expiration.
///
/// # Errors
///
/// [`CacheError::InvariantViolation`] if the resolved policy pairs a sliding
/// or absolute mode with a zero timeout.
pub fn resolve_item_expiration<K, V>(
    item: CacheItem<K, V>,
    config: &HandleConfig,
) -> Result<CacheItem<K, V>>
where
    K: Clone,
    V: Clone,
{
    let (mode, timeout, from_defaults) =
        if !item.uses_default_expiration() && item.expiration_mode() != ExpirationMode::Default {
            (item.expiration_mode(), item.expiration_timeout(), false)
        } else if config.expiration_mode() != ExpirationMode::Default {
            (config.expiration_mode(), config.expiration_timeout(), true)
        } else {
            (ExpirationMode::None, Duration::ZERO, true)
        };

    if matches!(mode, ExpirationMode::Sliding | ExpirationMode::Absolute) && timeout.is_zero() {
        return Err(CacheError::invariant(format!(
            "handle '{}' resolved a {mode:?} expiration with a zero timeout",
            config.name()
        )));
    }

    if mode == item.expiration_mode()
        && timeout == item.expiration_timeout()
        && from_defaults == item.uses_default_expiration()
    {
        return Ok(item);
    }
    item.with_expiration(mode, timeout, from_defaults)
}
