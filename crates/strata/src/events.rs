// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! User-facing cache events.
//!
//! The coordinator raises one event per completed operation, after all
//! per-handle work and after the backplane notification. Listeners run on
//! the calling thread (or, for remote-origin events, on the thread the
//! backplane delivers on) and should return quickly.

use std::sync::Arc;

use strata_core::RemovalReason;

/// Whether an event was caused by a direct API call on this node or by a
/// backplane notification from another node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventOrigin {
    /// A direct API call on this node.
    Local,
    /// A notification from another node.
    Remote,
}

/// An event raised by a [`Cache`](crate::Cache).
#[derive(Clone, Debug)]
pub enum CacheEvent<K, V> {
    /// A key was added.
    Add {
        /// The added key.
        key: K,
        /// Where the add happened.
        origin: EventOrigin,
    },
    /// A key was written unconditionally.
    Put {
        /// The written key.
        key: K,
        /// Where the put happened.
        origin: EventOrigin,
    },
    /// A key was read successfully.
    Get {
        /// The read key.
        key: K,
        /// Always local; reads are not broadcast.
        origin: EventOrigin,
    },
    /// A key was removed by a caller.
    Remove {
        /// The removed key.
        key: K,
        /// Where the remove happened.
        origin: EventOrigin,
    },
    /// A key's value was updated in place.
    Update {
        /// The updated key.
        key: K,
        /// Where the update happened.
        origin: EventOrigin,
    },
    /// The cache was cleared.
    Clear {
        /// Where the clear happened.
        origin: EventOrigin,
    },
    /// A handle dropped a key on its own (expiration, eviction).
    RemoveByHandle {
        /// The dropped key.
        key: K,
        /// Why the handle dropped it.
        reason: RemovalReason,
        /// The handle's position, as its index plus one.
        level: usize,
        /// The dropped value, if the backend still had it.
        value: Option<V>,
    },
}

impl<K, V> CacheEvent<K, V> {
    /// Returns the event's key, if it has one.
    #[must_use]
    pub fn key(&self) -> Option<&K> {
        match self {
            Self::Add { key, .. }
            | Self::Put { key, .. }
            | Self::Get { key, .. }
            | Self::Remove { key, .. }
            | Self::Update { key, .. }
            | Self::RemoveByHandle { key, .. } => Some(key),
            Self::Clear { .. } => None,
        }
    }

    /// Returns the event's origin; handle-side removals are always local.
    #[must_use]
    pub fn origin(&self) -> EventOrigin {
        match self {
            Self::Add { origin, .. }
            | Self::Put { origin, .. }
            | Self::Get { origin, .. }
            | Self::Remove { origin, .. }
            | Self::Update { origin, .. }
            | Self::Clear { origin } => *origin,
            Self::RemoveByHandle { .. } => EventOrigin::Local,
        }
    }
}

/// Observer for [`CacheEvent`]s.
pub type CacheEventListener<K, V> = Arc<dyn Fn(&CacheEvent<K, V>) + Send + Sync>;
