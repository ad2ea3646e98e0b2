// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Outcomes of a retry-bounded read-modify-write.

use crate::item::CacheItem;

/// The outcome of a [`CacheHandle::update`](crate::CacheHandle::update) call.
#[derive(Clone, Debug)]
pub enum UpdateOutcome<K, V> {
    /// The update was applied.
    Success {
        /// The item as written to the backend.
        item: CacheItem<K, V>,
        /// How many attempts the backend needed.
        tries: u32,
    },
    /// The factory declined to produce a value; nothing was written.
    FactoryReturnedNone,
    /// No entry exists for the key; nothing was written.
    ItemDidNotExist,
    /// The backend exhausted its optimistic retries without winning the
    /// write race.
    TooManyRetries {
        /// How many attempts were made before giving up.
        tries: u32,
    },
}

impl<K, V> UpdateOutcome<K, V> {
    /// Returns true if the update was applied.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}
