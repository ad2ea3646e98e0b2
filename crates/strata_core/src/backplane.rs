// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The cross-node invalidation channel.
//!
//! A [`Backplane`] fans a node's cache changes out to other nodes so their
//! layers can drop stale copies. Delivery is best-effort and at-most-once
//! per local call; ordering across keys is not guaranteed. The coordinator
//! is the only subscriber.

use std::sync::Arc;

use crate::error::Result;

/// The kind of write behind an outbound change notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeAction {
    /// The key was added.
    Add,
    /// The key was written unconditionally.
    Put,
    /// The key's value was updated in place.
    Update,
}

/// A notification received from another node.
#[derive(Clone, Debug)]
pub enum BackplaneEvent<K> {
    /// A key changed on another node.
    Changed {
        /// The changed key.
        key: K,
        /// What kind of write happened.
        action: ChangeAction,
    },
    /// A key was removed on another node.
    Removed {
        /// The removed key.
        key: K,
    },
    /// Another node cleared its cache.
    Cleared,
}

/// Observer for inbound [`BackplaneEvent`]s.
pub type BackplaneListener<K> = Arc<dyn Fn(BackplaneEvent<K>) + Send + Sync>;

/// Trait for cross-node notification channels.
///
/// Implementations deliver inbound events on whatever thread the transport
/// uses; subscribers must not assume any particular one. A notify call that
/// fails is logged by the coordinator and never fails the local operation
/// that already committed.
pub trait Backplane<K>: Send + Sync {
    /// Announces that `key` changed on this node.
    fn notify_change(&self, key: &K, action: ChangeAction) -> Result<()>;

    /// Announces that `key` was removed on this node.
    fn notify_remove(&self, key: &K) -> Result<()>;

    /// Announces that this node cleared its cache.
    fn notify_clear(&self) -> Result<()>;

    /// Registers an observer for events from other nodes.
    fn subscribe(&self, listener: BackplaneListener<K>);
}
