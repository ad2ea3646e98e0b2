// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! An in-process reference backplane.
//!
//! [`BackplaneHub`] links several caches living in the same process, which
//! is the reference topology for the backplane contract and what the
//! multi-node tests run against. Real deployments implement
//! [`Backplane`](strata_core::Backplane) over a message transport instead.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use strata_core::{Backplane, BackplaneEvent, BackplaneListener, ChangeAction, Result};

/// Links the [`InProcessBackplane`] nodes created from it.
///
/// A notification sent through one node is delivered synchronously to every
/// other node; the sender never hears its own notifications back.
///
/// # Examples
///
/// ```
/// use strata::backplane::BackplaneHub;
/// use strata::{Backplane, ChangeAction};
///
/// let hub = BackplaneHub::<String>::new();
/// let node_a = hub.connect();
/// let node_b = hub.connect();
///
/// node_b.subscribe(std::sync::Arc::new(|event| {
///     println!("node b saw {event:?}");
/// }));
/// node_a.notify_change(&"key".to_string(), ChangeAction::Put)?;
/// # Ok::<(), strata::CacheError>(())
/// ```
pub struct BackplaneHub<K> {
    nodes: RwLock<Vec<Weak<NodeState<K>>>>,
}

struct NodeState<K> {
    listeners: RwLock<Vec<BackplaneListener<K>>>,
}

impl<K> BackplaneHub<K>
where
    K: Clone + Send + Sync + 'static,
{
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            nodes: RwLock::new(Vec::new()),
        })
    }

    /// Creates a new node attached to this hub.
    #[must_use]
    pub fn connect(self: &Arc<Self>) -> InProcessBackplane<K> {
        let node = Arc::new(NodeState {
            listeners: RwLock::new(Vec::new()),
        });
        self.nodes.write().push(Arc::downgrade(&node));
        InProcessBackplane {
            hub: Arc::clone(self),
            node,
        }
    }

    fn broadcast(&self, sender: &Arc<NodeState<K>>, event: &BackplaneEvent<K>) {
        let receivers: Vec<Arc<NodeState<K>>> = {
            let mut nodes = self.nodes.write();
            nodes.retain(|node| node.strong_count() > 0);
            nodes.iter().filter_map(Weak::upgrade).collect()
        };
        // Listeners run outside the hub lock, on the sender's thread.
        for receiver in receivers {
            if Arc::ptr_eq(&receiver, sender) {
                continue;
            }
            let listeners = receiver.listeners.read().clone();
            for listener in &listeners {
                listener(event.clone());
            }
        }
    }
}

/// One node's connection to a [`BackplaneHub`].
pub struct InProcessBackplane<K> {
    hub: Arc<BackplaneHub<K>>,
    node: Arc<NodeState<K>>,
}

impl<K> std::fmt::Debug for InProcessBackplane<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessBackplane")
            .field("peers", &self.hub.nodes.read().len())
            .finish_non_exhaustive()
    }
}

impl<K> Backplane<K> for InProcessBackplane<K>
where
    K: Clone + Send + Sync + 'static,
{
    fn notify_change(&self, key: &K, action: ChangeAction) -> Result<()> {
        self.hub.broadcast(
            &self.node,
            &BackplaneEvent::Changed {
                key: key.clone(),
                action,
            },
        );
        Ok(())
    }

    fn notify_remove(&self, key: &K) -> Result<()> {
        self.hub
            .broadcast(&self.node, &BackplaneEvent::Removed { key: key.clone() });
        Ok(())
    }

    fn notify_clear(&self) -> Result<()> {
        self.hub.broadcast(&self.node, &BackplaneEvent::Cleared);
        Ok(())
    }

    fn subscribe(&self, listener: BackplaneListener<K>) {
        self.node.listeners.write().push(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn collect(node: &InProcessBackplane<String>) -> Arc<Mutex<Vec<BackplaneEvent<String>>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        node.subscribe(Arc::new(move |event| sink.lock().push(event)));
        seen
    }

    #[test]
    fn notifications_reach_every_other_node() {
        let hub = BackplaneHub::new();
        let a = hub.connect();
        let b = hub.connect();
        let c = hub.connect();

        let seen_b = collect(&b);
        let seen_c = collect(&c);

        a.notify_remove(&"k".to_string()).unwrap();

        assert!(matches!(
            seen_b.lock().as_slice(),
            [BackplaneEvent::Removed { key }] if key == "k"
        ));
        assert!(matches!(
            seen_c.lock().as_slice(),
            [BackplaneEvent::Removed { key }] if key == "k"
        ));
    }

    #[test]
    fn the_sender_does_not_hear_itself() {
        let hub = BackplaneHub::new();
        let a = hub.connect();
        let _b = hub.connect();

        let seen_a = collect(&a);
        a.notify_clear().unwrap();
        assert!(seen_a.lock().is_empty());
    }

    #[test]
    fn dropped_nodes_are_forgotten() {
        let hub = BackplaneHub::new();
        let a = hub.connect();
        let b = hub.connect();
        let seen_b = collect(&b);

        drop(b);
        a.notify_clear().unwrap();
        assert!(seen_b.lock().is_empty());
    }
}
