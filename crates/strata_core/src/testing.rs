// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mock handle implementation for testing.
//!
//! [`MockHandle`] stores items in a plain map, records every operation, and
//! supports failure injection for exercising error paths. It stands in for a
//! distributed backend in coordinator tests: `is_distributed` is
//! configurable, removal events can be emitted manually, and the update path
//! can be forced to exhaust its retries.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::error::{CacheError, Result};
use crate::expiry::resolve_item_expiration;
use crate::handle::{
    CacheHandle, HandleConfig, HandleRemovalEvent, RemovalListener, RemovalReason, UpdateFactory,
};
use crate::item::CacheItem;
use crate::stats::HandleStats;
use crate::update::UpdateOutcome;

/// A recorded handle operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandleOp<K> {
    /// An add was attempted for the key.
    Add(K),
    /// A get was performed for the key.
    Get(K),
    /// A put was performed for the key.
    Put(K),
    /// A remove was performed for the key.
    Remove(K),
    /// An existence check was performed for the key.
    Exists(K),
    /// An update was attempted for the key.
    Update(K),
    /// All entries were cleared.
    Clear,
}

type FailPredicate<K> = Box<dyn Fn(&HandleOp<K>) -> bool + Send + Sync>;

/// A configurable mock cache handle.
///
/// Clones share state, so tests can keep a clone for inspection after moving
/// the handle into a coordinator.
///
/// # Examples
///
/// ```
/// use strata_core::testing::{HandleOp, MockHandle};
/// use strata_core::{CacheHandle, CacheItem};
///
/// let handle = MockHandle::<String, i32>::new();
/// handle.add(CacheItem::new("key".to_string(), 42))?;
///
/// assert_eq!(handle.operations(), vec![HandleOp::Add("key".to_string())]);
/// # Ok::<(), strata_core::CacheError>(())
/// ```
pub struct MockHandle<K, V> {
    inner: Arc<MockInner<K, V>>,
}

struct MockInner<K, V> {
    config: HandleConfig,
    stats: HandleStats,
    distributed: AtomicBool,
    data: Mutex<HashMap<K, CacheItem<K, V>>>,
    operations: Mutex<Vec<HandleOp<K>>>,
    fail_when: Mutex<Option<FailPredicate<K>>>,
    forced_retry_failure: Mutex<Option<u32>>,
    removal_listener: RwLock<Option<RemovalListener<K, V>>>,
}

impl<K, V> Clone for MockHandle<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> std::fmt::Debug for MockHandle<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockHandle")
            .field("name", &self.inner.config.name())
            .field("distributed", &self.inner.distributed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<K, V> Default for MockHandle<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> MockHandle<K, V> {
    /// Creates an empty mock handle named `mock`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HandleConfig::new("mock"))
    }

    /// Creates an empty mock handle with the given configuration.
    #[must_use]
    pub fn with_config(config: HandleConfig) -> Self {
        let stats = HandleStats::new(config.statistics_enabled());
        Self {
            inner: Arc::new(MockInner {
                config,
                stats,
                distributed: AtomicBool::new(false),
                data: Mutex::new(HashMap::new()),
                operations: Mutex::new(Vec::new()),
                fail_when: Mutex::new(None),
                forced_retry_failure: Mutex::new(None),
                removal_listener: RwLock::new(None),
            }),
        }
    }

    /// Marks the handle as a distributed backend.
    #[must_use]
    pub fn distributed(self) -> Self {
        self.inner.distributed.store(true, Ordering::Relaxed);
        self
    }
}

impl<K, V> MockHandle<K, V>
where
    K: Clone + std::fmt::Debug,
    V: Clone,
{
    /// Sets a predicate that makes matching operations fail with a
    /// [`CacheError::Handle`] error.
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&HandleOp<K>) -> bool + Send + Sync + 'static,
    {
        *self.inner.fail_when.lock() = Some(Box::new(predicate));
    }

    /// Clears the failure predicate.
    pub fn clear_failures(&self) {
        *self.inner.fail_when.lock() = None;
    }

    /// Makes every update report [`UpdateOutcome::TooManyRetries`] with the
    /// given try count, as a contended distributed backend would.
    pub fn force_too_many_retries(&self, tries: u32) {
        *self.inner.forced_retry_failure.lock() = Some(tries);
    }

    /// Returns a clone of all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<HandleOp<K>> {
        self.inner.operations.lock().clone()
    }

    /// Clears all recorded operations.
    pub fn clear_operations(&self) {
        self.inner.operations.lock().clear();
    }

    /// Returns true if the key is stored.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool
    where
        K: Eq + Hash,
    {
        self.inner.data.lock().contains_key(key)
    }

    /// Fires the removal listener as if the backend had dropped the key.
    pub fn emit_removal(&self, key: K, reason: RemovalReason, value: Option<V>) {
        let listener = self.inner.removal_listener.read().clone();
        if let Some(listener) = listener {
            listener(HandleRemovalEvent { key, reason, value });
        }
    }

    fn record(&self, op: HandleOp<K>) -> Result<()> {
        let fails = self
            .inner
            .fail_when
            .lock()
            .as_ref()
            .is_some_and(|predicate| predicate(&op));
        let failed_op = fails.then(|| format!("mock: {op:?} failed"));
        self.inner.operations.lock().push(op);
        match failed_op {
            Some(message) => Err(CacheError::from_source(message)),
            None => Ok(()),
        }
    }
}

impl<K, V> CacheHandle<K, V> for MockHandle<K, V>
where
    K: Clone + Eq + Hash + std::fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn config(&self) -> &HandleConfig {
        &self.inner.config
    }

    fn stats(&self) -> &HandleStats {
        &self.inner.stats
    }

    fn is_distributed(&self) -> bool {
        self.inner.distributed.load(Ordering::Relaxed)
    }

    fn add(&self, item: CacheItem<K, V>) -> Result<bool> {
        self.record(HandleOp::Add(item.key().clone()))?;
        let item = resolve_item_expiration(item, &self.inner.config)?;
        let mut data = self.inner.data.lock();
        if data.contains_key(item.key()) {
            return Ok(false);
        }
        data.insert(item.key().clone(), item);
        Ok(true)
    }

    fn get(&self, key: &K) -> Result<Option<CacheItem<K, V>>> {
        self.record(HandleOp::Get(key.clone()))?;
        let item = self.inner.data.lock().get(key).cloned();
        if let Some(item) = &item {
            item.touch(std::time::SystemTime::now());
        }
        Ok(item)
    }

    fn put(&self, item: CacheItem<K, V>) -> Result<()> {
        self.record(HandleOp::Put(item.key().clone()))?;
        let item = resolve_item_expiration(item, &self.inner.config)?;
        self.inner.data.lock().insert(item.key().clone(), item);
        Ok(())
    }

    fn remove(&self, key: &K) -> Result<bool> {
        self.record(HandleOp::Remove(key.clone()))?;
        Ok(self.inner.data.lock().remove(key).is_some())
    }

    fn clear(&self) -> Result<()> {
        self.record(HandleOp::Clear)?;
        self.inner.data.lock().clear();
        Ok(())
    }

    fn exists(&self, key: &K) -> Result<bool> {
        self.record(HandleOp::Exists(key.clone()))?;
        Ok(self.inner.data.lock().contains_key(key))
    }

    fn count(&self) -> u64 {
        self.inner.data.lock().len() as u64
    }

    fn update(
        &self,
        key: &K,
        factory: UpdateFactory<'_, V>,
        _max_retries: u32,
    ) -> Result<UpdateOutcome<K, V>> {
        self.record(HandleOp::Update(key.clone()))?;
        if let Some(tries) = *self.inner.forced_retry_failure.lock() {
            return Ok(UpdateOutcome::TooManyRetries { tries });
        }

        let mut data = self.inner.data.lock();
        let Some(item) = data.get(key) else {
            return Ok(UpdateOutcome::ItemDidNotExist);
        };
        let Some(new_value) = factory(item.value()) else {
            return Ok(UpdateOutcome::FactoryReturnedNone);
        };
        let updated = item.with_value(new_value);
        updated.touch(std::time::SystemTime::now());
        data.insert(key.clone(), updated.clone());
        Ok(UpdateOutcome::Success {
            item: updated,
            tries: 1,
        })
    }

    fn set_removal_listener(&self, listener: Option<RemovalListener<K, V>>) {
        *self.inner.removal_listener.write() = listener;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_operations_in_order() {
        let handle = MockHandle::<String, i32>::new();
        handle.add(CacheItem::new("a".to_string(), 1)).unwrap();
        let _ = handle.get(&"a".to_string()).unwrap();
        handle.remove(&"a".to_string()).unwrap();

        assert_eq!(
            handle.operations(),
            vec![
                HandleOp::Add("a".to_string()),
                HandleOp::Get("a".to_string()),
                HandleOp::Remove("a".to_string()),
            ]
        );
    }

    #[test]
    fn add_is_insert_if_absent() {
        let handle = MockHandle::<String, i32>::new();
        assert!(handle.add(CacheItem::new("a".to_string(), 1)).unwrap());
        assert!(!handle.add(CacheItem::new("a".to_string(), 2)).unwrap());

        let item = handle.get(&"a".to_string()).unwrap().unwrap();
        assert_eq!(*item.value(), 1);
    }

    #[test]
    fn fail_when_rejects_matching_operations() {
        let handle = MockHandle::<String, i32>::new();
        handle.fail_when(|op| matches!(op, HandleOp::Get(k) if k == "bad"));

        handle.put(CacheItem::new("good".to_string(), 1)).unwrap();
        assert!(handle.get(&"good".to_string()).is_ok());
        assert!(handle.get(&"bad".to_string()).is_err());
    }

    #[test]
    fn forced_retry_failure_overrides_update() {
        let handle = MockHandle::<String, i32>::new();
        handle.put(CacheItem::new("a".to_string(), 1)).unwrap();
        handle.force_too_many_retries(7);

        let outcome = handle
            .update(&"a".to_string(), &|v| Some(v + 1), 3)
            .unwrap();
        assert!(matches!(outcome, UpdateOutcome::TooManyRetries { tries: 7 }));
    }

    #[test]
    fn emit_removal_reaches_listener() {
        let handle = MockHandle::<String, i32>::new();
        let seen: Arc<Mutex<Vec<(String, RemovalReason)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        handle.set_removal_listener(Some(Arc::new(move |event| {
            sink.lock().push((event.key, event.reason));
        })));

        handle.emit_removal("gone".to_string(), RemovalReason::Evicted, Some(9));
        assert_eq!(
            seen.lock().as_slice(),
            &[("gone".to_string(), RemovalReason::Evicted)]
        );
    }
}
