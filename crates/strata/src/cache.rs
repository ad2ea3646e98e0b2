// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The cache coordinator.
//!
//! [`Cache`] presents one key-value surface over an ordered list of storage
//! layers. Reads walk the layers front to back and promote hits forward;
//! adds and updates go to the authoritative back layer and invalidate the
//! rest; every completed operation is announced on the optional backplane
//! and raised as a [`CacheEvent`].

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;
use tracing::{error, warn};

use strata_core::{
    Backplane, BackplaneEvent, CacheError, CacheHandle, CacheItem, ChangeAction, Clock,
    ExpirationMode, HandleRemovalEvent, Result, UpdateOutcome,
};

use crate::builder::CacheBuilder;
use crate::config::{CacheConfig, UpdateMode};
use crate::events::{CacheEvent, CacheEventListener, EventOrigin};

/// A multi-tier cache.
///
/// Handles are held in a fixed order: index 0 is the front (fastest,
/// consulted first), the last index is the back (authoritative). Clones
/// share state; the coordinator is safe for concurrent callers but does not
/// serialize unrelated keys.
///
/// # Examples
///
/// ```
/// use strata::{Cache, Clock};
///
/// let clock = Clock::new_frozen();
/// let cache = Cache::builder::<String, i32>(clock)
///     .memory()
///     .build()?;
///
/// cache.put("answer".to_string(), 42)?;
/// assert_eq!(cache.get(&"answer".to_string()), Some(42));
/// # Ok::<(), strata::CacheError>(())
/// ```
pub struct Cache<K, V> {
    inner: Arc<CacheInner<K, V>>,
}

impl<K, V> Clone for Cache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> std::fmt::Debug for Cache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.inner.config.name())
            .field("handles", &self.inner.handles.len())
            .field("backplane", &self.inner.backplane.is_some())
            .finish_non_exhaustive()
    }
}

pub(crate) struct CacheInner<K, V> {
    config: CacheConfig,
    clock: Clock,
    handles: Vec<Arc<dyn CacheHandle<K, V>>>,
    backplane: Option<Arc<dyn Backplane<K>>>,
    listeners: RwLock<Vec<CacheEventListener<K, V>>>,
}

impl<K, V> Drop for CacheInner<K, V> {
    fn drop(&mut self) {
        // Well-defined unsubscription: handles may outlive the coordinator.
        for handle in &self.handles {
            handle.set_removal_listener(None);
        }
    }
}

impl Cache<(), ()> {
    /// Creates a new cache builder.
    ///
    /// # Examples
    ///
    /// ```
    /// use strata::{Cache, Clock};
    ///
    /// let clock = Clock::system();
    /// let cache = Cache::builder::<String, i32>(clock)
    ///     .memory()
    ///     .build()?;
    /// # Ok::<(), strata::CacheError>(())
    /// ```
    #[must_use]
    pub fn builder<K, V>(clock: Clock) -> CacheBuilder<K, V>
    where
        K: Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        CacheBuilder::new(clock)
    }
}

impl<K, V> Cache<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn from_builder(builder: CacheBuilder<K, V>) -> Result<Self> {
        if builder.handles.is_empty() {
            return Err(CacheError::invariant("a cache requires at least one handle"));
        }
        for handle in &builder.handles {
            handle.config().validate()?;
        }
        let sources = builder
            .handles
            .iter()
            .filter(|handle| handle.config().is_backplane_source())
            .count();
        if sources > 1 {
            return Err(CacheError::invariant(
                "at most one handle may be marked as the backplane source",
            ));
        }
        if builder.backplane.is_some() && sources == 0 {
            return Err(CacheError::invariant(
                "a backplane requires one handle marked as its source",
            ));
        }

        let inner = Arc::new(CacheInner {
            config: builder.config,
            clock: builder.clock,
            handles: builder.handles,
            backplane: builder.backplane,
            listeners: RwLock::new(Vec::new()),
        });

        for (index, handle) in inner.handles.iter().enumerate() {
            let cache = Arc::downgrade(&inner);
            handle.set_removal_listener(Some(Arc::new(move |event| {
                if let Some(cache) = cache.upgrade() {
                    cache.on_handle_removal(index, event);
                }
            })));
        }

        if let Some(backplane) = &inner.backplane {
            let cache: Weak<CacheInner<K, V>> = Arc::downgrade(&inner);
            backplane.subscribe(Arc::new(move |event| {
                let Some(cache) = cache.upgrade() else {
                    return;
                };
                // Never crash the delivery thread, whatever a listener does.
                if catch_unwind(AssertUnwindSafe(|| cache.on_backplane_event(event))).is_err() {
                    error!("backplane event handler panicked");
                }
            }));
        }

        Ok(Self { inner })
    }

    /// Returns the cache configuration.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Returns the cache's clock.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.inner.clock
    }

    /// Returns the ordered storage layers, front first.
    #[must_use]
    pub fn handles(&self) -> &[Arc<dyn CacheHandle<K, V>>] {
        &self.inner.handles
    }

    /// Registers an observer for cache events.
    pub fn subscribe(&self, listener: CacheEventListener<K, V>) {
        self.inner.listeners.write().push(listener);
    }

    /// Stores `value` only if `key` is not yet cached.
    ///
    /// The write goes to the authoritative back handle; on success every
    /// other layer is invalidated so the next read re-promotes the fresh
    /// version. Returns false (without announcing anything) when the back
    /// handle already holds the key.
    ///
    /// # Errors
    ///
    /// Errors from the back handle are propagated as-is.
    pub fn add(&self, key: K, value: V) -> Result<bool> {
        let item = self.new_item(key, value);
        self.add_item(item)
    }

    /// Stores a fully configured item only if its key is not yet cached.
    ///
    /// # Errors
    ///
    /// Errors from the back handle are propagated as-is.
    pub fn add_item(&self, item: CacheItem<K, V>) -> Result<bool> {
        let inner = &self.inner;
        let back_index = inner.handles.len() - 1;
        let back = &inner.handles[back_index];
        let key = item.key().clone();

        if !back.add(item)? {
            return Ok(false);
        }
        back.stats().on_add();
        // The other layers may hold a stale version of the key.
        inner.evict_from_handles(&key, Some(back_index));
        inner.notify_backplane(|bp| bp.notify_change(&key, ChangeAction::Add));
        inner.raise(&CacheEvent::Add {
            key,
            origin: EventOrigin::Local,
        });
        Ok(true)
    }

    /// Stores `value` in every layer, replacing any existing entry.
    ///
    /// # Errors
    ///
    /// A handle failure aborts the remaining layers and is propagated; put
    /// is not all-or-nothing.
    pub fn put(&self, key: K, value: V) -> Result<()> {
        let item = self.new_item(key, value);
        self.put_item(item)
    }

    /// Stores a fully configured item in every layer.
    ///
    /// # Errors
    ///
    /// A handle failure aborts the remaining layers and is propagated.
    pub fn put_item(&self, item: CacheItem<K, V>) -> Result<()> {
        let key = item.key().clone();
        self.inner.put_to_handles(&item)?;
        self.inner
            .notify_backplane(|bp| bp.notify_change(&key, ChangeAction::Put));
        self.inner.raise(&CacheEvent::Put {
            key,
            origin: EventOrigin::Local,
        });
        Ok(())
    }

    /// Returns the value for `key`, or `None` when absent.
    ///
    /// Layers are consulted front to back; a hit is copied into every faster
    /// layer so the next read stops earlier. A layer failure is logged and
    /// treated as a miss.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.get_item(key).map(|item| item.value().clone())
    }

    /// Returns the value for `key`.
    ///
    /// # Errors
    ///
    /// [`CacheError::NotFound`] when the key is not cached.
    pub fn get_required(&self, key: &K) -> Result<V> {
        self.get(key).ok_or(CacheError::NotFound)
    }

    /// Returns the full item for `key`, or `None` when absent.
    #[must_use]
    pub fn get_item(&self, key: &K) -> Option<CacheItem<K, V>> {
        for (index, handle) in self.inner.handles.iter().enumerate() {
            match handle.get(key) {
                Err(get_error) => {
                    warn!(
                        handle = handle.config().name(),
                        error = %get_error,
                        "get failed on a handle; treating as a miss"
                    );
                    handle.stats().on_miss();
                }
                Ok(None) => handle.stats().on_miss(),
                Ok(Some(item)) => {
                    handle.stats().on_hit();
                    self.inner.promote(&item, index);
                    self.inner.raise(&CacheEvent::Get {
                        key: key.clone(),
                        origin: EventOrigin::Local,
                    });
                    return Some(item);
                }
            }
        }
        None
    }

    /// Removes `key` from every layer. Returns true if any layer held it.
    ///
    /// # Errors
    ///
    /// A handle failure is propagated after being logged.
    pub fn remove(&self, key: &K) -> Result<bool> {
        let mut removed = false;
        for handle in &self.inner.handles {
            match handle.remove(key) {
                Ok(true) => {
                    handle.stats().on_remove();
                    removed = true;
                }
                Ok(false) => {}
                Err(remove_error) => {
                    error!(
                        handle = handle.config().name(),
                        error = %remove_error,
                        "remove failed on a handle"
                    );
                    return Err(remove_error);
                }
            }
        }
        if removed {
            self.inner.notify_backplane(|bp| bp.notify_remove(key));
            self.inner.raise(&CacheEvent::Remove {
                key: key.clone(),
                origin: EventOrigin::Local,
            });
        }
        Ok(removed)
    }

    /// Returns true if any layer holds a live entry for `key`.
    ///
    /// # Errors
    ///
    /// A handle failure is propagated.
    pub fn exists(&self, key: &K) -> Result<bool> {
        for handle in &self.inner.handles {
            if handle.exists(key)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Removes every entry from every layer.
    ///
    /// # Errors
    ///
    /// A handle failure aborts the remaining layers and is propagated.
    pub fn clear(&self) -> Result<()> {
        for handle in &self.inner.handles {
            handle.clear()?;
            handle.stats().on_clear();
        }
        self.inner.notify_backplane(|bp| bp.notify_clear());
        self.inner.raise(&CacheEvent::Clear {
            origin: EventOrigin::Local,
        });
        Ok(())
    }

    /// Applies `factory` to the cached value, retrying up to the configured
    /// bound.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvariantViolation`] when the key does not exist, the
    /// factory declines, or the retries are exhausted; handle errors are
    /// propagated as-is. Use [`try_update`](Self::try_update) for a
    /// non-failing variant.
    pub fn update<F>(&self, key: &K, factory: F) -> Result<V>
    where
        F: Fn(&V) -> Option<V> + Send + Sync,
    {
        self.update_with_retries(key, factory, self.inner.config.max_retries)
    }

    /// Like [`update`](Self::update) with an explicit retry bound.
    ///
    /// # Errors
    ///
    /// As for [`update`](Self::update).
    pub fn update_with_retries<F>(&self, key: &K, factory: F, max_retries: u32) -> Result<V>
    where
        F: Fn(&V) -> Option<V> + Send + Sync,
    {
        match self.inner.update_internal(key, &factory, max_retries)? {
            UpdateOutcome::Success { item, .. } => Ok(item.value().clone()),
            UpdateOutcome::FactoryReturnedNone => Err(CacheError::invariant(
                "the update factory declined to produce a value",
            )),
            UpdateOutcome::ItemDidNotExist => {
                Err(CacheError::invariant("cannot update a key that is not cached"))
            }
            UpdateOutcome::TooManyRetries { tries } => Err(CacheError::invariant(format!(
                "update gave up after {tries} tries"
            ))),
        }
    }

    /// Applies `factory` to the cached value; `None` instead of an error
    /// when the key is missing, the factory declines, or retries run out.
    ///
    /// # Errors
    ///
    /// Handle errors are propagated as-is.
    pub fn try_update<F>(&self, key: &K, factory: F) -> Result<Option<V>>
    where
        F: Fn(&V) -> Option<V> + Send + Sync,
    {
        self.try_update_with_retries(key, factory, self.inner.config.max_retries)
    }

    /// Like [`try_update`](Self::try_update) with an explicit retry bound.
    ///
    /// # Errors
    ///
    /// Handle errors are propagated as-is.
    pub fn try_update_with_retries<F>(
        &self,
        key: &K,
        factory: F,
        max_retries: u32,
    ) -> Result<Option<V>>
    where
        F: Fn(&V) -> Option<V> + Send + Sync,
    {
        Ok(match self.inner.update_internal(key, &factory, max_retries)? {
            UpdateOutcome::Success { item, .. } => Some(item.value().clone()),
            _ => None,
        })
    }

    /// Adds `add_value` for `key`, or updates the existing value with
    /// `factory`. Loops between the two until one wins.
    ///
    /// Not atomic across nodes: concurrent racers on different nodes may
    /// both add or both proceed to update.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvariantViolation`] when no attempt settled within the
    /// configured retry bound; handle errors are propagated as-is.
    pub fn add_or_update<F>(&self, key: K, add_value: V, factory: F) -> Result<V>
    where
        F: Fn(&V) -> Option<V> + Send + Sync,
    {
        self.add_or_update_with_retries(key, add_value, factory, self.inner.config.max_retries)
    }

    /// Like [`add_or_update`](Self::add_or_update) with an explicit retry
    /// bound.
    ///
    /// # Errors
    ///
    /// As for [`add_or_update`](Self::add_or_update).
    pub fn add_or_update_with_retries<F>(
        &self,
        key: K,
        add_value: V,
        factory: F,
        max_retries: u32,
    ) -> Result<V>
    where
        F: Fn(&V) -> Option<V> + Send + Sync,
    {
        let candidate = self.new_item(key, add_value);
        for _ in 0..=max_retries {
            if self.add_item(candidate.clone())? {
                return Ok(candidate.into_value());
            }
            if let Some(value) =
                self.try_update_with_retries(candidate.key(), &factory, max_retries)?
            {
                return Ok(value);
            }
        }
        Err(CacheError::invariant(format!(
            "add-or-update made no progress within {} attempts",
            u64::from(max_retries) + 1
        )))
    }

    /// Returns the cached value for `key`, adding `value` if absent.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvariantViolation`] when no attempt settled within the
    /// configured retry bound; handle errors are propagated as-is.
    pub fn get_or_add(&self, key: K, value: V) -> Result<V> {
        let candidate = self.new_item(key.clone(), value);
        match self.get_or_add_internal(&key, move |_| Some(candidate))? {
            GetOrAdd::Hit(item) | GetOrAdd::Added(item) => Ok(item.value().clone()),
            GetOrAdd::Declined | GetOrAdd::Exhausted => Err(self.get_or_add_exhausted()),
        }
    }

    /// Returns the cached value for `key`, building one with `factory` if
    /// absent. The factory runs at most once, even across retries.
    ///
    /// # Errors
    ///
    /// As for [`get_or_add`](Self::get_or_add).
    pub fn get_or_add_with<F>(&self, key: K, factory: F) -> Result<V>
    where
        F: FnOnce(&K) -> V,
    {
        match self.get_or_add_internal(&key, |k| Some(self.new_item(k.clone(), factory(k))))? {
            GetOrAdd::Hit(item) | GetOrAdd::Added(item) => Ok(item.value().clone()),
            GetOrAdd::Declined | GetOrAdd::Exhausted => Err(self.get_or_add_exhausted()),
        }
    }

    /// Returns the cached value for `key`, building one with `factory` if
    /// absent. The factory runs at most once; a `None` from it, or an
    /// unsettled race, yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Handle errors are propagated as-is.
    pub fn try_get_or_add<F>(&self, key: K, factory: F) -> Result<Option<V>>
    where
        F: FnOnce(&K) -> Option<V>,
    {
        let outcome = self.get_or_add_internal(&key, |k| {
            factory(k).map(|value| self.new_item(k.clone(), value))
        })?;
        Ok(match outcome {
            GetOrAdd::Hit(item) | GetOrAdd::Added(item) => Some(item.value().clone()),
            GetOrAdd::Declined | GetOrAdd::Exhausted => None,
        })
    }

    /// Like [`try_get_or_add`](Self::try_get_or_add), returning the full
    /// item and accepting an item-building factory.
    ///
    /// # Errors
    ///
    /// Handle errors are propagated as-is.
    pub fn try_get_or_add_item<F>(&self, key: K, factory: F) -> Result<Option<CacheItem<K, V>>>
    where
        F: FnOnce(&K) -> Option<CacheItem<K, V>>,
    {
        Ok(match self.get_or_add_internal(&key, factory)? {
            GetOrAdd::Hit(item) | GetOrAdd::Added(item) => Some(item),
            GetOrAdd::Declined | GetOrAdd::Exhausted => None,
        })
    }

    /// Replaces the expiration of the cached item for `key`.
    ///
    /// The rewritten item is stored through all layers directly; other nodes
    /// are not notified, so cross-node expiration changes are not atomic.
    ///
    /// # Errors
    ///
    /// [`CacheError::NotFound`] when the key is not cached;
    /// [`CacheError::InvalidArgument`] on an out-of-range timeout.
    pub fn expire(&self, key: &K, mode: ExpirationMode, timeout: Duration) -> Result<()> {
        let item = self.get_item(key).ok_or(CacheError::NotFound)?;
        let now = self.inner.clock.system_time();
        let rewritten = match mode {
            ExpirationMode::Absolute => item.with_absolute_expiration(timeout, now)?,
            ExpirationMode::Sliding => item.with_sliding_expiration(timeout)?,
            ExpirationMode::None => item.with_no_expiration(),
            ExpirationMode::Default => item.with_default_expiration(),
        };
        self.inner.put_to_handles(&rewritten)
    }

    /// Makes the cached item for `key` expire at `deadline`.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidArgument`] when the deadline is not in the
    /// future; otherwise as for [`expire`](Self::expire).
    pub fn expire_at(&self, key: &K, deadline: SystemTime) -> Result<()> {
        let now = self.inner.clock.system_time();
        let timeout = deadline.duration_since(now).map_err(|_| {
            CacheError::InvalidArgument("the expiration deadline must lie in the future")
        })?;
        self.expire(key, ExpirationMode::Absolute, timeout)
    }

    /// Gives the cached item for `key` a sliding expiration window.
    ///
    /// # Errors
    ///
    /// As for [`expire`](Self::expire).
    pub fn expire_sliding(&self, key: &K, timeout: Duration) -> Result<()> {
        self.expire(key, ExpirationMode::Sliding, timeout)
    }

    /// Removes any expiration from the cached item for `key`.
    ///
    /// # Errors
    ///
    /// As for [`expire`](Self::expire).
    pub fn remove_expiration(&self, key: &K) -> Result<()> {
        self.expire(key, ExpirationMode::None, Duration::ZERO)
    }

    fn new_item(&self, key: K, value: V) -> CacheItem<K, V> {
        CacheItem::new_at(key, value, self.inner.clock.system_time())
    }

    fn get_or_add_exhausted(&self) -> CacheError {
        CacheError::invariant(format!(
            "get-or-add made no progress within {} attempts",
            u64::from(self.inner.config.max_retries) + 1
        ))
    }

    /// The shared loop behind the get-or-add family. The candidate built by
    /// `factory` is kept across iterations so the factory runs at most once;
    /// an unused candidate is released when it goes out of scope.
    fn get_or_add_internal<F>(&self, key: &K, factory: F) -> Result<GetOrAdd<K, V>>
    where
        F: FnOnce(&K) -> Option<CacheItem<K, V>>,
    {
        let mut factory = Some(factory);
        let mut candidate: Option<CacheItem<K, V>> = None;
        for _ in 0..=self.inner.config.max_retries {
            if let Some(item) = self.get_item(key) {
                return Ok(GetOrAdd::Hit(item));
            }
            if candidate.is_none() {
                match factory.take().and_then(|build| build(key)) {
                    Some(item) => candidate = Some(item),
                    None => return Ok(GetOrAdd::Declined),
                }
            }
            if let Some(item) = &candidate {
                if self.add_item(item.clone())? {
                    return Ok(GetOrAdd::Added(item.clone()));
                }
            }
        }
        Ok(GetOrAdd::Exhausted)
    }
}

enum GetOrAdd<K, V> {
    Hit(CacheItem<K, V>),
    Added(CacheItem<K, V>),
    Declined,
    Exhausted,
}

impl<K, V> CacheInner<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn raise(&self, event: &CacheEvent<K, V>) {
        // Snapshot so no user code runs under the registry lock.
        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            listener(event);
        }
    }

    fn notify_backplane(&self, notify: impl FnOnce(&dyn Backplane<K>) -> Result<()>) {
        if let Some(backplane) = &self.backplane {
            // Delivery is best-effort; the local operation already committed.
            if let Err(notify_error) = notify(backplane.as_ref()) {
                warn!(error = %notify_error, "backplane notification failed");
            }
        }
    }

    fn evict_from_handles(&self, key: &K, skip: Option<usize>) {
        for (index, handle) in self.handles.iter().enumerate() {
            if Some(index) == skip {
                continue;
            }
            if let Err(evict_error) = handle.remove(key) {
                warn!(
                    handle = handle.config().name(),
                    error = %evict_error,
                    "failed to evict a stale copy"
                );
            }
        }
    }

    fn put_to_handles(&self, item: &CacheItem<K, V>) -> Result<()> {
        for handle in &self.handles {
            let track = handle.stats().enabled();
            let existed = track && handle.exists(item.key()).unwrap_or(false);
            if let Err(put_error) = handle.put(item.clone()) {
                error!(
                    handle = handle.config().name(),
                    error = %put_error,
                    "put failed; aborting the remaining handles"
                );
                return Err(put_error);
            }
            if track {
                handle.stats().on_put(!existed);
            }
        }
        Ok(())
    }

    fn promote(&self, item: &CacheItem<K, V>, found_at: usize) {
        for handle in &self.handles[..found_at] {
            if let Err(promote_error) = handle.put(item.clone()) {
                warn!(
                    handle = handle.config().name(),
                    error = %promote_error,
                    "failed to promote a hit"
                );
            }
        }
    }

    /// Runs the update on the authoritative back handle and reconciles the
    /// other layers with the outcome.
    fn update_internal(
        &self,
        key: &K,
        factory: &(dyn Fn(&V) -> Option<V> + Send + Sync),
        max_retries: u32,
    ) -> Result<UpdateOutcome<K, V>> {
        let back_index = self.handles.len() - 1;
        let back = &self.handles[back_index];
        let outcome = back.update(key, factory, max_retries)?;
        match &outcome {
            UpdateOutcome::Success { item, tries } => {
                back.stats().on_update(*tries);
                // Faster layers hold a stale version; slower layers (none
                // today, the back handle is last) get the fresh item.
                for handle in &self.handles[..back_index] {
                    if let Err(evict_error) = handle.remove(key) {
                        warn!(
                            handle = handle.config().name(),
                            error = %evict_error,
                            "failed to evict a stale copy after an update"
                        );
                    }
                }
                for handle in &self.handles[back_index + 1..] {
                    if let Err(copy_error) = handle.put(item.clone()) {
                        warn!(
                            handle = handle.config().name(),
                            error = %copy_error,
                            "failed to copy an updated item"
                        );
                    }
                }
                self.notify_backplane(|bp| bp.notify_change(key, ChangeAction::Update));
                self.raise(&CacheEvent::Update {
                    key: key.clone(),
                    origin: EventOrigin::Local,
                });
            }
            UpdateOutcome::FactoryReturnedNone => {
                warn!("the update factory declined to produce a value");
            }
            UpdateOutcome::ItemDidNotExist | UpdateOutcome::TooManyRetries { .. } => {
                // The layers may disagree about the key by now; drop every
                // copy outside the authoritative handle.
                self.evict_from_handles(key, Some(back_index));
            }
        }
        Ok(outcome)
    }

    /// Reacts to a removal decided inside the handle at `origin_index`.
    fn on_handle_removal(&self, origin_index: usize, event: HandleRemovalEvent<K, V>) {
        match self.config.update_mode {
            UpdateMode::None => {}
            UpdateMode::Up => {
                for handle in &self.handles[..origin_index] {
                    if let Err(evict_error) = handle.remove(&event.key) {
                        warn!(
                            handle = handle.config().name(),
                            error = %evict_error,
                            "failed to propagate a handle-side eviction"
                        );
                    }
                }
            }
            UpdateMode::Full => self.evict_from_handles(&event.key, Some(origin_index)),
        }
        self.raise(&CacheEvent::RemoveByHandle {
            key: event.key,
            reason: event.reason,
            level: origin_index + 1,
            value: event.value,
        });
    }

    /// True if a remote notification still needs to invalidate this handle.
    ///
    /// A distributed source already observed the change on its own backend;
    /// an in-memory source did not, so removes and clears (which pass
    /// `include_source`) must reach it too.
    fn should_sync(&self, handle: &Arc<dyn CacheHandle<K, V>>, include_source: bool) -> bool {
        !handle.config().is_backplane_source() || (include_source && !handle.is_distributed())
    }

    fn sync_evict(&self, key: &K, include_source: bool) {
        for handle in &self.handles {
            if !self.should_sync(handle, include_source) {
                continue;
            }
            if let Err(evict_error) = handle.remove(key) {
                warn!(
                    handle = handle.config().name(),
                    error = %evict_error,
                    "failed to apply a remote invalidation"
                );
            }
        }
    }

    /// Applies a notification from another node, then raises the matching
    /// remote-origin event.
    fn on_backplane_event(&self, event: BackplaneEvent<K>) {
        match event {
            BackplaneEvent::Changed { key, action } => {
                self.sync_evict(&key, false);
                let origin = EventOrigin::Remote;
                let event = match action {
                    ChangeAction::Add => CacheEvent::Add { key, origin },
                    ChangeAction::Put => CacheEvent::Put { key, origin },
                    ChangeAction::Update => CacheEvent::Update { key, origin },
                };
                self.raise(&event);
            }
            BackplaneEvent::Removed { key } => {
                self.sync_evict(&key, true);
                self.raise(&CacheEvent::Remove {
                    key,
                    origin: EventOrigin::Remote,
                });
            }
            BackplaneEvent::Cleared => {
                for handle in &self.handles {
                    if !self.should_sync(handle, true) {
                        continue;
                    }
                    match handle.clear() {
                        Ok(()) => handle.stats().on_clear(),
                        Err(clear_error) => warn!(
                            handle = handle.config().name(),
                            error = %clear_error,
                            "failed to apply a remote clear"
                        ),
                    }
                }
                self.raise(&CacheEvent::Clear {
                    origin: EventOrigin::Remote,
                });
            }
        }
    }
}
