// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The background expiration scanner.
//!
//! One worker thread per handle wakes on an interval, sweeps the map for
//! expired entries, and fires one removal event per eviction. The worker
//! holds only a weak reference to the handle: it exits when the handle is
//! dropped (the shutdown channel disconnects and the upgrade fails), so a
//! forgotten handle never leaks a thread that keeps it alive.

use std::hash::Hash;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Weak;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use rand::Rng;
use tracing::{debug, error};

use crate::handle::HandleInner;

pub(crate) fn spawn<K, V>(
    inner: Weak<HandleInner<K, V>>,
    interval: Duration,
    shutdown: Receiver<()>,
) where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    let name = inner
        .upgrade()
        .map(|handle| format!("strata-sweep-{}", handle.config.name()))
        .unwrap_or_else(|| "strata-sweep".to_string());

    let spawned = std::thread::Builder::new().name(name).spawn(move || {
        // Jitter the first sweep so handles constructed together do not all
        // sweep at the same instant.
        let mut wait = jittered(interval);
        loop {
            match shutdown.recv_timeout(wait) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                Err(RecvTimeoutError::Timeout) => {}
            }
            wait = interval;

            let Some(handle) = inner.upgrade() else {
                return;
            };
            match catch_unwind(AssertUnwindSafe(|| handle.evict_expired())) {
                Ok(0) => {}
                Ok(evicted) => {
                    debug!(handle = handle.config.name(), evicted, "expiration sweep");
                }
                Err(_) => error!(handle = handle.config.name(), "expiration sweep panicked"),
            }
        }
    });

    if let Err(spawn_error) = spawned {
        error!(%spawn_error, "failed to start the expiration scanner");
    }
}

/// A fraction of the interval in [0.2, 1.0), so the default five second
/// interval first fires between one and five seconds in.
fn jittered(interval: Duration) -> Duration {
    interval.mul_f64(rand::rng().random_range(0.2..1.0))
}

/// Resets the running flag even when a sweep unwinds.
struct SweepGuard<'a>(&'a std::sync::atomic::AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<K, V> HandleInner<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Sweeps expired entries once; overlapping sweeps are suppressed.
    pub(crate) fn evict_expired(&self) -> usize {
        if self
            .sweep_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return 0;
        }
        let _running = SweepGuard(&self.sweep_running);

        let now = self.clock.system_time();
        let expired: Vec<K> = self
            .map
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = 0;
        for key in expired {
            // Re-checked under the map lock; a fresher concurrent put for the
            // same key survives the sweep.
            if self.remove_expired(&key, now) {
                evicted += 1;
            }
        }
        evicted
    }
}
