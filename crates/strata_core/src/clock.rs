// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A controllable time source.
//!
//! Working with time is notoriously difficult to test. Every time-dependent
//! component in strata reads time through a [`Clock`] so that tests can
//! freeze the flow of time and advance it manually, while production code
//! pays a single atomic load at most.
//!
//! Cloning a clock is cheap and the clones share state: advancing one frozen
//! clone advances them all.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::warn;

/// Provides an abstraction for time-related operations.
///
/// A clock is either *system* (backed by [`SystemTime::now`]) or *frozen*
/// (time only moves when [`advance`](Self::advance) is called). All
/// timestamps are absolute UTC instants.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use strata_core::Clock;
///
/// let clock = Clock::new_frozen();
/// let before = clock.system_time();
/// clock.advance(Duration::from_secs(60));
/// assert_eq!(clock.system_time(), before + Duration::from_secs(60));
/// ```
#[derive(Clone, Debug)]
pub struct Clock {
    inner: Arc<ClockInner>,
}

#[derive(Debug)]
enum ClockInner {
    System,
    /// Nanoseconds since the Unix epoch.
    Frozen(AtomicU64),
}

impl Clock {
    /// Creates a clock backed by the operating system time.
    #[must_use]
    pub fn system() -> Self {
        Self {
            inner: Arc::new(ClockInner::System),
        }
    }

    /// Creates a frozen clock starting at the current system time.
    ///
    /// Time does not flow on its own; use [`advance`](Self::advance).
    #[must_use]
    pub fn new_frozen() -> Self {
        Self::new_frozen_at(SystemTime::now())
    }

    /// Creates a frozen clock starting at the given instant.
    #[must_use]
    pub fn new_frozen_at(start: SystemTime) -> Self {
        Self {
            inner: Arc::new(ClockInner::Frozen(AtomicU64::new(unix_nanos(start)))),
        }
    }

    /// Returns the current absolute time.
    #[must_use]
    pub fn system_time(&self) -> SystemTime {
        match &*self.inner {
            ClockInner::System => SystemTime::now(),
            ClockInner::Frozen(nanos) => from_unix_nanos(nanos.load(Ordering::Acquire)),
        }
    }

    /// Moves a frozen clock forward by `delta`.
    ///
    /// On a system clock this is a no-op and logs a warning; the operating
    /// system owns the flow of time there.
    pub fn advance(&self, delta: Duration) {
        match &*self.inner {
            ClockInner::System => warn!("advance called on a system clock; ignored"),
            ClockInner::Frozen(nanos) => {
                let delta = u64::try_from(delta.as_nanos()).unwrap_or(u64::MAX);
                nanos.fetch_add(delta, Ordering::AcqRel);
            }
        }
    }

    /// Returns true if this clock is frozen.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        matches!(&*self.inner, ClockInner::Frozen(_))
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::system()
    }
}

/// Converts an instant to nanoseconds since the Unix epoch.
///
/// Instants before the epoch clamp to zero.
pub(crate) fn unix_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

pub(crate) fn from_unix_nanos(nanos: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_nanos(nanos)
}
