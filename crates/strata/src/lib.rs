// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Multi-tier caching with promotion, eviction propagation, and best-effort
//! cross-node invalidation.
//!
//! A [`Cache`] composes an ordered list of storage layers (handles) behind
//! one key-value surface: typically fast-and-small in front of
//! slow-and-large. Reads walk the layers front to back and copy hits
//! forward; adds and atomic updates go to the authoritative back layer and
//! invalidate the rest; expirations decided inside a layer propagate to the
//! layers in front of it; an optional backplane fans invalidations out to
//! other nodes.
//!
//! # Examples
//!
//! ## Two tiers with promotion
//!
//! ```
//! use strata::{Cache, Clock};
//!
//! let clock = Clock::new_frozen();
//! let cache = Cache::builder::<String, String>(clock)
//!     .memory()
//!     .memory()
//!     .build()?;
//!
//! // Add writes to the back tier only; the first get promotes the item
//! // into the front tier.
//! cache.add("greeting".to_string(), "hello".to_string())?;
//! assert_eq!(cache.get(&"greeting".to_string()).as_deref(), Some("hello"));
//! # Ok::<(), strata::CacheError>(())
//! ```
//!
//! ## Atomic updates
//!
//! ```
//! use strata::{Cache, Clock};
//!
//! let clock = Clock::new_frozen();
//! let cache = Cache::builder::<String, i32>(clock).memory().build()?;
//!
//! cache.add("counter".to_string(), 0)?;
//! let value = cache.update(&"counter".to_string(), |n| Some(n + 1))?;
//! assert_eq!(value, 1);
//! # Ok::<(), strata::CacheError>(())
//! ```

pub mod backplane;
mod builder;
mod cache;
mod config;
mod events;

#[doc(inline)]
pub use builder::CacheBuilder;
#[doc(inline)]
pub use cache::Cache;
#[doc(inline)]
pub use config::{CacheConfig, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, UpdateMode};
#[doc(inline)]
pub use events::{CacheEvent, CacheEventListener, EventOrigin};

pub use strata_core::{
    Backplane, BackplaneEvent, BackplaneListener, CacheError, CacheHandle, CacheItem,
    CacheItemSnapshot, ChangeAction, Clock, ExpirationMode, HandleConfig, HandleRemovalEvent,
    HandleStats, MAX_EXPIRATION_TIMEOUT, RemovalListener, RemovalReason, Result, UpdateFactory,
    UpdateOutcome, resolve_item_expiration,
};

#[cfg(feature = "memory")]
pub use strata_memory::{InMemoryHandle, InMemoryHandleBuilder};
