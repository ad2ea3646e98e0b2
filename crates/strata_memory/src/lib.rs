// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-memory reference handle for the strata multi-tier cache.
//!
//! [`InMemoryHandle`] stores items in a concurrent map and evicts only on
//! expiry: a background scanner sweeps expired entries periodically, and
//! reads drop expired entries lazily. Each eviction fires the handle's
//! removal event so the coordinator can propagate it across layers.
//!
//! # Examples
//!
//! ```
//! use strata_core::{CacheHandle, CacheItem};
//! use strata_memory::InMemoryHandle;
//!
//! let handle = InMemoryHandle::<String, i32>::new();
//! handle.add(CacheItem::new("key".to_string(), 42))?;
//! let item = handle.get(&"key".to_string())?;
//! assert_eq!(*item.unwrap().value(), 42);
//! # Ok::<(), strata_core::CacheError>(())
//! ```

mod builder;
mod handle;
mod scanner;

pub use builder::InMemoryHandleBuilder;
pub use handle::InMemoryHandle;
