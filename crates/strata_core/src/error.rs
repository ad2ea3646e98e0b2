// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for cache operations.

use std::error::Error as StdError;

use thiserror::Error;

/// An error from a cache operation.
///
/// Backend-specific failures are wrapped in [`Handle`](Self::Handle) while
/// preserving the original typed error, which consumers can extract with
/// [`source_as`](Self::source_as).
#[derive(Debug, Error)]
pub enum CacheError {
    /// A caller-supplied argument was rejected (for example an out-of-range
    /// expiration timeout). Never retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The requested key is not cached. Raised only by the value-returning
    /// convenience accessor; item-returning reads yield `None` instead.
    #[error("key not found")]
    NotFound,

    /// An internal consistency rule was violated, or a throw-variant
    /// operation gave up (update retries exhausted, factory declined).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// The operation targeted a handle whose backend has been shut down.
    /// Never retried.
    #[error("cache has been disposed")]
    Disposed,

    /// A storage backend failed. The original error is preserved as the
    /// source.
    #[error("cache handle error")]
    Handle(#[source] Box<dyn StdError + Send + Sync>),
}

impl CacheError {
    /// Creates an [`InvariantViolation`](Self::InvariantViolation) error.
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }

    /// Wraps a backend error, preserving its type for later extraction.
    ///
    /// # Examples
    ///
    /// ```
    /// use strata_core::CacheError;
    ///
    /// let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
    /// let error = CacheError::from_source(io_err);
    /// assert!(error.source_as::<std::io::Error>().is_some());
    /// ```
    pub fn from_source(cause: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Handle(cause.into())
    }

    /// Returns `true` if the wrapped source error is of type `T`.
    #[must_use]
    pub fn is_source<T: StdError + 'static>(&self) -> bool {
        self.source_as::<T>().is_some()
    }

    /// Returns the wrapped source error as type `T` if it matches.
    #[must_use]
    pub fn source_as<T: StdError + 'static>(&self) -> Option<&T> {
        match self {
            Self::Handle(source) => source.downcast_ref::<T>(),
            _ => None,
        }
    }
}

/// A specialized [`Result`] type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
