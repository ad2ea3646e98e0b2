// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Tests for the retry-bounded update family.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use strata_core::testing::{HandleOp, MockHandle};

use strata::{Cache, CacheError, CacheHandle, CacheItem, Clock, InMemoryHandle};

type Handle = InMemoryHandle<String, i32>;

fn single_tier() -> Cache<String, i32> {
    Cache::builder::<String, i32>(Clock::new_frozen())
        .memory()
        .build()
        .unwrap()
}

fn two_tier() -> (Cache<String, i32>, Handle, Handle) {
    let clock = Clock::new_frozen();
    let front: Handle = InMemoryHandle::builder().clock(clock.clone()).build();
    let back: Handle = InMemoryHandle::builder().clock(clock.clone()).build();
    let cache = Cache::builder::<String, i32>(clock)
        .handle(front.clone())
        .handle(back.clone())
        .build()
        .unwrap();
    (cache, front, back)
}

#[test]
fn update_applies_the_factory() {
    let cache = single_tier();
    cache.add("n".into(), 1).unwrap();

    assert_eq!(cache.update(&"n".to_string(), |v| Some(v + 1)).unwrap(), 2);
    assert_eq!(cache.get(&"n".to_string()), Some(2));
}

#[test]
fn update_on_a_missing_key_fails() {
    let cache = single_tier();
    assert!(matches!(
        cache.update(&"absent".to_string(), |v| Some(v + 1)),
        Err(CacheError::InvariantViolation(_))
    ));
}

#[test]
fn try_update_reports_failure_without_an_error() {
    let cache = single_tier();
    assert_eq!(
        cache
            .try_update(&"absent".to_string(), |v| Some(v + 1))
            .unwrap(),
        None
    );
}

#[test]
fn a_declining_factory_leaves_the_value_untouched() {
    let cache = single_tier();
    cache.add("n".into(), 7).unwrap();

    assert!(matches!(
        cache.update(&"n".to_string(), |_| None),
        Err(CacheError::InvariantViolation(_))
    ));
    assert_eq!(cache.try_update(&"n".to_string(), |_| None).unwrap(), None);
    assert_eq!(cache.get(&"n".to_string()), Some(7));
}

#[test]
fn update_evicts_stale_copies_from_faster_layers() {
    let (cache, front, _back) = two_tier();
    cache.add("n".into(), 1).unwrap();

    // Promote the old version forward, then update behind its back.
    assert_eq!(cache.get(&"n".to_string()), Some(1));
    assert!(front.exists(&"n".to_string()).unwrap());

    assert_eq!(cache.update(&"n".to_string(), |v| Some(v + 1)).unwrap(), 2);
    assert!(!front.exists(&"n".to_string()).unwrap());
    assert_eq!(cache.get(&"n".to_string()), Some(2));
}

#[test]
fn update_feeds_tries_into_the_back_handle_stats() {
    let (cache, _front, back) = two_tier();
    cache.add("n".into(), 1).unwrap();
    let hits_before = back.stats().hits();

    cache.update(&"n".to_string(), |v| Some(v + 1)).unwrap();
    assert_eq!(back.stats().hits(), hits_before + 1);
    assert_eq!(back.stats().put_calls(), 1);
}

#[test]
fn too_many_retries_evicts_every_other_layer() {
    let clock = Clock::new_frozen();
    let front: Handle = InMemoryHandle::builder().clock(clock.clone()).build();
    let back = MockHandle::<String, i32>::new();
    let cache = Cache::builder::<String, i32>(clock)
        .handle(front.clone())
        .handle(back.clone())
        .build()
        .unwrap();

    cache.put("n".into(), 1).unwrap();
    assert!(front.exists(&"n".to_string()).unwrap());

    back.force_too_many_retries(5);
    assert_eq!(
        cache.try_update(&"n".to_string(), |v| Some(v + 1)).unwrap(),
        None
    );
    // The contended layer keeps its copy; everyone else is evicted to avoid
    // divergence.
    assert!(!front.exists(&"n".to_string()).unwrap());
    assert!(back.contains(&"n".to_string()));

    assert!(matches!(
        cache.update(&"n".to_string(), |v| Some(v + 1)),
        Err(CacheError::InvariantViolation(_))
    ));
}

#[test]
fn add_or_update_adds_then_updates() {
    let cache = single_tier();

    let first = cache
        .add_or_update("n".into(), 0, |v| Some(v + 1))
        .unwrap();
    assert_eq!(first, 0);

    let second = cache
        .add_or_update("n".into(), 0, |v| Some(v + 1))
        .unwrap();
    assert_eq!(second, 1);
    assert_eq!(cache.get(&"n".to_string()), Some(1));
}

#[test]
fn add_or_update_under_contention_counts_every_increment() {
    let cache = single_tier();
    let threads = 4;
    let per_thread = 25;

    std::thread::scope(|scope| {
        for _ in 0..threads {
            let cache = cache.clone();
            scope.spawn(move || {
                for _ in 0..per_thread {
                    cache
                        .add_or_update("n".to_string(), 1, |v| Some(v + 1))
                        .unwrap();
                }
            });
        }
    });

    // One add wins with value 1; every other call increments by one.
    assert_eq!(cache.get(&"n".to_string()), Some(threads * per_thread));
}

#[test]
fn get_or_add_returns_the_cached_value() {
    let cache = single_tier();
    cache.put("k".into(), 10).unwrap();

    let calls = AtomicUsize::new(0);
    let value = cache
        .get_or_add_with("k".into(), |_| {
            calls.fetch_add(1, Ordering::Relaxed);
            99
        })
        .unwrap();
    assert_eq!(value, 10);
    assert_eq!(calls.load(Ordering::Relaxed), 0);
}

#[test]
fn get_or_add_builds_the_value_once_when_missing() {
    let cache = single_tier();

    let calls = AtomicUsize::new(0);
    let value = cache
        .get_or_add_with("k".into(), |_| {
            calls.fetch_add(1, Ordering::Relaxed);
            42
        })
        .unwrap();
    assert_eq!(value, 42);
    assert_eq!(calls.load(Ordering::Relaxed), 1);
    assert_eq!(cache.get(&"k".to_string()), Some(42));
}

#[test]
fn try_get_or_add_aborts_when_the_factory_declines() {
    let back = MockHandle::<String, i32>::new();
    let cache = Cache::builder::<String, i32>(Clock::new_frozen())
        .handle(back.clone())
        .build()
        .unwrap();

    assert_eq!(
        cache.try_get_or_add("k".into(), |_| None).unwrap(),
        None
    );
    // The factory declined before any add was attempted.
    assert!(
        !back
            .operations()
            .iter()
            .any(|op| matches!(op, HandleOp::Add(_)))
    );
    assert!(!cache.exists(&"k".to_string()).unwrap());
}

#[test]
fn try_get_or_add_item_returns_the_stored_item() {
    let cache = single_tier();

    let stored = cache
        .try_get_or_add_item("k".to_string(), |key| {
            Some(CacheItem::new(key.clone(), 5))
        })
        .unwrap()
        .unwrap();
    assert_eq!(*stored.value(), 5);
    assert_eq!(cache.get(&"k".to_string()), Some(5));
}

#[test]
fn explicit_retry_bounds_override_the_configured_default() {
    let cache = Cache::builder::<String, i32>(Clock::new_frozen())
        .max_retries(0)
        .memory()
        .build()
        .unwrap();
    cache.add("n".into(), 1).unwrap();

    // Zero retries still allows the single mandatory attempt.
    assert_eq!(
        cache
            .update_with_retries(&"n".to_string(), |v| Some(v + 1), 0)
            .unwrap(),
        2
    );
}

#[test]
fn concurrent_updates_do_not_lose_writes() {
    let cache = single_tier();
    cache.add("n".into(), 0).unwrap();

    let updates = Arc::new(AtomicUsize::new(0));
    std::thread::scope(|scope| {
        for _ in 0..4 {
            let cache = cache.clone();
            let updates = Arc::clone(&updates);
            scope.spawn(move || {
                for _ in 0..50 {
                    cache.update(&"n".to_string(), |v| Some(v + 1)).unwrap();
                    updates.fetch_add(1, Ordering::Relaxed);
                }
            });
        }
    });

    assert_eq!(updates.load(Ordering::Relaxed), 200);
    assert_eq!(cache.get(&"n".to_string()), Some(200));
}
