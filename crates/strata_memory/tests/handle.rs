// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Public API tests for the in-memory handle.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use strata_core::{
    CacheHandle, CacheItem, Clock, ExpirationMode, HandleConfig, HandleRemovalEvent,
    RemovalReason, UpdateOutcome,
};
use strata_memory::InMemoryHandle;

type Handle = InMemoryHandle<String, String>;
type Removals = Arc<Mutex<Vec<HandleRemovalEvent<String, String>>>>;

fn frozen_handle() -> (Handle, Clock) {
    let clock = Clock::new_frozen();
    let handle = InMemoryHandle::builder().clock(clock.clone()).build();
    (handle, clock)
}

fn record_removals(handle: &Handle) -> Removals {
    let removals: Removals = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&removals);
    handle.set_removal_listener(Some(Arc::new(move |event| sink.lock().push(event))));
    removals
}

fn absolute_item(key: &str, value: &str, timeout: Duration, clock: &Clock) -> CacheItem<String, String> {
    CacheItem::new_at(key.to_string(), value.to_string(), clock.system_time())
        .with_absolute_expiration(timeout, clock.system_time())
        .unwrap()
}

#[test]
fn add_stores_only_when_absent() {
    let (handle, _clock) = frozen_handle();

    assert!(handle.add(CacheItem::new("k".into(), "v1".into())).unwrap());
    assert!(!handle.add(CacheItem::new("k".into(), "v2".into())).unwrap());

    let item = handle.get(&"k".to_string()).unwrap().unwrap();
    assert_eq!(item.value(), "v1");
    assert_eq!(handle.count(), 1);
}

#[test]
fn put_overwrites_unconditionally() {
    let (handle, _clock) = frozen_handle();

    handle.put(CacheItem::new("k".into(), "v1".into())).unwrap();
    handle.put(CacheItem::new("k".into(), "v2".into())).unwrap();

    let item = handle.get(&"k".to_string()).unwrap().unwrap();
    assert_eq!(item.value(), "v2");
    assert_eq!(handle.count(), 1);
}

#[test]
fn remove_and_clear() {
    let (handle, _clock) = frozen_handle();

    handle.put(CacheItem::new("a".into(), "1".into())).unwrap();
    handle.put(CacheItem::new("b".into(), "2".into())).unwrap();

    assert!(handle.remove(&"a".to_string()).unwrap());
    assert!(!handle.remove(&"a".to_string()).unwrap());

    handle.clear().unwrap();
    assert_eq!(handle.count(), 0);
    assert!(!handle.exists(&"b".to_string()).unwrap());
}

#[test]
fn get_drops_expired_entries_and_fires_one_event() {
    let (handle, clock) = frozen_handle();
    let removals = record_removals(&handle);

    handle
        .put(absolute_item("k", "v", Duration::from_millis(100), &clock))
        .unwrap();
    clock.advance(Duration::from_millis(150));

    assert!(handle.get(&"k".to_string()).unwrap().is_none());
    assert!(!handle.exists(&"k".to_string()).unwrap());

    // A following sweep must not fire a second event for the same removal.
    assert_eq!(handle.evict_expired(), 0);

    let events = removals.lock();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].key, "k");
    assert_eq!(events[0].reason, RemovalReason::Expired);
    assert_eq!(events[0].value.as_deref(), Some("v"));
}

#[test]
fn sweep_evicts_expired_entries_at_the_captured_now() {
    let (handle, clock) = frozen_handle();
    let removals = record_removals(&handle);

    handle
        .put(absolute_item("short", "a", Duration::from_millis(100), &clock))
        .unwrap();
    handle
        .put(absolute_item("long", "b", Duration::from_secs(60), &clock))
        .unwrap();

    clock.advance(Duration::from_millis(150));
    assert_eq!(handle.evict_expired(), 1);

    assert!(!handle.exists(&"short".to_string()).unwrap());
    assert!(handle.exists(&"long".to_string()).unwrap());
    assert_eq!(removals.lock().len(), 1);
}

#[test]
fn sliding_expiry_resets_on_get_but_not_on_exists() {
    let (handle, clock) = frozen_handle();

    let item = CacheItem::new_at("k".to_string(), "v".to_string(), clock.system_time())
        .with_sliding_expiration(Duration::from_millis(200))
        .unwrap();
    handle.put(item).unwrap();

    // Touch at 150 ms moves the deadline to 350 ms.
    clock.advance(Duration::from_millis(150));
    assert!(handle.get(&"k".to_string()).unwrap().is_some());

    // 300 ms is still inside the refreshed window; the deadline moves to 500 ms.
    clock.advance(Duration::from_millis(150));
    assert!(handle.get(&"k".to_string()).unwrap().is_some());

    // exists does not refresh, so the 500 ms deadline stands and passes.
    clock.advance(Duration::from_millis(199));
    assert!(handle.exists(&"k".to_string()).unwrap());
    clock.advance(Duration::from_millis(1));
    assert_eq!(handle.evict_expired(), 1);
    assert!(handle.get(&"k".to_string()).unwrap().is_none());
}

#[test]
fn add_replaces_an_expired_occupant() {
    let (handle, clock) = frozen_handle();
    let removals = record_removals(&handle);

    handle
        .put(absolute_item("k", "old", Duration::from_millis(100), &clock))
        .unwrap();
    clock.advance(Duration::from_millis(200));

    assert!(handle.add(CacheItem::new("k".into(), "new".into())).unwrap());
    let item = handle.get(&"k".to_string()).unwrap().unwrap();
    assert_eq!(item.value(), "new");

    let events = removals.lock();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].value.as_deref(), Some("old"));
}

#[test]
fn handle_defaults_apply_to_defaulting_items() {
    let clock = Clock::new_frozen();
    let handle: Handle = InMemoryHandle::builder()
        .clock(clock.clone())
        .config(
            HandleConfig::new("defaulted")
                .with_expiration(ExpirationMode::Absolute, Duration::from_millis(100)),
        )
        .build();

    handle.put(CacheItem::new("k".into(), "v".into())).unwrap();
    let stored = handle.get(&"k".to_string()).unwrap().unwrap();
    assert_eq!(stored.expiration_mode(), ExpirationMode::Absolute);
    assert!(stored.uses_default_expiration());

    clock.advance(Duration::from_millis(150));
    assert!(handle.get(&"k".to_string()).unwrap().is_none());
}

#[test]
fn update_applies_the_factory_under_the_handle_lock() {
    let (handle, _clock) = frozen_handle();
    handle.put(CacheItem::new("n".into(), "1".into())).unwrap();

    let outcome = handle
        .update(&"n".to_string(), &|v| Some(format!("{v}{v}")), 3)
        .unwrap();
    match outcome {
        UpdateOutcome::Success { item, tries } => {
            assert_eq!(item.value(), "11");
            assert_eq!(tries, 1);
        }
        other => panic!("expected success, got {other:?}"),
    }
    let stored = handle.get(&"n".to_string()).unwrap().unwrap();
    assert_eq!(stored.value(), "11");
}

#[test]
fn update_reports_missing_keys_and_declined_factories() {
    let (handle, _clock) = frozen_handle();

    let outcome = handle
        .update(&"absent".to_string(), &|_| Some("x".to_string()), 3)
        .unwrap();
    assert!(matches!(outcome, UpdateOutcome::ItemDidNotExist));

    handle.put(CacheItem::new("k".into(), "v".into())).unwrap();
    let outcome = handle.update(&"k".to_string(), &|_| None, 3).unwrap();
    assert!(matches!(outcome, UpdateOutcome::FactoryReturnedNone));
    assert_eq!(
        handle.get(&"k".to_string()).unwrap().unwrap().value(),
        "v"
    );
}

#[test]
fn background_scanner_sweeps_without_manual_calls() {
    let clock = Clock::new_frozen();
    let handle: Handle = InMemoryHandle::builder()
        .clock(clock.clone())
        .sweep_interval(Duration::from_millis(20))
        .build();
    let removals = record_removals(&handle);

    handle
        .put(absolute_item("k", "v", Duration::from_millis(50), &clock))
        .unwrap();
    clock.advance(Duration::from_millis(100));

    // First sweep is jittered into [4, 20) ms; 300 ms covers several ticks.
    let deadline = std::time::Instant::now() + Duration::from_millis(300);
    while handle.count() > 0 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }

    assert_eq!(handle.count(), 0);
    assert_eq!(removals.lock().len(), 1);
}

#[test]
fn dropping_the_handle_stops_the_scanner() {
    let handle: Handle = InMemoryHandle::builder()
        .sweep_interval(Duration::from_millis(10))
        .build();
    drop(handle);
    // Nothing to assert directly; the scanner exits on channel disconnect
    // and a leaked thread would keep the test binary alive.
    std::thread::sleep(Duration::from_millis(30));
}
