//! Append Semantics Tests
//!
//! Optimistic concurrency checks, version assignment and argument validation.

use crate::common::*;
use streamlog::{ErrorKind, MAX_PAYLOAD_SIZE, MAX_STREAM_KEY_LEN};

#[test]
fn orders_scenario_end_to_end() {
    let test = TestStore::new();
    let store = test.store();

    let b1 = store.append("orders", b"b1".to_vec(), ExpectedVersion::Any).unwrap();
    assert_eq!((b1.stream_version, b1.store_version), (1, 1));

    let b2 = store.append("orders", b"b2".to_vec(), 1u64).unwrap();
    assert_eq!((b2.stream_version, b2.store_version), (2, 2));

    let err = store.append("orders", b"b3".to_vec(), 1u64).unwrap_err();
    assert!(matches!(
        err,
        Error::ConcurrencyConflict {
            expected: 1,
            actual: 2,
            ..
        }
    ));

    let stream: Vec<_> = store
        .read_stream("orders", 0, 10)
        .unwrap()
        .iter()
        .map(|r| (r.payload().to_vec(), r.stream_version()))
        .collect();
    assert_eq!(stream, vec![(b"b1".to_vec(), 1), (b"b2".to_vec(), 2)]);

    let tail: Vec<_> = store
        .read_all(1, 10)
        .unwrap()
        .iter()
        .map(|r| (r.payload().to_vec(), r.store_version()))
        .collect();
    assert_eq!(tail, vec![(b"b2".to_vec(), 2)]);
}

#[test]
fn no_stream_expectation() {
    let test = TestStore::new();
    let store = test.store();

    store
        .append("user-1", b"registered".to_vec(), ExpectedVersion::NO_STREAM)
        .unwrap();

    let err = store
        .append("user-1", b"registered again".to_vec(), ExpectedVersion::NO_STREAM)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConcurrencyConflict);
}

#[test]
fn any_always_succeeds() {
    let test = TestStore::new();
    let store = test.store();

    for i in 1..=20u64 {
        let outcome = store
            .append("s", i.to_le_bytes().to_vec(), ExpectedVersion::Any)
            .unwrap();
        assert_eq!(outcome.stream_version, i);
    }
}

#[test]
fn conflict_message_names_stream_and_versions() {
    let test = TestStore::new();
    let store = test.store();
    fill(store, "cart", 3);

    let err = store.append("cart", b"x".to_vec(), 1u64).unwrap_err();
    assert_eq!(err.to_string(), "Expected version 1 in stream 'cart' but got 3");
}

#[test]
fn rejection_changes_nothing() {
    let test = TestStore::new();
    let store = test.store();
    fill(store, "a", 2);
    fill(store, "b", 1);
    let before = all_versions(store, 0);

    assert!(store.append("a", b"x".to_vec(), 0u64).is_err());
    assert!(store.append("a", b"x".to_vec(), 7u64).is_err());
    assert!(store.append("", b"x".to_vec(), ExpectedVersion::Any).is_err());

    assert_eq!(all_versions(store, 0), before);
    assert_eq!(store.stream_version("a").unwrap(), 2);
    assert_eq!(store.store_version().unwrap(), 3);

    let next = store.append("b", b"y".to_vec(), 1u64).unwrap();
    assert_eq!((next.stream_version, next.store_version), (2, 4));
}

#[test]
fn key_and_payload_limits() {
    let test = TestStore::new();
    let store = test.store();

    let max_key = "k".repeat(MAX_STREAM_KEY_LEN);
    store.append(&max_key, b"ok".to_vec(), ExpectedVersion::Any).unwrap();

    let long_key = "k".repeat(MAX_STREAM_KEY_LEN + 1);
    let err = store
        .append(&long_key, b"x".to_vec(), ExpectedVersion::Any)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let huge = vec![0u8; MAX_PAYLOAD_SIZE + 1];
    let err = store.append("s", huge, ExpectedVersion::Any).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    assert_eq!(store.store_version().unwrap(), 1);
    assert_eq!(store.metrics().rejected, 2);
}

#[test]
fn keys_are_case_sensitive_and_opaque() {
    let test = TestStore::new();
    let store = test.store();

    store.append("Orders", b"1".to_vec(), ExpectedVersion::Any).unwrap();
    store.append("orders", b"2".to_vec(), ExpectedVersion::Any).unwrap();
    store.append("orders/é", b"3".to_vec(), ExpectedVersion::Any).unwrap();

    assert_eq!(store.stream_version("Orders").unwrap(), 1);
    assert_eq!(store.stream_version("orders").unwrap(), 1);
    assert_eq!(store.stream_version("orders/é").unwrap(), 1);
    assert_eq!(store.stream_count().unwrap(), 3);
}

#[test]
fn metrics_track_outcomes() {
    let test = TestStore::new();
    let store = test.store();

    fill(store, "a", 3);
    let _ = store.append("a", b"x".to_vec(), 0u64);
    let _ = store.append("", b"x".to_vec(), ExpectedVersion::Any);

    let m = store.metrics();
    assert_eq!(m.appends, 3);
    assert_eq!(m.conflicts, 1);
    assert_eq!(m.rejected, 1);
    assert_eq!(m.records, 3);
    assert_eq!(m.streams, 1);
}
