//! Lifecycle Tests
//!
//! Open/close semantics, the directory lock and the config file.

use crate::common::*;
use std::sync::{Arc, Barrier};
use std::thread;
use streamlog::{DurabilityMode, ErrorKind, CONFIG_FILE_NAME};

#[test]
fn close_is_idempotent() {
    let test = TestStore::new();
    let store = test.store();
    fill(store, "s", 2);

    store.close().unwrap();
    store.close().unwrap();
    assert!(!store.is_open());
}

#[test]
fn every_operation_fails_after_close() {
    let test = TestStore::new();
    let store = test.store();
    fill(store, "s", 2);
    store.close().unwrap();

    let errors = vec![
        store.append("s", b"x".to_vec(), ExpectedVersion::Any).err(),
        store.read_stream("s", 0, 10).err(),
        store.read_all(0, 10).err(),
        store.stream_version("s").err(),
        store.store_version().err(),
        store.stream_count().err(),
        store.flush().err(),
    ];
    for err in errors {
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::StoreClosed));
    }
}

#[test]
fn close_releases_directory_lock() {
    let test = TestStore::new();
    let err = AppendOnlyStore::open(test.dir.path()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageFailure);

    test.store().close().unwrap();
    let again = AppendOnlyStore::open(test.dir.path()).unwrap();
    assert!(again.is_open());
}

#[test]
fn drop_closes_store() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = AppendOnlyStore::open(dir.path()).unwrap();
        fill(&store, "s", 3);
    }
    let store = AppendOnlyStore::open(dir.path()).unwrap();
    assert_eq!(store.store_version().unwrap(), 3);
}

#[test]
fn close_while_appending() {
    let mut test = TestStore::new();
    let store = Arc::new(test.store.take().unwrap());
    let barrier = Arc::new(Barrier::new(5));

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let key = format!("w{}", t);
                let mut committed = 0u64;
                loop {
                    match store.append(&key, b"x".to_vec(), ExpectedVersion::Any) {
                        Ok(outcome) => committed = outcome.stream_version,
                        Err(Error::StoreClosed) => return (key, committed),
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
            })
        })
        .collect();

    barrier.wait();
    thread::sleep(std::time::Duration::from_millis(20));
    store.close().unwrap();

    let results: Vec<(String, u64)> = writers.into_iter().map(|h| h.join().unwrap()).collect();
    drop(store);

    test.reopen();
    for (key, committed) in results {
        assert_eq!(test.store().stream_version(&key).unwrap(), committed);
    }
}

#[test]
fn open_writes_default_config() {
    let dir = tempfile::tempdir().unwrap();
    let store = AppendOnlyStore::open(dir.path()).unwrap();

    assert!(dir.path().join(CONFIG_FILE_NAME).exists());
    assert_eq!(store.durability_mode(), Some(DurabilityMode::Always));
    assert!(store.data_dir().is_some());
}

#[test]
fn edited_config_is_picked_up() {
    let dir = tempfile::tempdir().unwrap();
    AppendOnlyStore::open(dir.path()).unwrap().close().unwrap();

    std::fs::write(
        dir.path().join(CONFIG_FILE_NAME),
        "durability = \"standard\"\nflush_interval_ms = 50\n",
    )
    .unwrap();

    let store = AppendOnlyStore::open(dir.path()).unwrap();
    assert!(matches!(
        store.durability_mode(),
        Some(DurabilityMode::Standard {
            interval_ms: 50,
            batch_size: 1000
        })
    ));
}

#[test]
fn broken_config_refuses_to_open() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(CONFIG_FILE_NAME), "durability = 5\n").unwrap();

    let err = AppendOnlyStore::open(dir.path()).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn ephemeral_store_is_fully_functional() {
    let store = AppendOnlyStore::ephemeral();
    fill(&store, "a", 3);
    fill(&store, "b", 2);
    assert_eq!(all_versions(&store, 0).len(), 5);
    assert!(store.data_dir().is_none());
    store.close().unwrap();
    assert!(store.read_all(0, 1).is_err());
}
