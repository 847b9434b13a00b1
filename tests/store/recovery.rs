//! Crash Recovery Tests
//!
//! Simulates crashes by damaging WAL segments between close and reopen, and
//! checks that committed records survive and numbering continues.

use crate::common::*;
use streamlog::{ErrorKind, Limits};

#[test]
fn reopen_preserves_every_record() {
    let mut test = TestStore::new();
    fill(test.store(), "orders", 10);
    fill(test.store(), "users", 5);
    let before = all_versions(test.store(), 0);

    test.reopen();

    assert_eq!(all_versions(test.store(), 0), before);
    assert_eq!(test.store().stream_count().unwrap(), 2);
}

#[test]
fn numbering_continues_after_reopen() {
    let mut test = TestStore::new();
    fill(test.store(), "s", 3);
    test.reopen();

    let outcome = test.store().append("s", b"x".to_vec(), 3u64).unwrap();
    assert_eq!((outcome.stream_version, outcome.store_version), (4, 4));

    let err = test.store().append("s", b"y".to_vec(), 3u64).unwrap_err();
    assert!(err.is_conflict());
}

#[test]
fn torn_tail_is_discarded() {
    let mut test = TestStore::new();
    fill(test.store(), "s", 5);
    test.close();

    // Half of a frame: a length prefix announcing more bytes than follow
    let segment = test.last_segment();
    append_garbage(&segment, &[200, 0, 0, 0, 1, 2, 3]);
    let damaged = file_size(&segment);

    test.reopen();
    assert_eq!(test.store().store_version().unwrap(), 5);
    assert_eq!(file_size(&segment), damaged - 7);

    let next = test.store().append("s", b"after".to_vec(), 5u64).unwrap();
    assert_eq!(next.store_version, 6);

    test.reopen();
    assert_eq!(test.store().store_version().unwrap(), 6);
    let last = test.store().read_stream("s", 5, 1).unwrap().to_vec();
    assert_eq!(last[0].payload(), b"after");
}

#[test]
fn zero_filled_tail_is_discarded() {
    let mut test = TestStore::new();
    fill(test.store(), "s", 3);
    test.close();

    // Preallocated but never written, as left behind by a crash
    let segment = test.segment_path(1);
    let intact = file_size(&segment);
    append_garbage(&segment, &[0u8; 64]);

    test.reopen();
    let store = test.store();
    assert_eq!(store.store_version().unwrap(), 3);
    assert_eq!(store.read_stream("s", 0, 10).unwrap().len(), 3);
    assert_eq!(file_size(&segment), intact);

    let next = store.append("s", b"after".to_vec(), 3u64).unwrap();
    assert_eq!(next.store_version, 4);
}

#[test]
fn raised_limits_never_produce_unreadable_records() {
    let mut test = TestStore::new();
    let store = test.store.take().unwrap().with_limits(Limits {
        max_stream_key_bytes: 1024,
        max_payload_bytes: 128 * 1024 * 1024,
    });
    assert!(store.limits().max_payload_bytes < 64 * 1024 * 1024);

    let oversized = vec![7u8; 65 * 1024 * 1024];
    let err = store.append("big", oversized, ExpectedVersion::Any).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    store.append("big", b"small".to_vec(), ExpectedVersion::Any).unwrap();
    test.store = Some(store);

    test.reopen();
    assert_eq!(test.store().store_version().unwrap(), 1);
}

#[test]
fn truncated_last_record_is_lost_cleanly() {
    let mut test = TestStore::new();
    fill(test.store(), "s", 4);
    test.close();

    let segment = test.last_segment();
    truncate_file(&segment, file_size(&segment) - 3);

    test.reopen();
    let store = test.store();
    assert_eq!(store.store_version().unwrap(), 3);
    assert_eq!(store.read_stream("s", 0, 10).unwrap().len(), 3);

    let outcome = store.append("s", b"again".to_vec(), 3u64).unwrap();
    assert_eq!(outcome.store_version, 4);
}

#[test]
fn bit_flip_in_middle_of_log_is_corruption() {
    let mut test = TestStore::new();
    fill(test.store(), "s", 5);
    test.close();

    // Inside the first frame's store version field
    corrupt_file_at_offset(&test.segment_path(1), 32 + 6, &[0xEE]);

    let err = test.try_reopen().unwrap_err();
    assert!(matches!(err, Error::Corruption(_)));
    assert_eq!(err.kind(), ErrorKind::StorageFailure);
}

#[test]
fn damage_in_rotated_segment_is_corruption() {
    let mut test = TestStore::small_segments();
    fill(test.store(), "s", 300);
    test.close();
    assert!(test.segment_count() > 2);

    let first = test.segment_path(1);
    truncate_file(&first, file_size(&first) - 5);

    assert!(test.try_reopen().is_err());
}

#[test]
fn recovery_across_many_segments() {
    let mut test = TestStore::small_segments();
    for i in 0..400 {
        let key = format!("s{}", i % 7);
        test.store()
            .append(&key, vec![b'z'; 50], ExpectedVersion::Any)
            .unwrap();
    }
    let before = all_versions(test.store(), 0);
    let segments = test.segment_count();
    assert!(segments > 3);

    test.reopen();
    assert_eq!(all_versions(test.store(), 0), before);

    // Appends keep going into the last segment rather than a new one
    fill(test.store(), "s0", 1);
    assert!(test.segment_count() <= segments + 1);
}

#[test]
fn standard_mode_records_survive_clean_close() {
    let mut test = TestStore::with_config(StoreConfig {
        flush_interval_ms: 5,
        flush_batch_size: 1_000_000,
        ..StoreConfig::standard()
    });
    fill(test.store(), "s", 25);

    test.reopen();
    assert_eq!(test.store().store_version().unwrap(), 25);
}

#[test]
fn explicit_flush_in_standard_mode() {
    let test = TestStore::with_config(StoreConfig {
        flush_interval_ms: 60_000,
        ..StoreConfig::standard()
    });
    fill(test.store(), "s", 3);
    test.store().flush().unwrap();
    assert!(file_size(&test.last_segment()) > 32);
}

#[test]
fn empty_store_reopens_empty() {
    let mut test = TestStore::new();
    test.reopen();
    let store = test.store();
    assert_eq!(store.store_version().unwrap(), 0);
    assert!(store.read_all(0, 10).unwrap().is_empty());
}
