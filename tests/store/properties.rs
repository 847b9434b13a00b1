//! Property Tests
//!
//! Random operation sequences checked against a plain in-memory model.

use crate::common::*;
use proptest::prelude::*;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
enum Expect {
    Any,
    Current,
    Stale(u64),
}

#[derive(Debug, Clone)]
struct Op {
    stream: u8,
    payload: Vec<u8>,
    expect: Expect,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    (
        0u8..5,
        prop::collection::vec(any::<u8>(), 0..32),
        prop_oneof![
            Just(Expect::Any),
            Just(Expect::Current),
            (1u64..4).prop_map(Expect::Stale),
        ],
    )
        .prop_map(|(stream, payload, expect)| Op {
            stream,
            payload,
            expect,
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn store_matches_model(ops in prop::collection::vec(op_strategy(), 1..80)) {
        let store = AppendOnlyStore::ephemeral();
        let mut heads: HashMap<String, u64> = HashMap::new();
        let mut log: Vec<(String, Vec<u8>, u64)> = Vec::new();

        for op in ops {
            let key = format!("stream-{}", op.stream);
            let head = *heads.get(&key).unwrap_or(&0);
            let expected = match op.expect {
                Expect::Any => ExpectedVersion::Any,
                Expect::Current => ExpectedVersion::Exact(head),
                // Offset from head, never equal to it
                Expect::Stale(delta) => ExpectedVersion::Exact(head + delta),
            };

            let result = store.append(&key, op.payload.clone(), expected);
            match op.expect {
                Expect::Stale(_) => {
                    let err = result.unwrap_err();
                    prop_assert!(err.is_conflict());
                }
                _ => {
                    let outcome = result.unwrap();
                    prop_assert_eq!(outcome.stream_version, head + 1);
                    prop_assert_eq!(outcome.store_version, log.len() as u64 + 1);
                    heads.insert(key.clone(), head + 1);
                    log.push((key, op.payload, head + 1));
                }
            }
        }

        let all = store.read_all(0, usize::MAX).unwrap().to_vec();
        prop_assert_eq!(all.len(), log.len());
        for (i, (record, (key, payload, stream_version))) in all.iter().zip(&log).enumerate() {
            prop_assert_eq!(record.store_version(), i as u64 + 1);
            prop_assert_eq!(record.key(), key.as_str());
            prop_assert_eq!(record.payload(), payload.as_slice());
            prop_assert_eq!(record.stream_version(), *stream_version);
        }

        for (key, head) in &heads {
            prop_assert_eq!(store.stream_version(key).unwrap(), *head);
            prop_assert_eq!(store.read_stream(key, 0, usize::MAX).unwrap().len() as u64, *head);
        }
    }

    #[test]
    fn paging_read_all_equals_one_read(
        keys in prop::collection::vec(0u8..4, 1..60),
        page in 1usize..10,
    ) {
        let store = AppendOnlyStore::ephemeral();
        for k in &keys {
            store.append(&format!("k{}", k), vec![*k], ExpectedVersion::Any).unwrap();
        }

        let mut paged = Vec::new();
        let mut checkpoint = 0;
        loop {
            let batch = store.read_all(checkpoint, page).unwrap().to_vec();
            if batch.is_empty() {
                break;
            }
            checkpoint = batch[batch.len() - 1].store_version();
            paged.extend(batch.iter().map(|r| r.store_version()));
        }

        let whole: Vec<u64> = all_versions(&store, 0).iter().map(|(_, _, g)| *g).collect();
        prop_assert_eq!(paged, whole);
    }
}
