//! Property-based tests for the request to result cache.
//!
//! These tests verify the accounting and lookup contracts of [`Cache`]:
//! - Every lookup is counted exactly once, as a hit or a miss
//! - A lookup returns the most recent result stored for its request
//! - `get_or_compute` runs each distinct computation once

// Integration tests can use unwrap/expect for cleaner assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use kiln_cache::Cache;
use kiln_cas::Value;
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

/// Requests are drawn from a small pool so sequences revisit them
const REQUEST_POOL: usize = 4;

#[derive(Debug, Clone)]
enum Op {
    Lookup(usize),
    Store(usize, i64),
}

fn request(index: usize) -> Value {
    Value::Sequence(vec![Value::str("compile"), Value::str(format!("File{index}.java"))])
}

// =============================================================================
// Strategies for generating test data
// =============================================================================

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..REQUEST_POOL).prop_map(Op::Lookup),
        (0..REQUEST_POOL, any::<i64>()).prop_map(|(i, result)| Op::Store(i, result)),
    ]
}

// =============================================================================
// Property Tests: Lookups and statistics
// =============================================================================

proptest! {
    /// Contract: hits + misses equals the number of lookups, and each lookup
    /// sees the latest stored result
    #[test]
    fn lookups_follow_latest_store(ops in prop::collection::vec(op_strategy(), 0..40)) {
        let cache = Cache::in_memory();
        let mut expected: HashMap<usize, i64> = HashMap::new();
        let (mut lookups, mut hits) = (0_u64, 0_u64);

        for op in ops {
            match op {
                Op::Lookup(i) => {
                    let (_, found) = cache.get(&request(i)).unwrap();
                    lookups += 1;
                    if expected.contains_key(&i) {
                        hits += 1;
                    }
                    prop_assert_eq!(found, expected.get(&i).map(|r| Value::Int(*r)));
                }
                Op::Store(i, result) => {
                    let key = cache.storage().put(&request(i), true).unwrap();
                    cache.put(&key, &Value::Int(result)).unwrap();
                    expected.insert(i, result);
                }
            }
        }

        let stats = cache.stats();
        prop_assert_eq!(stats.total(), lookups);
        prop_assert_eq!(stats.hits(), hits);
        prop_assert_eq!(stats.misses(), lookups - hits);
        prop_assert_eq!(cache.items().unwrap().len(), expected.len());
    }

    /// Contract: each distinct request is computed once; repeats are hits
    #[test]
    fn get_or_compute_runs_once_per_request(
        requests in prop::collection::vec(0..REQUEST_POOL, 1..30)
    ) {
        let cache = Cache::in_memory();
        let mut computed: HashSet<usize> = HashSet::new();

        for &i in &requests {
            let mut ran = false;
            let (_, result) = cache
                .get_or_compute(&request(i), || {
                    ran = true;
                    Ok::<_, String>(Value::Int(i64::try_from(i).unwrap()))
                })
                .unwrap();
            prop_assert_eq!(result, Value::Int(i64::try_from(i).unwrap()));
            prop_assert_eq!(ran, computed.insert(i));
        }

        let distinct = computed.len() as u64;
        prop_assert_eq!(cache.stats().misses(), distinct);
        prop_assert_eq!(cache.stats().hits(), requests.len() as u64 - distinct);
    }
}
