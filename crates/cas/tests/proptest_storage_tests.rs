//! Property-based tests for digests, key-value stores and storage.
//!
//! These tests verify the behavioral contracts of the content store:
//! - Determinism: the same bytes always produce the same digest
//! - Validation: only correctly sized byte strings become digests
//! - Write-once: the first value written under a key is kept
//! - Round-trip: every value comes back unchanged, nested or not

// Integration tests can use unwrap/expect for cleaner assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use kiln_cas::{DIGEST_LEN, Digest, Error, InMemoryKeyValueStore, KeyValueStore, Storage, Value};
use proptest::prelude::*;
use std::collections::HashSet;

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// Generate scalar (leaf) values
fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        "[a-zA-Z0-9 ._-]{0,16}".prop_map(Value::Str),
        prop::collection::vec(any::<u8>(), 0..32).prop_map(Value::Bytes),
        any::<[u8; DIGEST_LEN]>().prop_map(|b| Value::Digest(Digest::from(b))),
    ]
}

/// Generate value trees up to a few levels deep
fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Sequence),
            ("[A-Z][a-z]{0,8}", prop::collection::vec(inner.clone(), 0..4))
                .prop_map(|(kind, items)| Value::collection(kind, items)),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..3).prop_map(Value::Map),
        ]
    })
}

// =============================================================================
// Property Tests: Digest
// =============================================================================

proptest! {
    /// Contract: hashing is a pure function of the bytes
    #[test]
    fn digest_is_deterministic(blob in prop::collection::vec(any::<u8>(), 0..256)) {
        prop_assert_eq!(Digest::create(&blob), Digest::create(&blob.clone()));
    }

    /// Contract: only byte strings of the digest length are accepted
    #[test]
    fn digest_length_is_validated(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        match Digest::from_slice(&bytes) {
            Ok(digest) => {
                prop_assert_eq!(bytes.len(), DIGEST_LEN);
                prop_assert_eq!(digest.as_bytes().as_slice(), bytes.as_slice());
            }
            Err(Error::InvalidDigest { expected, actual }) => {
                prop_assert_ne!(bytes.len(), DIGEST_LEN);
                prop_assert_eq!(expected, DIGEST_LEN);
                prop_assert_eq!(actual, bytes.len());
            }
            Err(other) => prop_assert!(false, "unexpected error: {other:?}"),
        }
    }

    /// Contract: hex rendering parses back to the same digest
    #[test]
    fn digest_hex_roundtrip(bytes in any::<[u8; DIGEST_LEN]>()) {
        let digest = Digest::from(bytes);
        prop_assert_eq!(Digest::from_hex(&digest.to_hex()).unwrap(), digest);
    }
}

#[test]
fn digest_sample_has_no_collisions() {
    let digests: HashSet<Digest> = (0u32..20_000)
        .map(|i| Digest::create(format!("input-{i}").as_bytes()))
        .collect();
    assert_eq!(digests.len(), 20_000);
}

// =============================================================================
// Property Tests: Key-value stores
// =============================================================================

proptest! {
    /// Contract: a second put never overwrites the first value
    #[test]
    fn put_is_write_once(
        key in prop::collection::vec(any::<u8>(), 1..40),
        first in prop::collection::vec(any::<u8>(), 0..40),
        second in prop::collection::vec(any::<u8>(), 0..40),
    ) {
        prop_assume!(first != second);
        let store = InMemoryKeyValueStore::new();
        prop_assert!(store.put(&key, &first).unwrap());
        prop_assert!(!store.put(&key, &second).unwrap());
        prop_assert_eq!(store.get(&key).unwrap(), first);
    }
}

// =============================================================================
// Property Tests: Storage
// =============================================================================

proptest! {
    /// Contract: every value round-trips through nested storage
    #[test]
    fn nested_roundtrip(value in value_strategy()) {
        let storage = Storage::in_memory();
        let key = storage.put(&value, true).unwrap();
        prop_assert_eq!(storage.get(&key, true).unwrap(), value);
    }

    /// Contract: every value round-trips through flat storage
    #[test]
    fn flat_roundtrip(value in value_strategy()) {
        let storage = Storage::in_memory();
        let key = storage.put(&value, false).unwrap();
        prop_assert_eq!(storage.get(&key, false).unwrap(), value);
    }

    /// Contract: the same value always gets the same key, in any storage
    #[test]
    fn storage_key_is_deterministic(value in value_strategy()) {
        let a = Storage::in_memory();
        let b = Storage::in_memory();
        prop_assert_eq!(a.put(&value, true).unwrap(), b.put(&value, true).unwrap());
    }

    /// Contract: a shared element is stored once for all containers holding it
    #[test]
    fn shared_element_is_deduplicated(
        shared in scalar_strategy(),
        b in scalar_strategy(),
        c in scalar_strategy(),
    ) {
        let storage = Storage::in_memory();
        let shared_key = storage.put(&shared, true).unwrap();
        let before = storage.content_store().len().unwrap();

        storage.put(&Value::Sequence(vec![shared.clone(), b.clone()]), true).unwrap();
        storage.put(&Value::Sequence(vec![shared.clone(), c.clone()]), true).unwrap();

        let blob = storage.content_store().get(shared_key.as_bytes()).unwrap();
        let copies = storage
            .content_store()
            .items()
            .unwrap()
            .into_iter()
            .filter(|(_, v)| *v == blob)
            .count();
        prop_assert_eq!(copies, 1);
        // At most b, c and the two containers were added
        prop_assert!(storage.content_store().len().unwrap() <= before + 4);
    }
}
