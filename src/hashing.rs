//! This module provides a deterministic hasher and `HashMap` and `HashSet` variants that use
//! it. The hashing data structures in the standard library are not deterministic:
//!
//! > By default, HashMap uses a hashing algorithm selected to provide
//! > resistance against HashDoS attacks. The algorithm is randomly seeded, and a
//! > reasonable best-effort is made to generate this seed from a high quality,
//! > secure source of randomness provided by the host without blocking the program.
//!
//! Iteration order of catalogs and neighbor groupings must not change between runs with the same
//! seed, so the crate uses `rustc_hash`'s `FxHashMap` everywhere. Use `HashMap::default()` to
//! create one. The `HashMapExt` / `HashSetExt` traits provide `new` and `with_capacity`.
//!
//! The `hash_str` free function derives the seed offset of a named random stream.

use std::collections::{HashMap as StdHashMap, HashSet as StdHashSet};
use std::hash::Hash;

use rustc_hash::FxBuildHasher;
use xxhash_rust::xxh3::xxh3_64;

pub type HashMap<K, V> = StdHashMap<K, V, FxBuildHasher>;
pub type HashSet<T> = StdHashSet<T, FxBuildHasher>;

pub trait HashMapExt {
    fn new() -> Self;
    fn with_capacity(capacity: usize) -> Self;
}

impl<K: Hash + Eq, V> HashMapExt for HashMap<K, V> {
    fn new() -> Self {
        HashMap::default()
    }

    fn with_capacity(capacity: usize) -> Self {
        HashMap::with_capacity_and_hasher(capacity, FxBuildHasher)
    }
}

pub trait HashSetExt {
    fn new() -> Self;
    fn with_capacity(capacity: usize) -> Self;
}

impl<T: Hash + Eq> HashSetExt for HashSet<T> {
    fn new() -> Self {
        HashSet::default()
    }

    fn with_capacity(capacity: usize) -> Self {
        HashSet::with_capacity_and_hasher(capacity, FxBuildHasher)
    }
}

/// A convenience method to compute a stable 64-bit hash of a `&str`. Stable across platforms and
/// runs, which is what named random streams need.
#[must_use]
pub fn hash_str(data: &str) -> u64 {
    xxh3_64(data.as_bytes())
}
