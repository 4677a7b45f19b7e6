//! Hash-sharded, lock-striped map from packed block ids to small
//! per-block records.
//!
//! Every worker thread and the preserve aggregator hammer this map
//! concurrently, so instead of one mutex there is one per shard, and
//! each shard lives on its own cache line.

use crossbeam_utils::CachePadded;
use rustc_hash::FxHashMap;
use std::sync::Mutex;

// Prime; determined experimentally with benchmarks.
const SHARD_COUNT: usize = 1117;

/// Finalizer of MurmurHash3 (fmix64). Packed block ids are far too
/// regular to use directly as a shard index.
#[inline]
fn murmur64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    k ^= k >> 33;
    k
}

/// Sharded map keyed by packed block id.
pub struct ShardedMap<V> {
    shards: Box<[CachePadded<Mutex<FxHashMap<i64, V>>>]>,
}

impl<V: Default> ShardedMap<V> {
    pub fn new() -> Self {
        let mut shards = Vec::with_capacity(SHARD_COUNT);
        shards.resize_with(SHARD_COUNT, || CachePadded::new(Mutex::new(FxHashMap::default())));
        Self {
            shards: shards.into_boxed_slice(),
        }
    }

    #[inline]
    fn shard(&self, key: i64) -> &Mutex<FxHashMap<i64, V>> {
        &self.shards[(murmur64(key as u64) % SHARD_COUNT as u64) as usize]
    }

    /// Runs `f` on the entry for `key`, inserting a default value first
    /// if the key is absent. The shard lock is held across the call.
    pub fn update<R>(&self, key: i64, f: impl FnOnce(&mut V) -> R) -> R {
        let mut shard = self.shard(key).lock().expect("lock is poisoned");
        f(shard.entry(key).or_default())
    }

    /// Returns a copy of the entry for `key`, if present.
    pub fn get(&self, key: i64) -> Option<V>
    where
        V: Clone,
    {
        let shard = self.shard(key).lock().expect("lock is poisoned");
        shard.get(&key).cloned()
    }

    /// Total entry count, summed with each shard momentarily locked.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().expect("lock is poisoned").len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Default> Default for ShardedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}
