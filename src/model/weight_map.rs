use std::collections::HashMap;
use std::sync::Mutex;

const SHARD_BITS: u32 = 5;
const SHARD_COUNT: usize = 1 << SHARD_BITS;

/// A sharded, thread-safe map from feature index to weight record, standing
/// in for the original `libcuckoo::cuckoohash_map`. Each shard is an
/// independently locked `HashMap`; trainer threads racing on different
/// shards never contend, and two threads racing on the *same* entry simply
/// last-writer-wins, which is accepted by design (Hogwild!-style updates).
pub struct ConcurrentWeightMap<V: Clone> {
    shards: Vec<Mutex<HashMap<u32, V>>>,
}

impl<V: Clone> ConcurrentWeightMap<V> {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn shard_for(&self, idx: u32) -> &Mutex<HashMap<u32, V>> {
        &self.shards[(idx as usize) & (SHARD_COUNT - 1)]
    }

    /// Returns a clone of the current value for `idx`, if present.
    pub fn find(&self, idx: u32) -> Option<V> {
        self.shard_for(idx).lock().unwrap().get(&idx).cloned()
    }

    /// Inserts `val` only if `idx` is not already present; no-op otherwise.
    pub fn insert(&self, idx: u32, val: V) {
        self.shard_for(idx).lock().unwrap().entry(idx).or_insert(val);
    }

    /// Unconditionally overwrites the entry for `idx`.
    pub fn insert_or_assign(&self, idx: u32, val: V) {
        self.shard_for(idx).lock().unwrap().insert(idx, val);
    }

    pub fn size(&self) -> usize {
        self.shards.iter().map(|s| s.lock().unwrap().len()).sum()
    }

    /// Visits every entry under its shard's lock, one shard at a time —
    /// the equivalent of the original's `lock_table()` full scan used by
    /// `save`.
    pub fn locked_scan(&self, mut f: impl FnMut(u32, &V)) {
        for shard in &self.shards {
            let guard = shard.lock().unwrap();
            for (idx, val) in guard.iter() {
                f(*idx, val);
            }
        }
    }
}

impl<V: Clone> Default for ConcurrentWeightMap<V> {
    fn default() -> Self {
        Self::new()
    }
}
