use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

// Entries are dropped lazily once nobody holds or waits on them.
const PRUNE_ABOVE: usize = 256;

/// One async mutex per key. Holding the guard for a game id is what makes
/// state transitions of that game single-writer.
pub struct KeyedLocks<K: Eq + Hash> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        KeyedLocks { locks: DashMap::new() }
    }

    pub async fn lock(&self, key: &K) -> OwnedMutexGuard<()> {
        if self.locks.len() > PRUNE_ABOVE {
            self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        // The shard guard must be released before waiting on the key's mutex.
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}
