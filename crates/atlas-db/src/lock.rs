use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-key async mutual exclusion.
///
/// Holders of the same key serialize; distinct keys proceed in parallel.
/// The catalog uses this to give each room name a single writer, the sync
/// coordinator to order rebuilds per (deployment, room) pair.
pub struct KeyedLocks<K> {
    inner: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub async fn acquire(&self, key: K) -> OwnedMutexGuard<()> {
        let slot = {
            let mut map = self.inner.lock().await;
            Arc::clone(map.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))))
        };
        slot.lock_owned().await
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}
