//! Per-key async mutual exclusion.
//!
//! Guarantees at most one in-flight mutation per bonus id and serialises
//! claims per `(player, template)`. [`KeyedRwLocks`] lets claims on a
//! template run side by side while catalog edits of that template wait.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, Mutex as StdMutex},
};
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

type LockMap<K, L> = Arc<StdMutex<HashMap<K, Arc<L>>>>;

fn entry<K: Eq + Hash, L: Default>(locks: &LockMap<K, L>, key: K) -> Arc<L> {
    let mut locks = locks.lock().unwrap_or_else(|e| e.into_inner());
    locks.entry(key).or_default().clone()
}

fn tracked<K, L>(locks: &LockMap<K, L>) -> usize {
    locks.lock().unwrap_or_else(|e| e.into_inner()).len()
}

/// Map of lazily created async mutexes, pruned once unused
pub struct KeyedLocks<K> {
    locks: LockMap<K, Mutex<()>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: Arc::new(StdMutex::new(HashMap::new())),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: K) -> KeyedGuard<K> {
        let guard = entry(&self.locks, key.clone()).lock_owned().await;
        Guard {
            key,
            guard: Some(guard),
            locks: self.locks.clone(),
        }
    }

    /// Number of keys currently tracked
    pub fn len(&self) -> usize {
        tracked(&self.locks)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Map of lazily created async read/write locks, pruned once unused
pub struct KeyedRwLocks<K> {
    locks: LockMap<K, RwLock<()>>,
}

impl<K> Default for KeyedRwLocks<K> {
    fn default() -> Self {
        Self {
            locks: Arc::new(StdMutex::new(HashMap::new())),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedRwLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared access to `key`; waits while a writer holds it.
    pub async fn read(&self, key: K) -> KeyedReadGuard<K> {
        let guard = entry(&self.locks, key.clone()).read_owned().await;
        Guard {
            key,
            guard: Some(guard),
            locks: self.locks.clone(),
        }
    }

    /// Exclusive access to `key`; waits for every reader to leave.
    pub async fn write(&self, key: K) -> KeyedWriteGuard<K> {
        let guard = entry(&self.locks, key.clone()).write_owned().await;
        Guard {
            key,
            guard: Some(guard),
            locks: self.locks.clone(),
        }
    }

    pub fn len(&self) -> usize {
        tracked(&self.locks)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Held lock on one key; released on drop
pub struct Guard<K: Eq + Hash, L, G> {
    key: K,
    guard: Option<G>,
    locks: LockMap<K, L>,
}

pub type KeyedGuard<K> = Guard<K, Mutex<()>, OwnedMutexGuard<()>>;
pub type KeyedReadGuard<K> = Guard<K, RwLock<()>, OwnedRwLockReadGuard<()>>;
pub type KeyedWriteGuard<K> = Guard<K, RwLock<()>, OwnedRwLockWriteGuard<()>>;

impl<K: Eq + Hash, L, G> Drop for Guard<K, L, G> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks
            .get(&self.key)
            .is_some_and(|l| Arc::strong_count(l) == 1)
        {
            locks.remove(&self.key);
        }
    }
}
