//! Per-key mutual exclusion within a single process.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// A table of exclusive locks, one per key, created on demand.
///
/// Entries are reference-counted by the number of outstanding
/// [`LockHandle`]s and removed once the last handle is dropped, so the table
/// only ever holds keys with requests in flight.
///
/// The table itself is guarded by a separate mutex which is held only while
/// an entry is added, looked up, or removed, never while waiting for
/// a per-key lock.
#[derive(Debug, Default)]
pub struct LockRegistry {
    table: Mutex<HashMap<String, Entry>>,
}

#[derive(Debug)]
struct Entry {
    holders: usize,
    lock: Arc<Mutex<()>>,
}

/// Registration of interest in a key.
///
/// Keeps the key's entry alive. Call [`LockHandle::lock`] to actually enter
/// the critical section.
#[must_use]
pub struct LockHandle<'r> {
    registry: &'r LockRegistry,
    key: String,
    lock: Arc<Mutex<()>>,
}

/// Proof of exclusive access to a key. Unlocks when dropped.
#[must_use]
pub struct KeyGuard<'h> {
    _guard: MutexGuard<'h, ()>,
}

impl LockRegistry {
    pub fn new() -> LockRegistry {
        LockRegistry::default()
    }

    /// Register interest in `key`, creating its entry if necessary.
    pub fn acquire(&self, key: &str) -> LockHandle {
        let mut table = self.table();
        let entry = table.entry(key.to_string()).or_insert_with(|| Entry {
            holders: 0,
            lock: Arc::new(Mutex::new(())),
        });
        entry.holders += 1;

        LockHandle {
            registry: self,
            key: key.to_string(),
            lock: entry.lock.clone(),
        }
    }

    /// Number of keys currently present in the table.
    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of outstanding handles for `key`.
    pub fn holders(&self, key: &str) -> usize {
        self.table().get(key).map_or(0, |entry| entry.holders)
    }

    fn table(&self) -> MutexGuard<HashMap<String, Entry>> {
        // Table mutations never panic half-way, so a poisoned table is still
        // consistent.
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, key: &str) {
        let mut table = self.table();

        let remove = match table.get_mut(key) {
            Some(entry) => {
                entry.holders -= 1;
                entry.holders == 0
            }
            None => false,
        };

        if remove {
            table.remove(key);
        }
    }
}

impl<'r> LockHandle<'r> {
    /// Block until exclusive access to this handle's key is obtained.
    pub fn lock(&self) -> KeyGuard {
        KeyGuard {
            // Per-key locks guard no data; a panic while holding one leaves
            // nothing to clean up.
            _guard: self.lock.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl<'r> Drop for LockHandle<'r> {
    fn drop(&mut self) {
        self.registry.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Barrier, atomic::{AtomicUsize, Ordering}, mpsc},
        thread,
        time::Duration,
    };
    use super::*;

    #[test]
    fn same_key_is_exclusive() {
        let registry = Arc::new(LockRegistry::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let total = Arc::new(AtomicUsize::new(0));

        let threads = (0..8).map(|_| {
            let registry = registry.clone();
            let inside = inside.clone();
            let total = total.clone();

            thread::spawn(move || for _ in 0..50 {
                let handle = registry.acquire("article");
                let _guard = handle.lock();
                assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                thread::yield_now();
                total.fetch_add(1, Ordering::SeqCst);
                inside.fetch_sub(1, Ordering::SeqCst);
            })
        }).collect::<Vec<_>>();

        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(total.load(Ordering::SeqCst), 400);
        assert!(registry.is_empty());
    }

    #[test]
    fn different_keys_do_not_block() {
        let registry = Arc::new(LockRegistry::new());
        let handle = registry.acquire("a");
        let _guard = handle.lock();

        let (tx, rx) = mpsc::channel();
        let other = registry.clone();
        let thread = thread::spawn(move || {
            let handle = other.acquire("b");
            let _guard = handle.lock();
            tx.send(()).unwrap();
        });

        rx.recv_timeout(Duration::from_secs(5))
            .expect("lock on another key was blocked");
        thread.join().unwrap();
    }

    #[test]
    fn entries_are_counted_and_collected() {
        let registry = LockRegistry::new();

        let first = registry.acquire("a");
        let second = registry.acquire("a");
        let third = registry.acquire("b");
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.holders("a"), 2);

        drop(first);
        assert_eq!(registry.holders("a"), 1);
        drop(second);
        assert_eq!(registry.holders("a"), 0);
        assert_eq!(registry.len(), 1);
        drop(third);
        assert!(registry.is_empty());
    }

    #[test]
    fn waiters_share_one_entry() {
        let registry = Arc::new(LockRegistry::new());
        let barrier = Arc::new(Barrier::new(2));

        let handle = registry.acquire("a");
        let guard = handle.lock();

        let waiter = {
            let registry = registry.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let handle = registry.acquire("a");
                barrier.wait();
                let _guard = handle.lock();
            })
        };

        barrier.wait();
        assert_eq!(registry.holders("a"), 2);
        drop(guard);
        waiter.join().unwrap();
        drop(handle);
        assert!(registry.is_empty());
    }
}
