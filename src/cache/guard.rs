//! Lock-by-key guard serializing route-cache population.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::warn;

/// Named-lock table: callers sharing a key serialize around a critical
/// section. Acquisition is bounded; on timeout the caller proceeds without
/// the lock rather than deadlocking.
#[derive(Default)]
pub struct KeyLocks {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Acquire the lock for `key`, waiting at most `timeout`.
    ///
    /// The returned [`LockRef`] releases on drop; check [`LockRef::held`]
    /// to know whether acquisition succeeded.
    pub async fn acquire(self: &Arc<Self>, key: &str, timeout: Duration) -> LockRef {
        let slot = {
            let mut slots = self.slots.lock().unwrap();
            slots
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        let guard = match tokio::time::timeout(timeout, slot.lock_owned()).await {
            Ok(guard) => Some(guard),
            Err(_) => {
                warn!(key = %key, timeout = ?timeout, "lock acquisition timed out, proceeding unguarded");
                None
            }
        };
        LockRef {
            key: key.to_string(),
            guard,
            locks: Arc::clone(self),
        }
    }
}

/// RAII handle for an acquired (or timed-out) named lock.
pub struct LockRef {
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<KeyLocks>,
}

impl LockRef {
    /// Whether the lock was actually acquired.
    pub fn held(&self) -> bool {
        self.guard.is_some()
    }
}

impl Drop for LockRef {
    fn drop(&mut self) {
        self.guard.take();
        // prune the slot once no waiter references it
        let mut slots = self.locks.slots.lock().unwrap();
        if let Some(slot) = slots.get(&self.key) {
            if Arc::strong_count(slot) == 1 {
                slots.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exclusive_within_key() {
        let locks = KeyLocks::new();
        let first = locks.acquire("k1", Duration::from_secs(1)).await;
        assert!(first.held());

        // same key times out while held
        let second = locks.acquire("k1", Duration::from_millis(20)).await;
        assert!(!second.held());

        // a different key is unaffected
        let other = locks.acquire("k2", Duration::from_millis(20)).await;
        assert!(other.held());

        drop(first);
        let third = locks.acquire("k1", Duration::from_millis(100)).await;
        assert!(third.held());
    }

    #[tokio::test]
    async fn test_slots_pruned_after_release() {
        let locks = KeyLocks::new();
        {
            let _guard = locks.acquire("k1", Duration::from_secs(1)).await;
            assert_eq!(locks.slots.lock().unwrap().len(), 1);
        }
        assert!(locks.slots.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_timed_out_ref_does_not_release_holder() {
        let locks = KeyLocks::new();
        let holder = locks.acquire("k1", Duration::from_secs(1)).await;
        {
            let timed_out = locks.acquire("k1", Duration::from_millis(10)).await;
            assert!(!timed_out.held());
        }
        // holder still holds: another bounded acquire still times out
        let retry = locks.acquire("k1", Duration::from_millis(10)).await;
        assert!(!retry.held());
        drop(holder);
    }
}
