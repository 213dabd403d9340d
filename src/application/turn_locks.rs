//! Per-conversation turn serialization.
//!
//! Two turns against the same conversation key would otherwise interleave
//! their store reads and writes. A turn holds its key's guard from the store
//! read until the reply is persisted; later turns for the key queue behind it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::foundation::ConversationKey;

type LockMap = HashMap<ConversationKey, Arc<AsyncMutex<()>>>;

/// Registry of in-flight turns, keyed by conversation.
#[derive(Debug, Clone, Default)]
pub struct TurnLocks {
    locks: Arc<Mutex<LockMap>>,
}

impl TurnLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other turn holds `key`, then claims it.
    pub async fn acquire(&self, key: &ConversationKey) -> TurnGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(key.clone()).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        TurnGuard {
            key: key.clone(),
            locks: self.locks.clone(),
            guard: Some(guard),
        }
    }

    /// Number of keys with a turn in flight or queued.
    pub fn active(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Held for the duration of one turn.
#[derive(Debug)]
pub struct TurnGuard {
    key: ConversationKey,
    locks: Arc<Mutex<LockMap>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        self.guard.take();
        // Only the map still references the lock: nobody is queued.
        if locks.get(&self.key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_turns_are_serialized() {
        let locks = TurnLocks::new();
        let key = ConversationKey::new("conv").unwrap();

        let first = locks.acquire(&key).await;
        let waiter = {
            let locks = locks.clone();
            let key = key.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&key).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = TurnLocks::new();
        let _a = locks.acquire(&ConversationKey::new("a").unwrap()).await;

        let b = tokio::time::timeout(
            Duration::from_millis(200),
            locks.acquire(&ConversationKey::new("b").unwrap()),
        )
        .await;

        assert!(b.is_ok());
        assert_eq!(locks.active(), 2);
    }

    #[tokio::test]
    async fn released_keys_are_forgotten() {
        let locks = TurnLocks::new();
        let key = ConversationKey::generate();

        drop(locks.acquire(&key).await);

        assert_eq!(locks.active(), 0);
    }
}
