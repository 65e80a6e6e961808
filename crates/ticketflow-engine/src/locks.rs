// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-key async mutual exclusion.

use std::sync::Arc;

use dashmap::DashMap;
use ticketflow_core::TicketKey;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// One async mutex per ticket key, created on demand.
///
/// Events for the same (contact, channel, company) are handled one at a time;
/// different keys proceed concurrently. Entries nobody holds or waits on are
/// pruned once the table grows past `prune_threshold`.
pub struct KeyedLocks {
    locks: DashMap<TicketKey, Arc<Mutex<()>>>,
    prune_threshold: usize,
}

impl KeyedLocks {
    pub fn new(prune_threshold: usize) -> Self {
        Self {
            locks: DashMap::new(),
            prune_threshold: prune_threshold.max(1),
        }
    }

    /// Wait for exclusive access to `key`. The guard releases it on drop.
    pub async fn lock(&self, key: TicketKey) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        if self.locks.len() > self.prune_threshold {
            self.prune();
        }
        mutex.lock_owned().await
    }

    /// Drop entries that only the table itself references.
    pub fn prune(&self) {
        let before = self.locks.len();
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        debug!(before, after = self.locks.len(), "pruned idle ticket locks");
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn key(contact_id: i64) -> TicketKey {
        TicketKey {
            contact_id,
            channel_id: 1,
            company_id: 1,
        }
    }

    #[tokio::test]
    async fn same_key_is_serialized() {
        let locks = Arc::new(KeyedLocks::new(64));
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(key(1)).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyedLocks::new(64);
        let _a = locks.lock(key(1)).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock(key(2))).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn prune_keeps_held_locks() {
        let locks = KeyedLocks::new(2);
        let held = locks.lock(key(1)).await;
        drop(locks.lock(key(2)).await);
        drop(locks.lock(key(3)).await);
        // Third insert crossed the threshold; key 2 was idle and is gone.
        assert!(locks.len() <= 2);
        locks.prune();
        assert_eq!(locks.len(), 1);
        drop(held);
        locks.prune();
        assert!(locks.is_empty());
    }
}
