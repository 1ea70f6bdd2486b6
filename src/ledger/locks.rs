//! Per-member lock registry.
//!
//! All ledger-mutating operations for a `(brand_id, member_key)` pair are
//! serialized by an async mutex held for the duration of the
//! read-check-write sequence. Two-member operations (referral apply) take
//! both locks ordered by lexicographic member-key comparison so that a
//! concurrent reverse-direction apply cannot deadlock.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use super::MemberKey;

type LockKey = (String, MemberKey);

/// Registry of per-member mutexes, partitioned by brand.
#[derive(Default)]
pub struct KeyLocks {
    locks: Mutex<HashMap<LockKey, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn handle(&self, brand: &str, member: &MemberKey) -> Arc<Mutex<()>> {
        let mut registry = self.locks.lock().await;
        registry
            .entry((brand.to_string(), member.clone()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire the lock for one member. The guard serializes every mutating
    /// operation on that member until dropped.
    pub async fn acquire(&self, brand: &str, member: &MemberKey) -> OwnedMutexGuard<()> {
        let lock = self.handle(brand, member).await;
        lock.lock_owned().await
    }

    /// Acquire locks for two members of the same brand, smaller member key
    /// first. Equal keys yield a single guard.
    pub async fn acquire_pair(
        &self,
        brand: &str,
        a: &MemberKey,
        b: &MemberKey,
    ) -> (OwnedMutexGuard<()>, Option<OwnedMutexGuard<()>>) {
        if a == b {
            return (self.acquire(brand, a).await, None);
        }
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        let first_guard = self.acquire(brand, first).await;
        let second_guard = self.acquire(brand, second).await;
        (first_guard, Some(second_guard))
    }
}
