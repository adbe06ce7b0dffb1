//! Bounded least-recently-used cache of presence records.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::time::Instant;

use crate::domain::foundation::UserId;
use crate::domain::presence::PresenceRecord;

struct CacheEntry {
    record: PresenceRecord,
    cached_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.duration_since(self.cached_at) < ttl && self.record.is_fresh(ttl)
    }
}

/// LRU cache keyed by user. A capacity of zero is treated as one.
pub struct PresenceCache {
    entries: LruCache<UserId, CacheEntry>,
}

impl PresenceCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Fresh record for `user_id`, marking it recently used.
    ///
    /// An entry older than `ttl` is removed and reported as a miss.
    pub fn get_fresh(&mut self, user_id: &UserId, ttl: Duration) -> Option<PresenceRecord> {
        let now = Instant::now();
        if self.entries.get(user_id)?.is_fresh(now, ttl) {
            return self.entries.peek(user_id).map(|entry| entry.record.clone());
        }
        self.entries.pop(user_id);
        None
    }

    /// Insert or replace a record, evicting the least recently used entry
    /// when full.
    pub fn insert(&mut self, record: PresenceRecord) {
        let entry = CacheEntry {
            record,
            cached_at: Instant::now(),
        };
        self.entries.put(entry.record.user_id.clone(), entry);
    }

    pub fn remove(&mut self, user_id: &UserId) -> Option<PresenceRecord> {
        self.entries.pop(user_id).map(|entry| entry.record)
    }

    /// Drop every entry older than `ttl`. Returns how many were removed.
    pub fn remove_expired(&mut self, ttl: Duration) -> usize {
        let now = Instant::now();
        let expired: Vec<UserId> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_fresh(now, ttl))
            .map(|(user, _)| user.clone())
            .collect();
        for user in &expired {
            self.entries.pop(user);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::presence::{PresenceMetadata, PresenceStatus};
    use proptest::prelude::*;

    fn record(user: &str) -> PresenceRecord {
        PresenceRecord::new(
            UserId::new(user).unwrap(),
            PresenceStatus::Online,
            PresenceMetadata::default(),
        )
    }

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    const TTL: Duration = Duration::from_secs(300);

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = PresenceCache::new(2);
        cache.insert(record("a"));
        cache.insert(record("b"));

        // Touch "a" so "b" becomes the eviction candidate
        assert!(cache.get_fresh(&user("a"), TTL).is_some());
        cache.insert(record("c"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get_fresh(&user("b"), TTL).is_none());
        assert!(cache.get_fresh(&user("a"), TTL).is_some());
        assert!(cache.get_fresh(&user("c"), TTL).is_some());
    }

    #[test]
    fn reinsert_replaces_without_growing() {
        let mut cache = PresenceCache::new(2);
        cache.insert(record("a"));
        cache.insert(record("a"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_entries_are_misses() {
        let mut cache = PresenceCache::new(10);
        cache.insert(record("a"));
        tokio::time::advance(Duration::from_secs(2)).await;

        assert!(cache.get_fresh(&user("a"), Duration::from_secs(1)).is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn remove_expired_counts_removals() {
        let mut cache = PresenceCache::new(10);
        cache.insert(record("a"));
        cache.insert(record("b"));
        tokio::time::advance(Duration::from_secs(2)).await;
        cache.insert(record("c"));

        assert_eq!(cache.remove_expired(Duration::from_secs(1)), 2);
        assert_eq!(cache.len(), 1);
    }

    proptest! {
        #[test]
        fn never_exceeds_capacity(capacity in 1usize..16, users in proptest::collection::vec(0u8..32, 0..128)) {
            let mut cache = PresenceCache::new(capacity);
            for u in users {
                cache.insert(record(&format!("user-{}", u)));
                prop_assert!(cache.len() <= capacity);
            }
        }
    }
}
