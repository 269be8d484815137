//! The shared coordination store.
//!
//! Locks and job-status records share one key-value store with last-writer-
//! wins and TTL semantics. The interface is deliberately narrow; anything
//! providing these primitives (an external store, the in-memory
//! implementation below) suffices.

use crate::error::CoordResult;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Narrow key-value interface shared by locks, counters, and job status.
#[async_trait]
pub trait CoordStore: Send + Sync + 'static {
    /// Get a string value.
    async fn get(&self, key: &str) -> CoordResult<Option<String>>;

    /// Set a string value, replacing any previous value or TTL.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CoordResult<()>;

    /// Set only if the key is absent. Returns true when the write happened.
    async fn setnx(&self, key: &str, value: &str, ttl: Option<Duration>) -> CoordResult<bool>;

    /// Delete a key. Returns true when a live key was removed.
    async fn del(&self, key: &str) -> CoordResult<bool>;

    /// Add a member to a set value. Returns true when newly added.
    async fn sadd(&self, key: &str, member: &str) -> CoordResult<bool>;

    /// All members of a set value.
    async fn smembers(&self, key: &str) -> CoordResult<Vec<String>>;

    /// Reset a key's TTL. Returns false when the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> CoordResult<bool>;
}

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory coordination store with TTL expiry.
///
/// Entries expire lazily on access; a background cleanup task reclaims the
/// rest so abandoned keys cannot accumulate for the process lifetime.
#[derive(Default)]
pub struct MemoryCoordStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCoordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a periodic sweep of expired entries.
    pub fn spawn_cleanup_task(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let now = Instant::now();
                let mut entries = self.entries.lock().await;
                entries.retain(|_, entry| !entry.is_expired(now));
            }
        })
    }

    /// Lock the map and drop any expired entry under `key`.
    async fn live_entries(&self) -> tokio::sync::MutexGuard<'_, HashMap<String, Entry>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| !entry.is_expired(now));
        entries
    }
}

#[async_trait]
impl CoordStore for MemoryCoordStore {
    async fn get(&self, key: &str) -> CoordResult<Option<String>> {
        let entries = self.live_entries().await;
        Ok(entries.get(key).and_then(|entry| match &entry.value {
            Value::Str(s) => Some(s.clone()),
            Value::Set(_) => None,
        }))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CoordResult<()> {
        let mut entries = self.live_entries().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
        Ok(())
    }

    async fn setnx(&self, key: &str, value: &str, ttl: Option<Duration>) -> CoordResult<bool> {
        let mut entries = self.live_entries().await;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
        Ok(true)
    }

    async fn del(&self, key: &str) -> CoordResult<bool> {
        let mut entries = self.live_entries().await;
        Ok(entries.remove(key).is_some())
    }

    async fn sadd(&self, key: &str, member: &str) -> CoordResult<bool> {
        let mut entries = self.live_entries().await;
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Set(HashSet::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Set(set) => Ok(set.insert(member.to_string())),
            // Last-writer-wins: a string key becomes a set.
            value => {
                *value = Value::Set(HashSet::from([member.to_string()]));
                Ok(true)
            }
        }
    }

    async fn smembers(&self, key: &str) -> CoordResult<Vec<String>> {
        let entries = self.live_entries().await;
        Ok(entries
            .get(key)
            .map(|entry| match &entry.value {
                Value::Set(set) => {
                    let mut members: Vec<String> = set.iter().cloned().collect();
                    members.sort();
                    members
                }
                Value::Str(_) => vec![],
            })
            .unwrap_or_default())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CoordResult<bool> {
        let mut entries = self.live_entries().await;
        match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_set_roundtrip() {
        let store = MemoryCoordStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        assert!(store.del("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn setnx_respects_existing() {
        let store = MemoryCoordStore::new();
        assert!(store.setnx("k", "first", None).await.unwrap());
        assert!(!store.setnx("k", "second", None).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("first".to_string()));
    }

    #[tokio::test]
    async fn ttl_expires_entries() {
        let store = MemoryCoordStore::new();
        store
            .set("k", "v", Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert!(store.get("k").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        // Expired key is free for setnx again.
        assert!(store.setnx("k", "v2", None).await.unwrap());
    }

    #[tokio::test]
    async fn expire_refreshes_ttl() {
        let store = MemoryCoordStore::new();
        store
            .set("k", "v", Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert!(store.expire("k", Duration::from_secs(60)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.get("k").await.unwrap().is_some());
        assert!(!store.expire("missing", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn set_operations() {
        let store = MemoryCoordStore::new();
        assert!(store.sadd("s", "a").await.unwrap());
        assert!(store.sadd("s", "b").await.unwrap());
        assert!(!store.sadd("s", "a").await.unwrap());
        assert_eq!(
            store.smembers("s").await.unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
    }
}
