// src/queue/store.rs
//! Minimal list-store abstraction the durable queue is written against, and an
//! in-memory implementation with Redis list semantics.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

/// List operations over string values, keyed by name. Indices follow Redis:
/// negative values count from the end and `stop` is inclusive.
#[async_trait]
pub trait ListStore: Send + Sync {
    /// Append and return the new length.
    async fn push_back(&self, key: &str, value: &str) -> Result<usize>;
    async fn range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>>;
    /// Remove the first element equal to `value`. Returns how many were removed.
    async fn remove_first(&self, key: &str, value: &str) -> Result<usize>;
    /// Set the key's time-to-live. Returns false when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;
    async fn len(&self, key: &str) -> Result<usize>;
    async fn delete(&self, key: &str) -> Result<bool>;
    async fn ping(&self) -> Result<()>;
}

/// Resolve Redis-style `start..=stop` against a list of `len` elements.
pub(crate) fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len_i = len as isize;
    let norm = |i: isize| if i < 0 { len_i + i } else { i };
    let start = norm(start).max(0);
    let stop = norm(stop).min(len_i - 1);
    if len == 0 || start > stop || start >= len_i {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[derive(Debug, Default)]
struct MemList {
    values: VecDeque<String>,
    expires_at: Option<DateTime<Utc>>,
}

/// In-process list store used by tests and single-process runs.
#[derive(Debug, Default)]
pub struct MemoryListStore {
    lists: Mutex<HashMap<String, MemList>>,
}

impl MemoryListStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, MemList>> {
        self.lists.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Live list for `key`, dropping it first if its TTL passed.
    fn live<'a>(map: &'a mut HashMap<String, MemList>, key: &str) -> Option<&'a mut MemList> {
        let expired = map
            .get(key)
            .and_then(|l| l.expires_at)
            .is_some_and(|t| t <= Utc::now());
        if expired {
            map.remove(key);
            return None;
        }
        map.get_mut(key)
    }

    /// Remaining time-to-live, `None` if the key is missing or persistent.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let mut map = self.lock();
        let list = Self::live(&mut map, key)?;
        list.expires_at.map(|t| t - Utc::now())
    }

    /// Insert a raw value, bypassing any encoding. Handy for seeding corrupt
    /// records in tests.
    pub fn push_raw(&self, key: &str, value: impl Into<String>) {
        let mut map = self.lock();
        map.entry(key.to_string())
            .or_default()
            .values
            .push_back(value.into());
    }
}

#[async_trait]
impl ListStore for MemoryListStore {
    async fn push_back(&self, key: &str, value: &str) -> Result<usize> {
        let mut map = self.lock();
        if Self::live(&mut map, key).is_none() {
            map.insert(key.to_string(), MemList::default());
        }
        let list = map.entry(key.to_string()).or_default();
        list.values.push_back(value.to_string());
        Ok(list.values.len())
    }

    async fn range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let mut map = self.lock();
        let Some(list) = Self::live(&mut map, key) else {
            return Ok(Vec::new());
        };
        Ok(match resolve_range(list.values.len(), start, stop) {
            Some((a, b)) => list.values.range(a..=b).cloned().collect(),
            None => Vec::new(),
        })
    }

    async fn remove_first(&self, key: &str, value: &str) -> Result<usize> {
        let mut map = self.lock();
        let Some(list) = Self::live(&mut map, key) else {
            return Ok(0);
        };
        let Some(pos) = list.values.iter().position(|v| v == value) else {
            return Ok(0);
        };
        list.values.remove(pos);
        if list.values.is_empty() {
            map.remove(key);
        }
        Ok(1)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut map = self.lock();
        match Self::live(&mut map, key) {
            Some(list) => {
                list.expires_at = Some(Utc::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn len(&self, key: &str) -> Result<usize> {
        let mut map = self.lock();
        Ok(Self::live(&mut map, key).map_or(0, |l| l.values.len()))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut map = self.lock();
        Ok(map.remove(key).is_some())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_resolution_matches_redis() {
        assert_eq!(resolve_range(5, 0, -1), Some((0, 4)));
        assert_eq!(resolve_range(5, 0, 2), Some((0, 2)));
        assert_eq!(resolve_range(5, -2, -1), Some((3, 4)));
        assert_eq!(resolve_range(5, -10, 100), Some((0, 4)));
        assert_eq!(resolve_range(5, 3, 1), None);
        assert_eq!(resolve_range(5, 7, 9), None);
        assert_eq!(resolve_range(0, 0, -1), None);
    }

    #[tokio::test]
    async fn push_range_remove() {
        let s = MemoryListStore::new();
        for v in ["a", "b", "a"] {
            s.push_back("k", v).await.unwrap();
        }
        assert_eq!(s.range("k", 0, -1).await.unwrap(), vec!["a", "b", "a"]);
        assert_eq!(s.remove_first("k", "a").await.unwrap(), 1);
        assert_eq!(s.range("k", 0, -1).await.unwrap(), vec!["b", "a"]);
        assert_eq!(s.remove_first("k", "zzz").await.unwrap(), 0);
        assert_eq!(s.len("k").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn expired_keys_vanish() {
        let s = MemoryListStore::new();
        s.push_back("k", "a").await.unwrap();
        assert!(s.expire("k", Duration::milliseconds(-1)).await.unwrap());
        assert_eq!(s.len("k").await.unwrap(), 0);
        assert!(!s.expire("k", Duration::hours(1)).await.unwrap());
        assert!(s.ttl("k").is_none());
    }
}
