//! Cache of raw operation responses.
//!
//! Metadata responses change rarely, while the service is slow and quick
//! to block clients that ask too often. The [`ResponseCache`] keeps every
//! raw document under its query's cache key together with the time it was
//! fetched, and serves it again until it is older than the TTL.
//!
//! Binary audio payloads are never cached here.
//!
//! The cache is owned by a single client and mutated through `&mut self`,
//! so a lookup and the store that may follow it cannot interleave with
//! another caller.

use std::{
    collections::{hash_map::Entry, HashMap},
    future::Future,
    time::{Duration, SystemTime},
};

use crate::error::Result;

/// A raw document and when it was fetched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
    pub fetched_at: SystemTime,
    pub payload: Vec<u8>,
}

impl CacheEntry {
    /// Whether the entry is younger than `ttl` at `now`.
    ///
    /// Entries time-stamped in the future are considered fresh.
    #[must_use]
    pub fn is_fresh(&self, ttl: Duration, now: SystemTime) -> bool {
        now.duration_since(self.fetched_at).map_or(true, |age| age < ttl)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResponseCache {
    entries: HashMap<String, CacheEntry>,
}

impl ResponseCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached payload for `key`, fetching and storing it first
    /// if it is missing or older than `ttl`.
    ///
    /// `fetch` is not invoked at all for a fresh entry.
    ///
    /// # Errors
    ///
    /// Propagates the error of `fetch`; nothing is stored in that case and
    /// a stale entry, if any, is left as it was.
    pub async fn get_or_fetch<F, Fut>(
        &mut self,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<&[u8]>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>>>,
    {
        self.get_or_fetch_at(key, ttl, SystemTime::now(), fetch).await
    }

    /// Like [`get_or_fetch`](Self::get_or_fetch), with freshness judged at
    /// `now` and new entries stamped with it.
    ///
    /// # Errors
    ///
    /// Propagates the error of `fetch`.
    pub async fn get_or_fetch_at<F, Fut>(
        &mut self,
        key: &str,
        ttl: Duration,
        now: SystemTime,
        fetch: F,
    ) -> Result<&[u8]>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>>>,
    {
        let entry = match self.entries.entry(key.to_owned()) {
            Entry::Occupied(occupied) if occupied.get().is_fresh(ttl, now) => {
                debug!("cache hit: {key}");
                occupied.into_mut()
            }
            Entry::Occupied(mut occupied) => {
                debug!("cache expired: {key}");
                let payload = fetch().await?;
                occupied.insert(CacheEntry {
                    fetched_at: now,
                    payload,
                });
                occupied.into_mut()
            }
            Entry::Vacant(vacant) => {
                debug!("cache miss: {key}");
                let payload = fetch().await?;
                vacant.insert(CacheEntry {
                    fetched_at: now,
                    payload,
                })
            }
        };

        Ok(&entry.payload)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Stores `entry` under `key`, replacing any previous one.
    pub fn insert(&mut self, key: String, entry: CacheEntry) {
        self.entries.insert(key, entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CacheEntry)> {
        self.entries.iter().map(|(key, entry)| (key.as_str(), entry))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, CacheEntry)> for ResponseCache {
    fn from_iter<I: IntoIterator<Item = (String, CacheEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::error::Error;

    const TTL: Duration = Duration::from_secs(60);

    fn counting_fetch<'a>(
        calls: &'a Cell<u32>,
        payload: &'a str,
    ) -> impl FnOnce() -> std::future::Ready<Result<Vec<u8>>> + 'a {
        move || {
            calls.set(calls.get() + 1);
            std::future::ready(Ok(payload.as_bytes().to_vec()))
        }
    }

    #[tokio::test]
    async fn fetches_once_within_ttl() {
        let mut cache = ResponseCache::new();
        let calls = Cell::new(0);
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);

        let payload = cache
            .get_or_fetch_at("listid=600&op=22", TTL, start, counting_fetch(&calls, "<a/>"))
            .await
            .unwrap();
        assert_eq!(payload, b"<a/>");
        assert_eq!(calls.get(), 1);
        assert!(cache.contains_key("listid=600&op=22"));

        let later = start + Duration::from_secs(59);
        let payload = cache
            .get_or_fetch_at("listid=600&op=22", TTL, later, counting_fetch(&calls, "<b/>"))
            .await
            .unwrap();
        assert_eq!(payload, b"<a/>");
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn refetches_after_expiry() {
        let mut cache = ResponseCache::new();
        let calls = Cell::new(0);
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);

        cache
            .get_or_fetch_at("k", TTL, start, counting_fetch(&calls, "old"))
            .await
            .unwrap();

        let expired = start + TTL;
        let payload = cache
            .get_or_fetch_at("k", TTL, expired, counting_fetch(&calls, "new"))
            .await
            .unwrap();
        assert_eq!(payload, b"new");
        assert_eq!(calls.get(), 2);
        assert_eq!(cache.get("k").unwrap().fetched_at, expired);
    }

    #[tokio::test]
    async fn failed_fetch_stores_nothing() {
        let mut cache = ResponseCache::new();
        let result = cache
            .get_or_fetch("k", TTL, || async { Err(Error::unavailable("offline")) })
            .await;
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn future_entries_are_fresh() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(10);
        let entry = CacheEntry {
            fetched_at: now + Duration::from_secs(5),
            payload: Vec::new(),
        };
        assert!(entry.is_fresh(TTL, now));
    }
}
