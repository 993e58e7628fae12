// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! A TTL cache with background refresh.
//!
//! Readers always get the last value written, stale or not; staleness is
//! handled by the refresher task recomputing in the background, so after
//! the first fill a reader never observes an empty slot.

use crate::Error;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::watch;

struct Entry<V> {
    value: V,
    refreshed_at: Instant,
}

/// A keyed cache whose entries go stale after a TTL.
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: RwLock<HashMap<K, Entry<V>>>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    /// Create a cache with the given TTL.
    pub fn new(ttl: Duration) -> Self {
        TtlCache {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The last value written for a key, even if stale.
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries
            .read()
            .expect("cache lock poisoned")
            .get(key)
            .map(|entry| entry.value.clone())
    }

    /// The value for a key only if it is within its TTL.
    pub fn get_fresh(&self, key: &K) -> Option<V> {
        self.entries
            .read()
            .expect("cache lock poisoned")
            .get(key)
            .filter(|entry| entry.refreshed_at.elapsed() < self.ttl)
            .map(|entry| entry.value.clone())
    }

    /// Whether a key is missing or older than its TTL.
    pub fn is_stale(&self, key: &K) -> bool {
        self.entries
            .read()
            .expect("cache lock poisoned")
            .get(key)
            .is_none_or(|entry| entry.refreshed_at.elapsed() >= self.ttl)
    }

    /// Write a value, atomically replacing the previous one.
    pub fn put(&self, key: K, value: V) {
        self.entries
            .write()
            .expect("cache lock poisoned")
            .insert(
                key,
                Entry {
                    value,
                    refreshed_at: Instant::now(),
                },
            );
    }
}

/// Spawn a ticker that keeps one key warm by recomputing it every
/// `period`. Failures keep the previous value and are logged.
pub fn spawn_refresher<K, V, F, Fut>(
    cache: Arc<TtlCache<K, V>>,
    key: K,
    period: Duration,
    refresh: F,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<V, Error>> + Send,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        return;
                    }
                    continue;
                }
            }
            match refresh().await {
                Ok(value) => cache.put(key.clone(), value),
                Err(e) => tracing::warn!(error = %e, "cache refresh failed; keeping stale value"),
            }
        }
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stale_values_remain_readable() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_millis(10));
        assert!(cache.is_stale(&"k"));
        cache.put("k", 1);
        assert_eq!(cache.get_fresh(&"k"), Some(1));
        assert!(!cache.is_stale(&"k"));

        std::thread::sleep(Duration::from_millis(15));
        assert!(cache.is_stale(&"k"));
        assert_eq!(cache.get_fresh(&"k"), None);
        // Readers still see the last value until a refresh replaces it.
        assert_eq!(cache.get(&"k"), Some(1));

        cache.put("k", 2);
        assert_eq!(cache.get_fresh(&"k"), Some(2));
    }

    #[tokio::test]
    async fn refresher_updates_and_stops_on_shutdown() {
        let cache = Arc::new(TtlCache::new(Duration::from_secs(60)));
        let (tx, rx) = watch::channel(false);
        let handle = spawn_refresher(
            cache.clone(),
            "props",
            Duration::from_millis(5),
            || async { Ok(42u32) },
            rx,
        );
        // Give the ticker a couple of periods to fire.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get(&"props"), Some(42));

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
