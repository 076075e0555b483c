//! Session cache: reuses a connected transport by key (server URL or
//! command) instead of reconnecting on every call.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use agentsdk_domain::error::Result;

struct Entry<T> {
    value: Arc<T>,
    last_used: Instant,
}

/// Caches built values (typically transports or clients) by key, evicting
/// entries idle past a TTL. `ttl <= 0` (i.e. `Duration::ZERO`) disables
/// expiry entirely.
pub struct SessionCache<T> {
    entries: Mutex<HashMap<String, Entry<T>>>,
    ttl: Duration,
}

impl<T> SessionCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Returns the cached value for `key` if present and not expired;
    /// otherwise calls `builder` to construct one, caches it, and returns
    /// it. A failed build is never cached.
    pub async fn get<F, Fut>(&self, key: &str, builder: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.touch(key) {
            return Ok(value);
        }

        let built = builder().await?;
        let value = Arc::new(built);
        self.entries.lock().insert(
            key.to_string(),
            Entry { value: value.clone(), last_used: Instant::now() },
        );
        Ok(value)
    }

    fn touch(&self, key: &str) -> Option<Arc<T>> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(key)?;
        if self.ttl > Duration::ZERO && entry.last_used.elapsed() > self.ttl {
            entries.remove(key);
            return None;
        }
        entry.last_used = Instant::now();
        Some(entry.value.clone())
    }

    /// Remove every entry whose `last_used` is older than the TTL. A no-op
    /// when the TTL is disabled.
    pub fn close_idle(&self) -> Vec<Arc<T>> {
        if self.ttl == Duration::ZERO {
            return Vec::new();
        }
        let mut entries = self.entries.lock();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.last_used.elapsed() > self.ttl)
            .map(|(k, _)| k.clone())
            .collect();
        expired.iter().filter_map(|k| entries.remove(k)).map(|e| e.value).collect()
    }

    /// Remove and return every cached value.
    pub fn close_all(&self) -> Vec<Arc<T>> {
        self.entries.lock().drain().map(|(_, e)| e.value).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn get_builds_once_and_reuses() {
        let cache: SessionCache<u32> = SessionCache::new(Duration::from_secs(60));
        let builds = Arc::new(AtomicU32::new(0));

        let b = builds.clone();
        let first = cache.get("k", || async move {
            b.fetch_add(1, Ordering::SeqCst);
            Ok(42)
        }).await.unwrap();

        let b2 = builds.clone();
        let second = cache.get("k", || async move {
            b2.fetch_add(1, Ordering::SeqCst);
            Ok(99)
        }).await.unwrap();

        assert_eq!(*first, 42);
        assert_eq!(*second, 42);
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entry_is_rebuilt() {
        let cache: SessionCache<u32> = SessionCache::new(Duration::from_millis(10));
        cache.get("k", || async { Ok(1) }).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let rebuilt = cache.get("k", || async { Ok(2) }).await.unwrap();
        assert_eq!(*rebuilt, 2);
    }

    #[tokio::test]
    async fn zero_ttl_disables_expiry() {
        let cache: SessionCache<u32> = SessionCache::new(Duration::ZERO);
        cache.get("k", || async { Ok(1) }).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let still = cache.get("k", || async { Ok(2) }).await.unwrap();
        assert_eq!(*still, 1);
    }

    #[tokio::test]
    async fn build_error_is_not_cached() {
        let cache: SessionCache<u32> = SessionCache::new(Duration::from_secs(60));
        let err = cache.get("k", || async { Err(agentsdk_domain::error::Error::Other("nope".into())) }).await;
        assert!(err.is_err());
        assert!(cache.is_empty());
    }
}
