// src/services/cache.rs
// DOCUMENTATION: In-memory cache for AI extraction responses
// PURPOSE: Avoid paying twice for the same text

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Provider answer as returned, kept until `expires_at`
#[derive(Clone, Debug)]
struct CachedAnswer {
    raw: String,
    expires_at: Instant,
}

impl CachedAnswer {
    fn fresh_at(&self, now: Instant) -> bool {
        now <= self.expires_at
    }
}

/// Extraction answers keyed by model and text
/// DOCUMENTATION: Thread-safe; hit/miss counters feed GET /admin/ai-cache
pub struct AiCache {
    answers: RwLock<HashMap<String, CachedAnswer>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AiCache {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            answers: RwLock::new(HashMap::new()),
            ttl: Duration::from_secs(ttl_seconds),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Key = sha256(model, text); whitespace differences at the edges are ignored
    pub fn generate_key(model: &str, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(model.as_bytes());
        hasher.update([0u8]);
        hasher.update(text.trim().as_bytes());
        format!("extract:{}", hex::encode(hasher.finalize()))
    }

    /// Fresh answer for `key`; expired answers count as misses
    pub async fn get(&self, key: &str) -> Option<String> {
        let answers = self.answers.read().await;
        let found = answers
            .get(key)
            .filter(|answer| answer.fresh_at(Instant::now()))
            .map(|answer| answer.raw.clone());

        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    pub async fn set(&self, key: String, raw: String) {
        self.store(key, raw, self.ttl).await;
    }

    async fn store(&self, key: String, raw: String, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.answers.write().await.insert(key, CachedAnswer { raw, expires_at });
    }

    /// Drop expired answers, returns how many went
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut answers = self.answers.write().await;
        let before = answers.len();
        answers.retain(|_, answer| answer.fresh_at(now));
        before - answers.len()
    }

    pub async fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let answers = self.answers.read().await;
        let active = answers.values().filter(|a| a.fresh_at(now)).count();

        CacheStats {
            total_entries: answers.len(),
            expired_entries: answers.len() - active,
            active_entries: active,
            ttl_seconds: self.ttl.as_secs(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Drop every answer, returns how many were removed
    pub async fn clear(&self) -> usize {
        let mut answers = self.answers.write().await;
        let count = answers.len();
        answers.clear();
        count
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub active_entries: usize,
    pub ttl_seconds: u64,
    pub hits: u64,
    pub misses: u64,
}

/// Purge expired answers every `interval_seconds`
pub fn start_cleanup_task(cache: Arc<AiCache>, interval_seconds: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds.max(1)));

        loop {
            interval.tick().await;
            let removed = cache.purge_expired().await;
            if removed > 0 {
                log::info!("AI cache: purged {} expired answer(s)", removed);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_set_get_counts_hits() {
        let cache = AiCache::new(60);
        cache.set("k".to_string(), "{\"first_name\":\"Ana\"}".to_string()).await;
        assert_eq!(cache.get("k").await.as_deref(), Some("{\"first_name\":\"Ana\"}"));
        assert!(cache.get("missing").await.is_none());

        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[tokio::test]
    async fn test_cache_expiration() {
        let cache = AiCache::new(60);
        cache
            .store("k".to_string(), "v".to_string(), Duration::from_millis(50))
            .await;
        assert!(cache.get("k").await.is_some());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.get("k").await.is_none());
        assert_eq!(cache.stats().await.expired_entries, 1);

        assert_eq!(cache.purge_expired().await, 1);
        let stats = cache.stats().await;
        assert_eq!(stats.total_entries, 0);
        assert_eq!(stats.ttl_seconds, 60);
    }

    #[test]
    fn test_generate_key() {
        let a = AiCache::generate_key("gpt-4o-mini", "Marie Dupont\nAcme");
        let b = AiCache::generate_key("gpt-4o-mini", "  Marie Dupont\nAcme\n");
        let c = AiCache::generate_key("other-model", "Marie Dupont\nAcme");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("extract:"));
        assert_eq!(a.len(), "extract:".len() + 64);
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = AiCache::new(60);
        cache.set("a".to_string(), "1".to_string()).await;
        cache.set("b".to_string(), "2".to_string()).await;
        assert_eq!(cache.clear().await, 2);
        assert_eq!(cache.stats().await.active_entries, 0);
    }
}
