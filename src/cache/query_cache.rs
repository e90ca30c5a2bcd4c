//! Query cache with TTL expiry and category/alias invalidation
//!
//! Keys fold in the retrieval mode and result limit, so the same query text
//! under different modes caches separately.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::{CacheStatsResponse, ScoredChunk, SearchMode};

/// A cached result set
#[derive(Debug, Clone)]
struct CacheEntry {
    /// Normalized query text, kept for alias-based invalidation
    query: String,
    results: Vec<ScoredChunk>,
    degraded: bool,
    /// Categories the cached results came from
    categories: HashSet<String>,
    cached_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    hit_count: u32,
}

/// TTL query cache
pub struct QueryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    max_entries: usize,
    ttl_seconds: i64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryCache {
    pub fn new(max_entries: usize, ttl_seconds: i64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries,
            ttl_seconds,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn normalize(query: &str) -> String {
        query.trim().to_lowercase()
    }

    /// Cache key: sha256 over normalized query, mode, and result limit
    fn key(query: &str, mode: SearchMode, max_results: usize) -> String {
        let mut hasher = Sha256::new();
        hasher.update(Self::normalize(query).as_bytes());
        hasher.update(b"|");
        hasher.update(mode.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(max_results.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Look up a cached result set; expired entries are dropped on read
    pub fn get(
        &self,
        query: &str,
        mode: SearchMode,
        max_results: usize,
    ) -> Option<(Vec<ScoredChunk>, bool)> {
        let key = Self::key(query, mode, max_results);
        let mut entries = self.entries.write();

        if let Some(entry) = entries.get_mut(&key) {
            if Utc::now() >= entry.expires_at {
                tracing::debug!("cache expired: {}", &key[..12]);
                entries.remove(&key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            entry.hit_count += 1;
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("cache hit: {} (hits: {})", &key[..12], entry.hit_count);
            return Some((entry.results.clone(), entry.degraded));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a result set; oldest entry is evicted at capacity
    pub fn put(
        &self,
        query: &str,
        mode: SearchMode,
        max_results: usize,
        results: Vec<ScoredChunk>,
        degraded: bool,
    ) {
        let key = Self::key(query, mode, max_results);
        let now = Utc::now();
        let categories = results.iter().map(|r| r.category.clone()).collect();

        let entry = CacheEntry {
            query: Self::normalize(query),
            results,
            degraded,
            categories,
            cached_at: now,
            expires_at: now + Duration::seconds(self.ttl_seconds),
            hit_count: 0,
        };

        let mut entries = self.entries.write();
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            if let Some(oldest_key) = entries
                .iter()
                .min_by_key(|(_, v)| v.cached_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest_key);
            }
        }
        entries.insert(key, entry);
    }

    /// Drop all entries whose results touch a category
    pub fn invalidate_category(&self, category: &str) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.categories.contains(category));
        let removed = before - entries.len();
        if removed > 0 {
            tracing::info!("invalidated {} cached queries for category '{}'", removed, category);
        }
        removed
    }

    /// Drop all entries whose stored query mentions any of the given terms
    ///
    /// Used after auto-learning: queries that previously named an unknown
    /// entity (or its aliases) must not serve stale empty results.
    pub fn invalidate_matching(&self, terms: &[String]) -> usize {
        let normalized: Vec<String> = terms
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        if normalized.is_empty() {
            return 0;
        }

        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !normalized.iter().any(|t| entry.query.contains(t)));
        let removed = before - entries.len();
        if removed > 0 {
            tracing::info!("invalidated {} cached queries mentioning learned terms", removed);
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.write().clear();
        tracing::info!("query cache cleared");
    }

    pub fn stats(&self) -> CacheStatsResponse {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStatsResponse {
            size: self.entries.read().len(),
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            max_entries: self.max_entries,
            ttl_seconds: self.ttl_seconds,
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(1000, 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn scored(category: &str) -> ScoredChunk {
        ScoredChunk {
            id: Uuid::new_v4(),
            title: "t".to_string(),
            content: "c".to_string(),
            category: category.to_string(),
            tags: Vec::new(),
            similarity_score: 1.0,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn hit_after_put() {
        let cache = QueryCache::new(10, 3600);
        cache.put("贷款利率", SearchMode::Hybrid, 5, vec![scored("policy")], false);

        let (results, degraded) = cache.get("贷款利率", SearchMode::Hybrid, 5).unwrap();
        assert_eq!(results.len(), 1);
        assert!(!degraded);

        // Different mode or limit is a different key
        assert!(cache.get("贷款利率", SearchMode::Text, 5).is_none());
        assert!(cache.get("贷款利率", SearchMode::Hybrid, 3).is_none());
    }

    #[test]
    fn query_normalization_folds_case_and_space() {
        let cache = QueryCache::new(10, 3600);
        cache.put("  Loan Rates ", SearchMode::Hybrid, 5, vec![scored("policy")], false);
        assert!(cache.get("loan rates", SearchMode::Hybrid, 5).is_some());
    }

    #[test]
    fn expired_entry_misses() {
        let cache = QueryCache::new(10, 0);
        cache.put("q", SearchMode::Hybrid, 5, vec![scored("policy")], false);
        assert!(cache.get("q", SearchMode::Hybrid, 5).is_none());
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn category_invalidation() {
        let cache = QueryCache::new(10, 3600);
        cache.put("a", SearchMode::Hybrid, 5, vec![scored("bank_info")], false);
        cache.put("b", SearchMode::Hybrid, 5, vec![scored("policy")], false);

        assert_eq!(cache.invalidate_category("bank_info"), 1);
        assert!(cache.get("a", SearchMode::Hybrid, 5).is_none());
        assert!(cache.get("b", SearchMode::Hybrid, 5).is_some());
    }

    #[test]
    fn alias_invalidation_matches_stored_query() {
        let cache = QueryCache::new(10, 3600);
        cache.put("星展银行怎么样", SearchMode::Hybrid, 5, Vec::new(), false);
        cache.put("贷款利率", SearchMode::Hybrid, 5, vec![scored("policy")], false);

        let removed = cache.invalidate_matching(&["星展银行".to_string(), "DBS".to_string()]);
        assert_eq!(removed, 1);
        assert!(cache.get("星展银行怎么样", SearchMode::Hybrid, 5).is_none());
    }

    #[test]
    fn eviction_drops_oldest() {
        let cache = QueryCache::new(2, 3600);
        cache.put("q1", SearchMode::Hybrid, 5, Vec::new(), false);
        std::thread::sleep(std::time::Duration::from_millis(5));
        cache.put("q2", SearchMode::Hybrid, 5, Vec::new(), false);
        std::thread::sleep(std::time::Duration::from_millis(5));
        cache.put("q3", SearchMode::Hybrid, 5, Vec::new(), false);

        assert_eq!(cache.stats().size, 2);
        assert!(cache.get("q1", SearchMode::Hybrid, 5).is_none());
        assert!(cache.get("q3", SearchMode::Hybrid, 5).is_some());
    }

    #[test]
    fn hit_rate_reflects_traffic() {
        let cache = QueryCache::new(10, 3600);
        cache.put("q", SearchMode::Hybrid, 5, Vec::new(), false);
        cache.get("q", SearchMode::Hybrid, 5);
        cache.get("missing", SearchMode::Hybrid, 5);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }
}
