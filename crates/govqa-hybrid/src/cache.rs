//! Bounded answer cache with lazy TTL expiry.
//!
//! Eviction removes the entry with the oldest insertion time, found by a scan
//! over the whole store. Reads never refresh an entry, so this is
//! oldest-inserted eviction rather than LRU.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use govqa_core::config::CacheConfig;

/// Source of the current time; injectable so expiry can be tested exactly.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn advance(&self, secs: i64) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += Duration::seconds(secs);
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cache key for a query: trimmed, lowercased query text, `k`, and the
/// extra parameters in name order, hashed with BLAKE3.
pub fn generate_key(query: &str, k: usize, extra: &BTreeMap<String, String>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(query.trim().to_lowercase().as_bytes());
    hasher.update(b"\x1fk=");
    hasher.update(k.to_string().as_bytes());
    for (name, value) in extra {
        hasher.update(b"\x1f");
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

#[derive(Debug)]
struct Entry<V> {
    data: V,
    created_at: DateTime<Utc>,
    seq: u64,
    hit_count: u64,
}

#[derive(Debug)]
struct Inner<V> {
    entries: HashMap<String, Entry<V>>,
    next_seq: u64,
    total_hits: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryStats {
    pub key: String,
    pub hit_count: u64,
    pub age_secs: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub ttl_secs: u64,
    pub total_hits: u64,
    pub entries: Vec<EntryStats>,
}

pub struct ResultCache<V> {
    inner: Mutex<Inner<V>>,
    max_size: usize,
    ttl_secs: u64,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> ResultCache<V> {
    pub fn new(max_size: usize, ttl_secs: u64) -> Self {
        Self::with_clock(max_size, ttl_secs, Arc::new(SystemClock))
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_size, config.ttl_secs)
    }

    pub fn with_clock(max_size: usize, ttl_secs: u64, clock: Arc<dyn Clock>) -> Self {
        let ttl = i64::try_from(ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        tracing::info!(max_size, ttl_secs, "result cache initialized");
        Self {
            inner: Mutex::new(Inner { entries: HashMap::new(), next_seq: 0, total_hits: 0 }),
            max_size,
            ttl_secs,
            ttl,
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("result cache lock poisoned, continuing with inner state");
            poisoned.into_inner()
        })
    }

    /// Returns the entry if it is younger than the TTL. Expired entries are
    /// removed here.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut guard = self.lock();
        let inner = &mut *guard;

        match inner.entries.get_mut(key) {
            None => {
                tracing::debug!(key = %short(key), "cache miss");
                return None;
            }
            Some(entry) if now - entry.created_at < self.ttl => {
                entry.hit_count += 1;
                let data = entry.data.clone();
                inner.total_hits += 1;
                tracing::debug!(key = %short(key), "cache hit");
                return Some(data);
            }
            Some(_) => {}
        }
        inner.entries.remove(key);
        tracing::debug!(key = %short(key), "cache entry expired");
        None
    }

    /// Stores `data` under `key`, evicting the oldest entry when full.
    pub fn set(&self, key: &str, data: V) {
        if self.max_size == 0 {
            return;
        }
        let now = self.clock.now();
        let mut inner = self.lock();

        if !inner.entries.contains_key(key) && inner.entries.len() >= self.max_size {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| (e.created_at, e.seq))
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                inner.entries.remove(&oldest);
                tracing::debug!(key = %short(&oldest), "evicted oldest cache entry");
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(key.to_string(), Entry { data, created_at: now, seq, hit_count: 0 });
        tracing::debug!(key = %short(key), size = inner.entries.len(), "cached result");
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        let dropped = inner.entries.len();
        inner.entries.clear();
        tracing::info!(dropped, "result cache cleared");
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let inner = self.lock();
        let mut entries: Vec<EntryStats> = inner
            .entries
            .iter()
            .map(|(key, e)| EntryStats {
                key: key.clone(),
                hit_count: e.hit_count,
                age_secs: (now - e.created_at).num_seconds(),
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        CacheStats {
            size: inner.entries.len(),
            max_size: self.max_size,
            ttl_secs: self.ttl_secs,
            total_hits: inner.total_hits,
            entries,
        }
    }
}

fn short(key: &str) -> &str {
    key.get(..8).unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()))
    }

    #[test]
    fn key_normalizes_query_and_orders_params() {
        let mut a = BTreeMap::new();
        a.insert("fusion".to_string(), "rrf".to_string());
        a.insert("hybrid".to_string(), "true".to_string());
        let mut b = BTreeMap::new();
        b.insert("hybrid".to_string(), "true".to_string());
        b.insert("fusion".to_string(), "rrf".to_string());

        let key = generate_key("  Thủ tục Hộ chiếu ", 10, &a);
        assert_eq!(key, generate_key("thủ tục hộ chiếu", 10, &b));
        assert_eq!(key.len(), 64);
        assert_ne!(key, generate_key("thủ tục hộ chiếu", 5, &a));
        assert_ne!(key, generate_key("thủ tục hộ chiếu", 10, &BTreeMap::new()));
    }

    #[test]
    fn entry_lives_until_ttl() {
        let clock = clock();
        let cache: ResultCache<String> = ResultCache::with_clock(10, 3600, clock.clone());
        cache.set("k", "v".to_string());

        clock.advance(3599);
        assert_eq!(cache.get("k").as_deref(), Some("v"));

        clock.advance(2);
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn evicts_oldest_inserted() {
        let clock = clock();
        let cache: ResultCache<u32> = ResultCache::with_clock(2, 3600, clock.clone());
        cache.set("a", 1);
        clock.advance(1);
        cache.set("b", 2);
        clock.advance(1);
        cache.set("c", 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.get("c"), Some(3));
    }

    #[test]
    fn reads_do_not_refresh_recency() {
        let clock = clock();
        let cache: ResultCache<u32> = ResultCache::with_clock(2, 3600, clock.clone());
        cache.set("a", 1);
        cache.set("b", 2);
        assert_eq!(cache.get("a"), Some(1));
        cache.set("c", 3);

        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
    }

    #[test]
    fn overwriting_a_key_does_not_evict() {
        let cache: ResultCache<u32> = ResultCache::with_clock(2, 3600, clock());
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("a", 10);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(10));
        assert_eq!(cache.get("b"), Some(2));
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let cache: ResultCache<u32> = ResultCache::with_clock(0, 3600, clock());
        cache.set("a", 1);
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn stats_report_hits_and_age() {
        let clock = clock();
        let cache: ResultCache<u32> = ResultCache::with_clock(5, 60, clock.clone());
        cache.set("a", 1);
        cache.set("b", 2);
        clock.advance(30);
        cache.get("a");
        cache.get("a");
        cache.get("missing");

        let stats = cache.stats();
        assert_eq!(stats.size, 2);
        assert_eq!(stats.max_size, 5);
        assert_eq!(stats.ttl_secs, 60);
        assert_eq!(stats.total_hits, 2);
        assert_eq!(stats.entries[0], EntryStats { key: "a".to_string(), hit_count: 2, age_secs: 30 });
        assert_eq!(stats.entries[1].hit_count, 0);

        cache.clear();
        assert_eq!(cache.stats().size, 0);
    }
}
