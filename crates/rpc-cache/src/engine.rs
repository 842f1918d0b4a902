//! In-memory TTL cache engine: the storage and bookkeeping behind the
//! cache service's RPC methods.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::info;

use crate::messages::{BatchGetItem, ResultCode};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

struct CacheEntry {
    value: String,
    expire_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        matches!(self.expire_at, Some(at) if Instant::now() > at)
    }
}

/// Reader/writer-locked key-value store with hit/miss/op counters and a
/// periodic sweep for expired entries.
///
/// - Why: reads (`get`/`exists`/`batch_get`) vastly outnumber writes in
///   the expected workload, so `parking_lot::RwLock` lets concurrent
///   readers proceed without contending each other.
/// - What: every operation counts toward `total_ops`; `get`/`batch_get`
///   additionally count hits and misses, which is what `stats`'s
///   `hit_rate` is computed from. Expiry is lazy — a read past its
///   `expire_at` reports a miss — backed by `sweep_once`, which actually
///   reclaims the entry's memory on its own cadence rather than on read.
/// - Trade-offs: `total_ops` is tracked but deliberately not surfaced
///   through `GetStats`'s response — it exists for future internal
///   diagnostics, not as part of the public stats contract.
#[derive(Default)]
pub struct CacheEngine {
    store: RwLock<HashMap<String, CacheEntry>>,
    hit_count: AtomicI64,
    miss_count: AtomicI64,
    total_ops: AtomicI64,
}

impl CacheEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: String, value: String, expire_seconds: u32) -> ResultCode {
        let expire_at = (expire_seconds != 0).then(|| Instant::now() + Duration::from_secs(expire_seconds as u64));
        self.store.write().insert(key.clone(), CacheEntry { value, expire_at });
        self.total_ops.fetch_add(1, Ordering::Relaxed);
        info!(target: "rpc_cache::engine", %key, expire_seconds, "cache set");
        ResultCode::ok()
    }

    /// Returns `(result, value, exists, expire_time_unix_secs)`.
    pub fn get(&self, key: &str) -> (ResultCode, String, bool, Option<i64>) {
        self.total_ops.fetch_add(1, Ordering::Relaxed);
        let store = self.store.read();
        match store.get(key) {
            Some(entry) if !entry.is_expired() => {
                self.hit_count.fetch_add(1, Ordering::Relaxed);
                let expire_time = entry.expire_at.map(|_| unix_now());
                (ResultCode::ok(), entry.value.clone(), true, expire_time)
            }
            Some(_) => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                (ResultCode::miss("Key expired"), String::new(), false, None)
            }
            None => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                (ResultCode::miss("Key not found"), String::new(), false, None)
            }
        }
    }

    pub fn delete(&self, key: &str) -> ResultCode {
        self.total_ops.fetch_add(1, Ordering::Relaxed);
        if self.store.write().remove(key).is_some() {
            ResultCode::ok()
        } else {
            ResultCode::miss("Key not found")
        }
    }

    pub fn exists(&self, key: &str) -> bool {
        self.total_ops.fetch_add(1, Ordering::Relaxed);
        self.store.read().get(key).is_some_and(|entry| !entry.is_expired())
    }

    pub fn batch_get(&self, keys: &[String]) -> Vec<BatchGetItem> {
        self.total_ops.fetch_add(1, Ordering::Relaxed);
        let store = self.store.read();
        keys.iter()
            .map(|key| match store.get(key) {
                Some(entry) if !entry.is_expired() => {
                    self.hit_count.fetch_add(1, Ordering::Relaxed);
                    BatchGetItem { key: key.clone(), value: entry.value.clone(), exists: true }
                }
                _ => {
                    self.miss_count.fetch_add(1, Ordering::Relaxed);
                    BatchGetItem { key: key.clone(), value: String::new(), exists: false }
                }
            })
            .collect()
    }

    /// `(total_keys, memory_usage_estimate, hit_count, miss_count, hit_rate)`.
    pub fn stats(&self) -> (u64, i64, i64, i64, f64) {
        let store = self.store.read();
        let total_keys = store.len() as u64;
        let memory_usage = store
            .iter()
            .map(|(k, e)| (k.len() + e.value.len() + std::mem::size_of::<CacheEntry>()) as i64)
            .sum();
        let hit_count = self.hit_count.load(Ordering::Relaxed);
        let miss_count = self.miss_count.load(Ordering::Relaxed);
        let total = hit_count + miss_count;
        let hit_rate = if total > 0 { hit_count as f64 / total as f64 } else { 0.0 };
        (total_keys, memory_usage, hit_count, miss_count, hit_rate)
    }

    fn sweep_once(&self) {
        let mut store = self.store.write();
        let before = store.len();
        store.retain(|_, entry| !entry.is_expired());
        let cleaned = before - store.len();
        if cleaned > 0 {
            info!(target: "rpc_cache::engine", cleaned, "swept expired cache keys");
        }
    }
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Spawns the periodic sweeper. The returned handle is aborted on drop
/// by the caller if the engine is ever torn down early (there is no
/// teardown path in the demo binaries, so it otherwise runs for the
/// life of the process).
pub fn spawn_sweeper(engine: std::sync::Arc<CacheEngine>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            engine.sweep_once();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_returns_the_stored_value() {
        let engine = CacheEngine::new();
        engine.set("k".into(), "v".into(), 0);
        let (result, value, exists, expire_time) = engine.get("k");
        assert_eq!(result, ResultCode::ok());
        assert_eq!(value, "v");
        assert!(exists);
        assert!(expire_time.is_none());
    }

    #[test]
    fn get_missing_key_reports_not_found() {
        let engine = CacheEngine::new();
        let (result, _value, exists, _expire) = engine.get("nope");
        assert_eq!(result.errcode, 1);
        assert!(!exists);
    }

    #[test]
    fn entry_expires_after_its_budget() {
        let engine = CacheEngine::new();
        engine.set("k".into(), "v".into(), 0);
        {
            let mut store = engine.store.write();
            let entry = store.get_mut("k").unwrap();
            entry.expire_at = Some(Instant::now() - Duration::from_secs(1));
        }
        let (result, _value, exists, _expire) = engine.get("k");
        assert_eq!(result.errmsg, "Key expired");
        assert!(!exists);
    }

    #[test]
    fn delete_removes_an_existing_key_and_reports_missing_otherwise() {
        let engine = CacheEngine::new();
        engine.set("k".into(), "v".into(), 0);
        assert_eq!(engine.delete("k"), ResultCode::ok());
        assert_eq!(engine.delete("k").errcode, 1);
    }

    #[test]
    fn batch_get_reports_a_mix_of_hits_and_misses() {
        let engine = CacheEngine::new();
        engine.set("a".into(), "1".into(), 0);
        let items = engine.batch_get(&["a".into(), "b".into()]);
        assert!(items[0].exists && items[0].value == "1");
        assert!(!items[1].exists);
    }

    #[test]
    fn stats_tracks_hit_rate() {
        let engine = CacheEngine::new();
        engine.set("a".into(), "1".into(), 0);
        let _ = engine.get("a");
        let _ = engine.get("missing");
        let (total_keys, _mem, hits, misses, hit_rate) = engine.stats();
        assert_eq!(total_keys, 1);
        assert_eq!(hits, 1);
        assert_eq!(misses, 1);
        assert!((hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn sweep_once_removes_expired_entries_only() {
        let engine = CacheEngine::new();
        engine.set("fresh".into(), "1".into(), 0);
        engine.set("stale".into(), "2".into(), 0);
        {
            let mut store = engine.store.write();
            store.get_mut("stale").unwrap().expire_at = Some(Instant::now() - Duration::from_secs(1));
        }
        engine.sweep_once();
        assert!(engine.exists("fresh"));
        assert!(!engine.store.read().contains_key("stale"));
    }
}
