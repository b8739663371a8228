//! Prediction cache
//!
//! Results are cached as JSON strings under `prediction:{game_id}:{digest}`.
//! The digest separates "no features supplied" from any supplied feature
//! set, including an all-default one.

use async_trait::async_trait;
use chrono::Utc;
use matchday_ai_core::serialization::canonical_json_string;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::errors::{EngineError, Result};
use crate::types::{CacheStats, GameFeatures};

pub const PREDICTION_KEY_PREFIX: &str = "prediction:";

/// Cache key for a game and its (optional) structured inputs
pub fn cache_key(game_id: &str, features: Option<&GameFeatures>) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    match features {
        None => {
            hasher.update(b"absent");
        }
        Some(features) => {
            hasher.update(b"present:");
            hasher.update(canonical_json_string(features)?.as_bytes());
        }
    }
    Ok(format!(
        "{PREDICTION_KEY_PREFIX}{game_id}:{}",
        hex::encode(hasher.finalize().as_bytes())
    ))
}

/// Key to value store with per-entry TTL
#[async_trait]
pub trait PredictionCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Drop every prediction entry, returning how many were removed
    async fn clear(&self) -> Result<usize>;

    async fn stats(&self) -> Result<CacheStats>;

    async fn is_healthy(&self) -> bool;
}

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// Process-local cache; expired entries are dropped on access
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
    max_entries: Option<usize>,
    hits: AtomicU64,
    misses: AtomicU64,
    last_cleared: Mutex<Option<chrono::DateTime<Utc>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache that refuses new keys once `max_entries` live entries are held
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            max_entries: Some(max_entries),
            ..Self::default()
        }
    }

    fn is_full(&self, entries: &HashMap<String, Entry>) -> bool {
        self.max_entries.is_some_and(|max| entries.len() >= max)
    }

    fn purge_expired(entries: &mut HashMap<String, Entry>, now: Instant) {
        entries.retain(|_, entry| entry.expires_at > now);
    }
}

#[async_trait]
impl PredictionCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let value = match entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        };

        let counter = if value.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if !entries.contains_key(key) && self.is_full(&entries) {
            Self::purge_expired(&mut entries, now);
            if self.is_full(&entries) {
                return Err(EngineError::CacheUnavailable(format!(
                    "cache full ({} entries)",
                    entries.len()
                )));
            }
        }
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn clear(&self) -> Result<usize> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(PREDICTION_KEY_PREFIX));
        let removed = before - entries.len();
        *self.last_cleared.lock() = Some(Utc::now());
        tracing::info!(removed, "Cleared prediction cache");
        Ok(removed)
    }

    async fn stats(&self) -> Result<CacheStats> {
        let mut entries = self.entries.lock();
        Self::purge_expired(&mut entries, Instant::now());

        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        Ok(CacheStats {
            total_keys: entries.len(),
            hit_rate: if lookups > 0 {
                hits as f64 / lookups as f64
            } else {
                0.0
            },
            hits,
            misses,
            prediction_cache_size: entries
                .keys()
                .filter(|k| k.starts_with(PREDICTION_KEY_PREFIX))
                .count(),
            last_cleared: *self.last_cleared.lock(),
        })
    }

    async fn is_healthy(&self) -> bool {
        let mut entries = self.entries.lock();
        if self.is_full(&entries) {
            Self::purge_expired(&mut entries, Instant::now());
        }
        !self.is_full(&entries)
    }
}
