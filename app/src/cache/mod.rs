//! Cache-aside layer.
//!
//! `Cache` never fails: backend errors and timeouts are logged and behave
//! like a miss (reads) or a no-op (writes). The durable store stays the only
//! source of truth.

use crate::error::CacheError;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

mod lazy;
mod redis_store;
#[cfg(test)]
pub mod memory;

pub use lazy::{Connector, LazyStore};
pub use redis_store::RedisConnector;

#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError>;

    /// Deletes every key starting with `prefix`, returns the number removed
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError>;
}

/// Backend used when no cache is configured
pub struct Unavailable;

#[async_trait::async_trait]
impl KeyValueStore for Unavailable {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::Unavailable)
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable)
    }

    async fn delete(&self, _keys: &[String]) -> Result<(), CacheError> {
        Err(CacheError::Unavailable)
    }

    async fn delete_prefix(&self, _prefix: &str) -> Result<u64, CacheError> {
        Err(CacheError::Unavailable)
    }
}

pub mod keys {
    use chrono::NaiveDate;

    pub fn sensor_prefix(sensor_id: i32) -> String {
        format!("sensor:{}:", sensor_id)
    }

    pub fn latest(sensor_id: i32) -> String {
        format!("sensor:{}:latest", sensor_id)
    }

    pub fn daily_readings(sensor_id: i32, date: NaiveDate) -> String {
        format!("sensor:{}:daily-readings:{}", sensor_id, date.format("%Y-%m-%d"))
    }

    pub fn daily_average(sensor_id: i32, date: NaiveDate) -> String {
        format!("sensor:{}:daily-average:{}", sensor_id, date.format("%Y-%m-%d"))
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, utoipa::ToSchema)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
}

#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn KeyValueStore>,
    op_timeout: Duration,
    counters: Arc<Counters>,
}

impl Cache {
    pub fn new(backend: Arc<dyn KeyValueStore>, op_timeout: Duration) -> Self {
        Cache {
            backend,
            op_timeout,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }

    /// Returns the cached value or `None` on miss, error or timeout
    pub async fn get<T: DeserializeOwned>(&self, key: &str, deadline: Instant) -> Option<T> {
        let fetched = self
            .bounded(deadline, self.backend.get(key))
            .await
            .and_then(|raw| match raw {
                Some(raw) => Ok(Some(serde_json::from_str::<T>(&raw)?)),
                None => Ok(None),
            });

        match fetched {
            Ok(Some(value)) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = key, "Cache hit");
                Some(value)
            }
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = key, "Cache miss");
                None
            }
            Err(e) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = key, "Cache read failed, falling back to store: {}", e);
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration, deadline: Instant) {
        let written = match serde_json::to_string(value) {
            Ok(raw) => self.bounded(deadline, self.backend.set(key, raw, ttl)).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = written {
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
            warn!(key = key, "Cache write skipped: {}", e);
        }
    }

    pub async fn delete(&self, keys: &[String], deadline: Instant) {
        if keys.is_empty() {
            return;
        }
        if let Err(e) = self.bounded(deadline, self.backend.delete(keys)).await {
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
            warn!(keys = ?keys, "Cache invalidation failed, entries expire by ttl: {}", e);
        }
    }

    pub async fn invalidate_prefix(&self, prefix: &str, deadline: Instant) {
        match self
            .bounded(deadline, self.backend.delete_prefix(prefix))
            .await
        {
            Ok(count) => debug!(prefix = prefix, count = count, "Invalidated cache prefix"),
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                warn!(prefix = prefix, "Cache invalidation failed, entries expire by ttl: {}", e);
            }
        }
    }

    async fn bounded<T, F>(&self, deadline: Instant, fut: F) -> Result<T, CacheError>
    where
        F: std::future::Future<Output = Result<T, CacheError>>,
    {
        let op_deadline = std::cmp::min(deadline, Instant::now() + self.op_timeout);
        match timeout_at(op_deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout),
        }
    }
}
