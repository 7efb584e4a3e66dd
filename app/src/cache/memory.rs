use super::KeyValueStore;
use crate::error::CacheError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// In-process key-value store honoring ttls, can be switched unreachable
#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
    unreachable: AtomicBool,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &str) -> bool {
        let entries = self.entries.lock();
        matches!(entries.get(key), Some((_, expiry)) if *expiry > Instant::now())
    }

    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let entries = self.entries.lock();
        entries
            .get(key)
            .map(|(_, expiry)| expiry.saturating_duration_since(Instant::now()))
    }

    pub fn insert_raw(&self, key: &str, value: &str) {
        self.entries.lock().insert(
            key.to_owned(),
            (value.to_owned(), Instant::now() + Duration::from_secs(60)),
        );
    }

    fn check_reachable(&self) -> Result<(), CacheError> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(CacheError::Unavailable)
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.check_reachable()?;
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((value, expiry)) if *expiry > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.check_reachable()?;
        self.entries
            .lock()
            .insert(key.to_owned(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
        self.check_reachable()?;
        let mut entries = self.entries.lock();
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        self.check_reachable()?;
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }
}
