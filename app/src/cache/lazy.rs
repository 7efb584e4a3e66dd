use super::KeyValueStore;
use crate::error::CacheError;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{info, warn};

/// Opens a backend connection
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    type Store: KeyValueStore;

    async fn connect(&self) -> Result<Self::Store, CacheError>;
}

/// Connects on first use. A failed or cancelled attempt leaves the store
/// empty; calls within `retry_after` of the last attempt fail fast with
/// `CacheError::Unavailable`, the first call after that tries again.
pub struct LazyStore<C: Connector> {
    connector: C,
    store: OnceCell<C::Store>,
    retry_after: Duration,
    last_attempt: Mutex<Option<Instant>>,
}

impl<C: Connector> LazyStore<C> {
    pub fn new(connector: C, retry_after: Duration) -> Self {
        LazyStore {
            connector,
            store: OnceCell::new(),
            retry_after,
            last_attempt: Mutex::new(None),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.store.initialized()
    }

    pub async fn connect(&self) -> Result<&C::Store, CacheError> {
        if let Some(store) = self.store.get() {
            return Ok(store);
        }
        {
            let mut last_attempt = self.last_attempt.lock();
            if matches!(*last_attempt, Some(at) if at.elapsed() < self.retry_after) {
                return Err(CacheError::Unavailable);
            }
            *last_attempt = Some(Instant::now());
        }

        self.store
            .get_or_try_init(|| async {
                match self.connector.connect().await {
                    Ok(store) => {
                        info!("Cache backend connected");
                        Ok(store)
                    }
                    Err(e) => {
                        warn!("Cache backend unreachable: {}", e);
                        Err(e)
                    }
                }
            })
            .await
    }
}

#[async_trait::async_trait]
impl<C: Connector> KeyValueStore for LazyStore<C> {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.connect().await?.get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.connect().await?.set(key, value, ttl).await
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
        self.connect().await?.delete(keys).await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        self.connect().await?.delete_prefix(prefix).await
    }
}
