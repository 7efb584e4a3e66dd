use super::{Connector, KeyValueStore};
use crate::error::CacheError;
use redis::aio::ConnectionManager;
use std::time::Duration;

const SCAN_BATCH: usize = 100;

/// Redis backend, the connection manager reconnects on its own once the
/// first connection succeeded
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

pub struct RedisConnector {
    client: redis::Client,
}

impl RedisConnector {
    /// Only parses the url, nothing is dialed yet
    pub fn new(redis_url: &str) -> Result<Self, CacheError> {
        Ok(RedisConnector {
            client: redis::Client::open(redis_url)?,
        })
    }
}

#[async_trait::async_trait]
impl Connector for RedisConnector {
    type Store = RedisStore;

    async fn connect(&self) -> Result<RedisStore, CacheError> {
        let conn = ConnectionManager::new(self.client.clone()).await?;
        Ok(RedisStore { conn })
    }
}

#[async_trait::async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        Ok(redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<String>>(&mut conn)
            .await?)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(keys.to_vec())
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut removed = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern.as_str())
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            if !keys.is_empty() {
                removed += redis::cmd("DEL")
                    .arg(keys)
                    .query_async::<_, u64>(&mut conn)
                    .await?;
            }
            if next == 0 {
                return Ok(removed);
            }
            cursor = next;
        }
    }
}
