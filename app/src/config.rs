use chrono_tz::Tz;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::sensor::ServiceSettings;

pub struct Config {
    inner: RwLock<InnerConfig>,
}

struct InnerConfig {
    database_url: String,
    redis_url: String,
    server_port: u16,
    db_max_connections: u32,
    latest_ttl_secs: u64,
    daily_ttl_secs: u64,
    request_timeout_ms: u64,
    cache_timeout_ms: u64,
    redis_retry_ms: u64,
    day_timezone: Tz,
    otel_stdout: bool,
}

impl Config {
    pub fn database_url(&self) -> String {
        let inner = self.inner.read();
        inner.database_url.clone()
    }

    pub fn redis_url(&self) -> String {
        let inner = self.inner.read();
        inner.redis_url.clone()
    }

    pub fn redis_retry(&self) -> Duration {
        Duration::from_millis(self.inner.read().redis_retry_ms)
    }

    pub fn server_port(&self) -> u16 {
        self.inner.read().server_port
    }

    pub fn db_max_connections(&self) -> u32 {
        self.inner.read().db_max_connections
    }

    pub fn otel_stdout(&self) -> bool {
        self.inner.read().otel_stdout
    }

    pub fn service_settings(&self) -> ServiceSettings {
        let inner = self.inner.read();
        ServiceSettings {
            latest_ttl: Duration::from_secs(inner.latest_ttl_secs),
            daily_ttl: Duration::from_secs(inner.daily_ttl_secs),
            request_timeout: Duration::from_millis(inner.request_timeout_ms),
            cache_timeout: Duration::from_millis(inner.cache_timeout_ms),
            timezone: inner.day_timezone,
        }
    }
}

fn var_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

pub static CONFIG: Lazy<Config> = Lazy::new(|| {
    dotenv::dotenv().ok();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let redis_url = env::var("REDIS_URL").expect("REDIS_URL must be set");
    let day_timezone = env::var("DAY_TIMEZONE")
        .ok()
        .map(|name| {
            Tz::from_str(name.trim())
                .unwrap_or_else(|_| panic!("DAY_TIMEZONE is not a valid timezone: {}", name))
        })
        .unwrap_or(Tz::UTC);

    Config {
        inner: RwLock::new(InnerConfig {
            database_url,
            redis_url,
            server_port: var_or("SERVER_PORT", 8000),
            db_max_connections: var_or("DB_MAX_CONNECTIONS", 10),
            latest_ttl_secs: var_or("CACHE_LATEST_TTL_SECS", 15 * 60),
            daily_ttl_secs: var_or("CACHE_DAILY_TTL_SECS", 24 * 60 * 60),
            request_timeout_ms: var_or("REQUEST_TIMEOUT_MS", 5_000),
            cache_timeout_ms: var_or("CACHE_TIMEOUT_MS", 250),
            redis_retry_ms: var_or("REDIS_RETRY_MS", 5_000),
            day_timezone,
            otel_stdout: var_or("OTEL_STDOUT", false),
        }),
    }
});
