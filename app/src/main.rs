mod cache;
mod config;
mod error;
mod logging;
mod models;
mod repository;
mod rest;
mod sensor;

use cache::{Cache, KeyValueStore, LazyStore, RedisConnector, Unavailable};
use config::CONFIG;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{error, info, warn};

#[tokio::main]
pub async fn main() {
    logging::init_tracing(CONFIG.otel_stdout());
    info!(core = sprout_core::CORE_VERSION, "Starting sprout");

    let db_conn = match models::establish_db_connection(
        &CONFIG.database_url(),
        CONFIG.db_max_connections(),
    )
    .await
    {
        Ok(conn) => conn,
        Err(e) => {
            error!("Could not connect to database: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = models::check_schema(&db_conn).await {
        error!("Database schema is missing, apply database/schema.sql: {}", e);
        std::process::exit(1);
    }

    let settings = CONFIG.service_settings();
    let backend: Arc<dyn KeyValueStore> = match RedisConnector::new(&CONFIG.redis_url()) {
        Ok(connector) => {
            let store = LazyStore::new(connector, CONFIG.redis_retry());
            if timeout(settings.request_timeout, store.connect()).await.is_err() {
                warn!("Redis connect timed out, retrying on demand");
            }
            Arc::new(store)
        }
        Err(e) => {
            warn!("Invalid redis url, serving without cache: {}", e);
            Arc::new(Unavailable)
        }
    };
    let cache = Cache::new(backend, settings.cache_timeout);

    let store = Arc::new(models::PgStore::new(db_conn));
    let context = sensor::SensorContext::new(store.clone(), store, cache, settings);

    if let Err(e) = rest::dispatch_server_daemon(context, CONFIG.server_port()).await {
        error!("Webserver failed: {}", e);
        std::process::exit(1);
    }
    info!("Shutdown complete");
}
