//! Redis pool construction.

use crate::config::RedisConfig;
use deadpool_redis::{Config, Pool, Runtime};
use taskora_core::{TaskoraError, TaskoraResult};
use tracing::info;

/// Builds the process-wide Redis pool and proves it can serve a
/// command before anything else depends on it.
///
/// The pool size caps concurrent Redis operations for the whole
/// process; the configured timeout bounds how long a caller waits for
/// a connection.
pub async fn create_pool(config: &RedisConfig) -> TaskoraResult<Pool> {
    let timeout = config.connect_timeout();

    let pool = Config::from_url(&config.url)
        .builder()
        .map_err(|e| TaskoraError::Configuration(format!("unusable Redis url: {}", e)))?
        .max_size(config.pool_size)
        .create_timeout(Some(timeout))
        .wait_timeout(Some(timeout))
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| TaskoraError::Configuration(format!("Redis pool setup: {}", e)))?;

    ping(&pool).await?;
    info!(pool_size = config.pool_size, "Redis pool ready");

    Ok(pool)
}

/// One round-trip to catch a dead or misconfigured Redis at startup
/// instead of on the first request.
async fn ping(pool: &Pool) -> TaskoraResult<()> {
    let mut conn = pool
        .get()
        .await
        .map_err(|e| TaskoraError::cache(format!("no connection for startup ping: {}", e)))?;

    redis::cmd("PING")
        .query_async::<String>(&mut *conn)
        .await
        .map_err(|e| TaskoraError::cache(format!("startup ping: {}", e)))?;

    Ok(())
}
