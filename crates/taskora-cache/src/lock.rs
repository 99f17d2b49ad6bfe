//! Per-resource distributed mutex on Redis.
//!
//! A lock is a `lock:{resource}` key holding an owner token with a TTL.
//! Acquisition is `SET NX EX`; release deletes the key only if the
//! token still matches, so an expired lease taken over by another
//! writer is never clobbered.

use deadpool_redis::Pool;
use redis::Script;
use std::future::Future;
use std::time::Duration;
use taskora_core::{TaskoraError, TaskoraResult};
use tracing::{debug, warn};
use uuid::Uuid;

/// Prefix for all lock keys.
pub const LOCK_KEY_PREFIX: &str = "lock:";

const RELEASE_SCRIPT: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end
"#;

/// A distributed lock over one named resource.
///
/// Each instance owns a unique token; two instances for the same
/// resource contend on the same key but never release each other.
pub struct RedisLock {
    pool: Pool,
    key: String,
    token: String,
}

impl RedisLock {
    /// Creates a lock handle for a resource. Nothing is acquired yet.
    #[must_use]
    pub fn new(pool: Pool, resource: &str) -> Self {
        Self {
            pool,
            key: format!("{}{}", LOCK_KEY_PREFIX, resource),
            token: Uuid::new_v4().to_string(),
        }
    }

    /// Attempts to acquire the lock once.
    ///
    /// Returns `true` iff the caller now owns the lease.
    pub async fn try_acquire(&self, ttl: Duration) -> TaskoraResult<bool> {
        let mut conn = self.conn().await?;

        let reply: Option<String> = redis::cmd("SET")
            .arg(&self.key)
            .arg(&self.token)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut *conn)
            .await
            .map_err(|e| TaskoraError::cache(format!("lock attempt on '{}' failed: {}", self.key, e)))?;

        Ok(reply.is_some())
    }

    /// Attempts to acquire the lock, sleeping `retry_interval` between
    /// attempts, up to `max_retries` attempts in total.
    ///
    /// The sleep is a cancellation point: dropping the future abandons
    /// the acquisition without leaking anything.
    pub async fn acquire_with_retry(
        &self,
        ttl: Duration,
        retry_interval: Duration,
        max_retries: u32,
    ) -> TaskoraResult<()> {
        for attempt in 0..max_retries {
            if attempt > 0 {
                tokio::time::sleep(retry_interval).await;
            }

            if self.try_acquire(ttl).await? {
                debug!(key = %self.key, attempt, "Acquired lock");
                return Ok(());
            }
        }

        Err(TaskoraError::LockUnavailable(format!(
            "'{}' still held after {} attempts",
            self.key, max_retries
        )))
    }

    /// Releases the lock if this instance still owns it.
    ///
    /// Best-effort: failures are logged, never surfaced, and releasing
    /// an already-expired or absent lease is a no-op.
    pub async fn release(&self) {
        let mut conn = match self.conn().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to release lock");
                return;
            }
        };

        let released: Result<i64, _> = Script::new(RELEASE_SCRIPT)
            .key(&self.key)
            .arg(&self.token)
            .invoke_async(&mut *conn)
            .await;

        match released {
            Ok(n) => debug!(key = %self.key, released = n > 0, "Released lock"),
            Err(e) => warn!(key = %self.key, error = %e, "Failed to release lock"),
        }
    }

    /// Acquires the lock, runs `f`, and releases on every exit path.
    ///
    /// If the surrounding task is cancelled or panics mid-critical
    /// section the key is left to expire via its TTL; pipeline
    /// operations are idempotent per todo so a successor observing the
    /// expired lease cannot corrupt the cache.
    pub async fn with_lock<T, F, Fut>(
        &self,
        ttl: Duration,
        retry_interval: Duration,
        max_retries: u32,
        f: F,
    ) -> TaskoraResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = TaskoraResult<T>>,
    {
        self.acquire_with_retry(ttl, retry_interval, max_retries)
            .await?;

        let result = f().await;
        self.release().await;
        result
    }

    async fn conn(&self) -> TaskoraResult<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| TaskoraError::cache(format!("redis connection unavailable: {}", e)))
    }
}

/// Acquires several resources in lexicographic order, runs `f`, and
/// releases them all.
///
/// Ordered acquisition prevents deadlocks when callers hold more than
/// one lease at a time.
pub async fn with_locks<T, F, Fut>(
    pool: &Pool,
    resources: &[&str],
    ttl: Duration,
    retry_interval: Duration,
    max_retries: u32,
    f: F,
) -> TaskoraResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = TaskoraResult<T>>,
{
    let mut sorted: Vec<&str> = resources.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut held: Vec<RedisLock> = Vec::with_capacity(sorted.len());
    for resource in sorted {
        let lock = RedisLock::new(pool.clone(), resource);
        if let Err(e) = lock
            .acquire_with_retry(ttl, retry_interval, max_retries)
            .await
        {
            for acquired in &held {
                acquired.release().await;
            }
            return Err(e);
        }
        held.push(lock);
    }

    let result = f().await;
    for lock in &held {
        lock.release().await;
    }
    result
}
