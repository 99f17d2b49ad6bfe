//! Cache layer configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the cache layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Redis connection configuration.
    #[serde(default)]
    pub redis: RedisConfig,

    /// Point-record (todo hash) TTL in seconds.
    #[serde(default = "default_hash_ttl")]
    pub hash_ttl_secs: u64,

    /// Ordered-index (sorted set) TTL in seconds.
    #[serde(default = "default_sorted_set_ttl")]
    pub sorted_set_ttl_secs: u64,

    /// Query result blob TTL in seconds.
    #[serde(default = "default_query_ttl")]
    pub query_ttl_secs: u64,

    /// Tag point/list/user cache TTL in seconds.
    #[serde(default = "default_tag_ttl")]
    pub tag_ttl_secs: u64,

    /// Distributed lock TTL in seconds.
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: u64,

    /// Delay between lock acquisition attempts in milliseconds.
    #[serde(default = "default_lock_retry_interval")]
    pub lock_retry_interval_ms: u64,

    /// Number of lock acquisition attempts.
    #[serde(default = "default_lock_retries")]
    pub lock_retries: u32,

    /// Maximum rows fetched from the store during an index rebuild.
    #[serde(default = "default_rebuild_cap")]
    pub rebuild_cap: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis: RedisConfig::default(),
            hash_ttl_secs: default_hash_ttl(),
            sorted_set_ttl_secs: default_sorted_set_ttl(),
            query_ttl_secs: default_query_ttl(),
            tag_ttl_secs: default_tag_ttl(),
            lock_timeout_secs: default_lock_timeout(),
            lock_retry_interval_ms: default_lock_retry_interval(),
            lock_retries: default_lock_retries(),
            rebuild_cap: default_rebuild_cap(),
        }
    }
}

impl CacheConfig {
    /// Returns the point-record TTL as a Duration.
    #[must_use]
    pub const fn hash_ttl(&self) -> Duration {
        Duration::from_secs(self.hash_ttl_secs)
    }

    /// Returns the ordered-index TTL as a Duration.
    #[must_use]
    pub const fn sorted_set_ttl(&self) -> Duration {
        Duration::from_secs(self.sorted_set_ttl_secs)
    }

    /// Returns the query blob TTL as a Duration.
    #[must_use]
    pub const fn query_ttl(&self) -> Duration {
        Duration::from_secs(self.query_ttl_secs)
    }

    /// Returns the tag cache TTL as a Duration.
    #[must_use]
    pub const fn tag_ttl(&self) -> Duration {
        Duration::from_secs(self.tag_ttl_secs)
    }

    /// Returns the lock TTL as a Duration.
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    /// Returns the lock retry interval as a Duration.
    #[must_use]
    pub const fn lock_retry_interval(&self) -> Duration {
        Duration::from_millis(self.lock_retry_interval_ms)
    }
}

/// Connection settings for the Redis the cache lives in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Connection string, `redis://host:port[/db]`.
    #[serde(default = "default_url")]
    pub url: String,

    /// Upper bound on checked-out connections. Sized generously: the
    /// pool caps in-flight Redis commands for the whole process.
    #[serde(default = "default_pool_capacity")]
    pub pool_size: usize,

    /// Seconds to wait for a connection (fresh or pooled) before the
    /// operation is reported as a cache failure.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl RedisConfig {
    /// Returns the connection wait budget as a Duration.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            pool_size: default_pool_capacity(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_pool_capacity() -> usize {
    16
}

fn default_connect_timeout_secs() -> u64 {
    3
}

fn default_hash_ttl() -> u64 {
    3600 // 60 minutes
}

fn default_sorted_set_ttl() -> u64 {
    600 // 10 minutes
}

fn default_query_ttl() -> u64 {
    300 // 5 minutes
}

fn default_tag_ttl() -> u64 {
    1800 // 30 minutes
}

fn default_lock_timeout() -> u64 {
    10
}

fn default_lock_retry_interval() -> u64 {
    100
}

fn default_lock_retries() -> u32 {
    3
}

fn default_rebuild_cap() -> u32 {
    10000
}
