//! Invalidation cache for tag queries.
//!
//! Tags are few and change rarely, so the structure is simpler than
//! the todo cache: point, list-page and per-user keys hold serialized
//! values, and any tag write sweeps the list and per-user keys under a
//! single global lease.

use crate::config::CacheConfig;
use crate::flight::Flight;
use crate::keys;
use crate::lock::RedisLock;
use crate::sweep::delete_pattern;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use taskora_core::{Page, PageRequest, Tag, TagStore, TaskoraError, TaskoraResult};
use tracing::{debug, warn};

/// The tag cache engine.
pub struct TagCache {
    pool: Pool,
    store: Arc<dyn TagStore>,
    config: CacheConfig,

    tag_flight: Flight<Tag>,
    list_flight: Flight<Page<Tag>>,
    user_tags_flight: Flight<Vec<Tag>>,
}

impl TagCache {
    /// Creates a new tag cache over a Redis pool and a store.
    #[must_use]
    pub fn new(pool: Pool, store: Arc<dyn TagStore>, config: CacheConfig) -> Self {
        Self {
            pool,
            store,
            config,
            tag_flight: Flight::new(),
            list_flight: Flight::new(),
            user_tags_flight: Flight::new(),
        }
    }

    // ============ Read path ============

    /// Retrieves a single tag, preferring its cached record.
    pub async fn get_tag(&self, tag_id: i64) -> TaskoraResult<Tag> {
        let point_key = keys::tag_point_key(tag_id);

        match self.read_json::<Tag>(&point_key).await {
            Ok(Some(tag)) => {
                debug!(key = %point_key, "Cache hit for tag");
                return Ok(tag);
            }
            Ok(None) => debug!(key = %point_key, "Cache miss for tag"),
            Err(e) => warn!(key = %point_key, error = %e, "Tag cache read degraded to store"),
        }

        let flight_key = format!("get-tag:{}", tag_id);
        self.tag_flight
            .work(&flight_key, || async {
                let tag = self
                    .store
                    .find_by_id(tag_id)
                    .await?
                    .ok_or_else(|| TaskoraError::not_found("Tag", tag_id))?;

                if let Err(e) = self.write_json(&point_key, &tag).await {
                    warn!(tag_id, error = %e, "Failed to backfill tag cache");
                }

                Ok(tag)
            })
            .await
    }

    /// Retrieves one page of the tag listing.
    pub async fn list_tags(&self, page: PageRequest) -> TaskoraResult<Page<Tag>> {
        let list_key = keys::tag_list_key(page.page, page.limit);

        match self.read_json::<Page<Tag>>(&list_key).await {
            Ok(Some(cached)) => {
                debug!(key = %list_key, "Cache hit for tag list");
                return Ok(cached);
            }
            Ok(None) => debug!(key = %list_key, "Cache miss for tag list"),
            Err(e) => warn!(key = %list_key, error = %e, "Tag list read degraded to store"),
        }

        self.list_flight
            .work(&list_key, || async {
                let tags = self.store.list(page.offset(), page.limit).await?;
                let total = self.store.count().await?;
                let result_page = Page::new(tags, total);

                if let Err(e) = self.write_json(&list_key, &result_page).await {
                    warn!(key = %list_key, error = %e, "Failed to cache tag list");
                }

                Ok(result_page)
            })
            .await
    }

    /// Retrieves the tags used by one user's todos.
    pub async fn get_user_tags(&self, user_id: i64) -> TaskoraResult<Vec<Tag>> {
        let user_key = keys::user_tags_key(user_id);

        match self.read_json::<Vec<Tag>>(&user_key).await {
            Ok(Some(tags)) => {
                debug!(key = %user_key, "Cache hit for user tags");
                return Ok(tags);
            }
            Ok(None) => debug!(key = %user_key, "Cache miss for user tags"),
            Err(e) => warn!(key = %user_key, error = %e, "User tags read degraded to store"),
        }

        self.user_tags_flight
            .work(&user_key, || async {
                let tags = self.store.list_by_user(user_id).await?;

                if let Err(e) = self.write_json(&user_key, &tags).await {
                    warn!(user_id, error = %e, "Failed to cache user tags");
                }

                Ok(tags)
            })
            .await
    }

    // ============ Write path ============

    /// Creates a tag and invalidates the tag list caches.
    pub async fn create_tag(&self, tag: &Tag) -> TaskoraResult<Tag> {
        self.with_tags_lease(|| async {
            let created = self.store.create(tag).await?;
            self.invalidate_tag_lists().await;
            Ok(created)
        })
        .await
    }

    /// Updates a tag, drops its point record and invalidates the tag
    /// list caches.
    pub async fn update_tag(&self, tag: &Tag) -> TaskoraResult<Tag> {
        self.with_tags_lease(|| async {
            let updated = self.store.update(tag).await?;

            self.drop_point(updated.id).await;
            self.invalidate_tag_lists().await;

            Ok(updated)
        })
        .await
    }

    /// Deletes a tag, its point record and the tag list caches.
    pub async fn delete_tag(&self, tag_id: i64) -> TaskoraResult<()> {
        self.with_tags_lease(|| async {
            self.store.delete(tag_id).await?;

            self.drop_point(tag_id).await;
            self.invalidate_tag_lists().await;

            Ok(())
        })
        .await
    }

    /// Invalidates one user's tag listing.
    ///
    /// Called when a todo-tag assignment changes for that user.
    pub async fn invalidate_user(&self, user_id: i64) -> TaskoraResult<()> {
        let user_key = keys::user_tags_key(user_id);
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(&user_key).await.map_err(|e| {
            TaskoraError::cache(format!("drop of '{}' failed: {}", user_key, e))
        })?;
        Ok(())
    }

    /// Runs a tag write under the global tags lease.
    ///
    /// Mirrors the todo write policy: contention surfaces as
    /// `LockUnavailable`, but an unreachable Redis means there is no
    /// cache to protect and the write proceeds unlocked.
    async fn with_tags_lease<T, F, Fut>(&self, f: F) -> TaskoraResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = TaskoraResult<T>>,
    {
        let lock = RedisLock::new(self.pool.clone(), keys::TAGS_LOCK_RESOURCE);

        let locked = match lock
            .acquire_with_retry(
                self.config.lock_timeout(),
                self.config.lock_retry_interval(),
                self.config.lock_retries,
            )
            .await
        {
            Ok(()) => true,
            Err(e @ TaskoraError::LockUnavailable(_)) => return Err(e),
            Err(e) if e.is_cache_degradable() => {
                warn!(error = %e, "Tags lease unavailable (Redis down); writing unlocked");
                false
            }
            Err(e) => return Err(e),
        };

        let result = f().await;
        if locked {
            lock.release().await;
        }
        result
    }

    /// Sweeps every tag list page and per-user tag listing.
    ///
    /// Failures are logged, never surfaced: the keys expire on their
    /// own TTL.
    async fn invalidate_tag_lists(&self) {
        for pattern in [keys::tag_list_pattern(), keys::user_tags_pattern()] {
            match delete_pattern(&self.pool, &pattern).await {
                Ok(deleted) if deleted > 0 => debug!(pattern = %pattern, deleted, "Invalidated tag caches"),
                Ok(_) => {}
                Err(e) => warn!(pattern = %pattern, error = %e, "Failed to invalidate tag caches"),
            }
        }
    }

    /// Best-effort removal of one tag's point record.
    async fn drop_point(&self, tag_id: i64) {
        let point_key = keys::tag_point_key(tag_id);
        match self.conn().await {
            Ok(mut conn) => {
                if let Err(e) = conn.del::<_, ()>(&point_key).await {
                    warn!(key = %point_key, error = %e, "Failed to drop tag record");
                }
            }
            Err(e) => warn!(key = %point_key, error = %e, "Failed to drop tag record"),
        }
    }

    // ============ Serialized value helpers ============

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> TaskoraResult<Option<T>> {
        let mut conn = self.conn().await?;
        let cached: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| TaskoraError::cache(format!("read of '{}' failed: {}", key, e)))?;

        let Some(json) = cached else {
            return Ok(None);
        };

        match serde_json::from_str::<T>(&json) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                // A corrupt value is a miss; the loader overwrites it.
                warn!(key, error = %e, "Dropping corrupt tag cache value");
                Ok(None)
            }
        }
    }

    async fn write_json<T: Serialize>(&self, key: &str, value: &T) -> TaskoraResult<()> {
        let json = serde_json::to_string(value)?;
        let mut conn = self.conn().await?;
        conn.set_ex::<_, _, ()>(key, json, self.config.tag_ttl_secs)
            .await
            .map_err(|e| TaskoraError::cache(format!("write of '{}' failed: {}", key, e)))?;
        Ok(())
    }

    async fn conn(&self) -> TaskoraResult<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| TaskoraError::cache(format!("redis connection unavailable: {}", e)))
    }
}
