//! Write-through/invalidation cache for todo queries.
//!
//! Point lookups are served from per-todo hash records. List queries
//! are served either from a fixed set of per-user ordered indexes or,
//! for query shapes the indexes do not cover, from fingerprinted
//! result blobs. Writes go to the store first under a per-user lease,
//! then update the point record and every index in one pipeline and
//! sweep the user's blobs. Absent indexes are rebuilt lazily from the
//! store on first read.

use crate::config::CacheConfig;
use crate::flight::Flight;
use crate::keys;
use crate::lock::RedisLock;
use crate::record::{parse_todo_hash, todo_hash_pairs};
use crate::score::todo_score;
use crate::sweep::delete_pattern;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use taskora_core::{
    ListFilter, ListOrder, Page, PageRequest, TaskoraError, TaskoraResult, Todo, TodoStatus,
    TodoStore,
};
use tracing::{debug, warn};

/// The todo cache engine.
pub struct TodoCache {
    pool: Pool,
    store: Arc<dyn TodoStore>,
    config: CacheConfig,

    todo_flight: Flight<Todo>,
    list_flight: Flight<Page<Todo>>,
    rebuild_flight: Flight<Vec<i64>>,
}

impl TodoCache {
    /// Creates a new todo cache over a Redis pool and a store.
    #[must_use]
    pub fn new(pool: Pool, store: Arc<dyn TodoStore>, config: CacheConfig) -> Self {
        Self {
            pool,
            store,
            config,
            todo_flight: Flight::new(),
            list_flight: Flight::new(),
            rebuild_flight: Flight::new(),
        }
    }

    // ============ Read path ============

    /// Retrieves a single todo, preferring its cached hash record.
    pub async fn get_todo(&self, todo_id: i64) -> TaskoraResult<Todo> {
        let hash_key = keys::todo_hash_key(todo_id);

        match self.read_hash_record(&hash_key).await {
            Ok(Some(todo)) => {
                debug!(key = %hash_key, "Cache hit for todo");
                return Ok(todo);
            }
            Ok(None) => debug!(key = %hash_key, "Cache miss for todo"),
            Err(e) => warn!(key = %hash_key, error = %e, "Todo cache read degraded to store"),
        }

        let flight_key = format!("get-todo:{}", todo_id);
        self.todo_flight
            .work(&flight_key, || async {
                let todo = self
                    .store
                    .find_by_id(todo_id)
                    .await?
                    .ok_or_else(|| TaskoraError::not_found("Todo", todo_id))?;

                if let Err(e) = self.write_hash_record(&todo).await {
                    warn!(todo_id, error = %e, "Failed to backfill todo cache");
                }

                Ok(todo)
            })
            .await
    }

    /// Retrieves a paginated, filtered, ordered todo list for a user.
    pub async fn list_todos(
        &self,
        user_id: i64,
        filter: &ListFilter,
        order: &ListOrder,
        page: PageRequest,
    ) -> TaskoraResult<Page<Todo>> {
        if keys::uses_index_path(filter, order) {
            self.list_via_index(user_id, filter, order, page).await
        } else {
            self.list_via_blob(user_id, filter, order, page).await
        }
    }

    // ============ Index path ============

    async fn list_via_index(
        &self,
        user_id: i64,
        filter: &ListFilter,
        order: &ListOrder,
        page: PageRequest,
    ) -> TaskoraResult<Page<Todo>> {
        let index_key = keys::index_set_key(user_id, filter, order);
        // Pagination is part of the coalescing key so concurrent reads
        // of different pages never share a result.
        let flight_key = format!("{}:page:{}:limit:{}", index_key, page.page, page.limit);

        let result = self
            .list_flight
            .work(&flight_key, || async {
                self.read_index_page(user_id, filter, order, &index_key, page)
                    .await
            })
            .await;

        match result {
            Ok(result_page) => Ok(result_page),
            Err(e) if e.is_cache_degradable() => {
                warn!(key = %index_key, error = %e, "Index read degraded to store");
                self.list_from_store(user_id, filter, order, page).await
            }
            Err(e) => Err(e),
        }
    }

    async fn read_index_page(
        &self,
        user_id: i64,
        filter: &ListFilter,
        order: &ListOrder,
        index_key: &str,
        page: PageRequest,
    ) -> TaskoraResult<Page<Todo>> {
        let mut conn = self.conn().await?;

        let exists: bool = conn.exists(index_key).await.map_err(|e| {
            TaskoraError::cache(format!("Failed to check index '{}': {}", index_key, e))
        })?;
        drop(conn);

        if !exists {
            self.rebuild_index(user_id, filter, order, index_key).await?;
        }

        let start = page.offset() as isize;
        let stop = start + page.limit as isize - 1;

        let mut conn = self.conn().await?;
        let members: Vec<String> = conn.zrange(index_key, start, stop).await.map_err(|e| {
            TaskoraError::cache(format!("Failed to range index '{}': {}", index_key, e))
        })?;
        let total: i64 = conn.zcard(index_key).await.map_err(|e| {
            TaskoraError::cache(format!("Failed to count index '{}': {}", index_key, e))
        })?;
        drop(conn);

        let ids = members.iter().filter_map(|m| m.parse::<i64>().ok());

        let mut todos = Vec::with_capacity(members.len());
        for id in ids {
            // An id can linger in an index briefly after its todo is
            // gone; skip it rather than failing the page.
            match self.get_todo(id).await {
                Ok(todo) => todos.push(todo),
                Err(TaskoraError::NotFound { .. }) => {
                    debug!(todo_id = id, key = %index_key, "Dropping stale index member")
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Page::new(todos, total))
    }

    /// Rebuilds one ordered index from the store.
    ///
    /// Guarded by its own flight group so concurrent readers of an
    /// absent index trigger exactly one store scan.
    async fn rebuild_index(
        &self,
        user_id: i64,
        filter: &ListFilter,
        order: &ListOrder,
        index_key: &str,
    ) -> TaskoraResult<Vec<i64>> {
        self.rebuild_flight
            .work(index_key, || async {
                let cap = self.config.rebuild_cap;
                let (todos, _) = self
                    .store
                    .find_by_user_and_filters(user_id, filter, order, 0, cap)
                    .await?;

                if todos.len() as u32 >= cap {
                    warn!(
                        user_id,
                        key = %index_key,
                        cap,
                        "Index rebuild hit the row cap; results beyond it are not indexed"
                    );
                }

                let mut pipe = redis::pipe();
                pipe.del(index_key).ignore();
                for todo in &todos {
                    let score = todo_score(todo, &order.field, order.direction);
                    pipe.zadd(index_key, todo.id, score).ignore();
                }
                pipe.expire(index_key, self.config.sorted_set_ttl_secs as i64)
                    .ignore();

                let mut conn = self.conn().await?;
                pipe.query_async::<()>(&mut *conn).await.map_err(|e| {
                    TaskoraError::cache(format!("Failed to rebuild index '{}': {}", index_key, e))
                })?;

                debug!(user_id, key = %index_key, members = todos.len(), "Rebuilt index");
                Ok(todos.iter().map(|t| t.id).collect())
            })
            .await
    }

    // ============ Blob path ============

    async fn list_via_blob(
        &self,
        user_id: i64,
        filter: &ListFilter,
        order: &ListOrder,
        page: PageRequest,
    ) -> TaskoraResult<Page<Todo>> {
        let blob_key = keys::query_blob_key(user_id, filter, order, page.page, page.limit);

        match self.read_blob(&blob_key).await {
            Ok(Some(cached)) => {
                debug!(key = %blob_key, "Cache hit for list query");
                return Ok(cached);
            }
            Ok(None) => debug!(key = %blob_key, "Cache miss for list query"),
            Err(e) => warn!(key = %blob_key, error = %e, "Blob read degraded to store"),
        }

        self.list_flight
            .work(&blob_key, || async {
                let result_page = self.list_from_store(user_id, filter, order, page).await?;

                if let Err(e) = self.write_blob(&blob_key, &result_page).await {
                    warn!(key = %blob_key, error = %e, "Failed to cache list query");
                }

                Ok(result_page)
            })
            .await
    }

    async fn list_from_store(
        &self,
        user_id: i64,
        filter: &ListFilter,
        order: &ListOrder,
        page: PageRequest,
    ) -> TaskoraResult<Page<Todo>> {
        let (todos, total) = self
            .store
            .find_by_user_and_filters(user_id, filter, order, page.offset(), page.limit)
            .await?;
        Ok(Page::new(todos, total))
    }

    async fn read_blob(&self, blob_key: &str) -> TaskoraResult<Option<Page<Todo>>> {
        let mut conn = self.conn().await?;
        let cached: Option<String> = conn.get(blob_key).await.map_err(|e| {
            TaskoraError::cache(format!("Failed to get blob '{}': {}", blob_key, e))
        })?;

        let Some(json) = cached else {
            return Ok(None);
        };

        match serde_json::from_str::<Page<Todo>>(&json) {
            Ok(result_page) => Ok(Some(result_page)),
            Err(e) => {
                // A corrupt blob is a miss; the loader overwrites it.
                warn!(key = %blob_key, error = %e, "Dropping corrupt list blob");
                Ok(None)
            }
        }
    }

    async fn write_blob(&self, blob_key: &str, result_page: &Page<Todo>) -> TaskoraResult<()> {
        let json = serde_json::to_string(result_page)?;
        let mut conn = self.conn().await?;
        conn.set_ex::<_, _, ()>(blob_key, json, self.config.query_ttl_secs)
            .await
            .map_err(|e| {
                TaskoraError::cache(format!("Failed to set blob '{}': {}", blob_key, e))
            })?;
        Ok(())
    }

    // ============ Write path ============

    /// Creates a todo and write-through updates the user's cache.
    pub async fn create_todo(&self, todo: &Todo) -> TaskoraResult<Todo> {
        self.with_user_lease(todo.user_id, || async {
            let created = self.store.create(todo).await?;

            if let Err(e) = self.apply_upsert(&created).await {
                warn!(todo_id = created.id, error = %e, "Cache update failed after create");
            }
            self.invalidate_query_blobs(created.user_id).await;

            Ok(created)
        })
        .await
    }

    /// Updates a todo and write-through updates the user's cache.
    pub async fn update_todo(&self, todo: &Todo) -> TaskoraResult<Todo> {
        self.with_user_lease(todo.user_id, || async {
            let prior = self
                .store
                .find_by_id(todo.id)
                .await?
                .filter(|t| t.user_id == todo.user_id)
                .ok_or_else(|| TaskoraError::not_found("Todo", todo.id))?;

            let updated = self.store.update(todo).await?;

            if prior.status != updated.status {
                debug!(
                    todo_id = updated.id,
                    from = %prior.status,
                    to = %updated.status,
                    "Status changed; moving between status indexes"
                );
            }

            if let Err(e) = self.apply_upsert(&updated).await {
                warn!(todo_id = updated.id, error = %e, "Cache update failed after update");
            }
            self.invalidate_query_blobs(updated.user_id).await;

            Ok(updated)
        })
        .await
    }

    /// Updates only a todo's status.
    pub async fn update_todo_status(
        &self,
        todo_id: i64,
        user_id: i64,
        new_status: TodoStatus,
    ) -> TaskoraResult<()> {
        self.with_user_lease(user_id, || async {
            let mut todo = self
                .store
                .find_by_id(todo_id)
                .await?
                .filter(|t| t.user_id == user_id)
                .ok_or_else(|| TaskoraError::not_found("Todo", todo_id))?;

            let old_status = todo.status;
            todo.status = new_status;
            let updated = self.store.update(&todo).await?;

            debug!(
                todo_id,
                from = %old_status,
                to = %new_status,
                "Status changed; moving between status indexes"
            );

            if let Err(e) = self.apply_upsert(&updated).await {
                warn!(todo_id, error = %e, "Cache update failed after status change");
            }
            self.invalidate_query_blobs(user_id).await;

            Ok(())
        })
        .await
    }

    /// Deletes a todo and removes it from the user's cache.
    pub async fn delete_todo(&self, todo_id: i64, user_id: i64) -> TaskoraResult<()> {
        self.with_user_lease(user_id, || async {
            self.store.delete(todo_id, user_id).await?;

            if let Err(e) = self.apply_delete(todo_id, user_id).await {
                warn!(todo_id, error = %e, "Cache removal failed after delete");
            }
            self.invalidate_query_blobs(user_id).await;

            Ok(())
        })
        .await
    }

    /// Runs a write under the per-user lease.
    ///
    /// Lease contention surfaces as `LockUnavailable` and the store is
    /// never touched. If Redis itself is unreachable there is no cache
    /// to protect: the write proceeds unlocked and cache coherence is
    /// restored by TTL expiry and lazy rebuild.
    async fn with_user_lease<T, F, Fut>(&self, user_id: i64, f: F) -> TaskoraResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = TaskoraResult<T>>,
    {
        let lock = RedisLock::new(
            self.pool.clone(),
            &keys::todo_user_lock_resource(user_id),
        );

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
                warn!(user_id, error = %e, "Lease unavailable (Redis down); writing unlocked");
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

    /// Applies a created or updated todo to the point record and every
    /// enumerated index in one pipeline.
    ///
    /// The todo is removed from every index and re-added with a fresh
    /// score to those whose filter it matches, so a status or priority
    /// change moves it between filtered indexes in the same batch.
    async fn apply_upsert(&self, todo: &Todo) -> TaskoraResult<()> {
        let hash_key = keys::todo_hash_key(todo.id);
        let pairs = todo_hash_pairs(todo);

        let mut pipe = redis::pipe();
        pipe.hset_multiple(&hash_key, &pairs).ignore();
        pipe.expire(&hash_key, self.config.hash_ttl_secs as i64)
            .ignore();

        for spec in keys::enumerated_indexes() {
            let index_key = spec.key(todo.user_id);
            pipe.zrem(&index_key, todo.id).ignore();
            if spec.matches(todo) {
                let score = todo_score(todo, &spec.field, spec.direction);
                pipe.zadd(&index_key, todo.id, score).ignore();
                pipe.expire(&index_key, self.config.sorted_set_ttl_secs as i64)
                    .ignore();
            }
        }

        let mut conn = self.conn().await?;
        pipe.query_async::<()>(&mut *conn).await.map_err(|e| {
            TaskoraError::cache(format!("write pipeline failed: {}", e))
        })?;
        Ok(())
    }

    /// Removes a deleted todo from the point record and every index.
    async fn apply_delete(&self, todo_id: i64, user_id: i64) -> TaskoraResult<()> {
        let hash_key = keys::todo_hash_key(todo_id);

        let mut pipe = redis::pipe();
        pipe.del(&hash_key).ignore();
        for index_key in keys::all_index_keys(user_id) {
            pipe.zrem(&index_key, todo_id).ignore();
        }

        let mut conn = self.conn().await?;
        pipe.query_async::<()>(&mut *conn).await.map_err(|e| {
            TaskoraError::cache(format!("delete pipeline failed: {}", e))
        })?;
        Ok(())
    }

    /// Sweeps all of one user's query blobs.
    ///
    /// Failure is logged, never surfaced: the blobs expire within
    /// minutes on their own TTL.
    async fn invalidate_query_blobs(&self, user_id: i64) {
        let pattern = keys::query_blob_pattern(user_id);
        match delete_pattern(&self.pool, &pattern).await {
            Ok(deleted) if deleted > 0 => {
                debug!(user_id, deleted, "Invalidated query blobs");
            }
            Ok(_) => {}
            Err(e) => warn!(user_id, error = %e, "Failed to invalidate query blobs"),
        }
    }

    // ============ Point record helpers ============

    async fn read_hash_record(&self, hash_key: &str) -> TaskoraResult<Option<Todo>> {
        let mut conn = self.conn().await?;
        let fields: HashMap<String, String> = conn.hgetall(hash_key).await.map_err(|e| {
            TaskoraError::cache(format!("Failed to get record '{}': {}", hash_key, e))
        })?;

        if fields.is_empty() {
            return Ok(None);
        }

        parse_todo_hash(hash_key, &fields).map(Some)
    }

    async fn write_hash_record(&self, todo: &Todo) -> TaskoraResult<()> {
        let hash_key = keys::todo_hash_key(todo.id);
        let pairs = todo_hash_pairs(todo);

        let mut conn = self.conn().await?;
        conn.hset_multiple::<_, _, _, ()>(&hash_key, &pairs)
            .await
            .map_err(|e| {
                TaskoraError::cache(format!("Failed to set record '{}': {}", hash_key, e))
            })?;
        conn.expire::<_, ()>(&hash_key, self.config.hash_ttl_secs as i64)
            .await
            .map_err(|e| {
                TaskoraError::cache(format!("Failed to expire record '{}': {}", hash_key, e))
            })?;
        Ok(())
    }

    async fn conn(&self) -> TaskoraResult<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| TaskoraError::cache(format!("redis connection unavailable: {}", e)))
    }
}
