//! Shared fixtures for the cache integration tests: a containerised
//! Redis (Docker required) and in-memory stores that count their
//! calls so coalescing can be asserted.

use async_trait::async_trait;
use deadpool_redis::Pool;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::time::Duration;
use taskora_core::{
    ListFilter, ListOrder, SortDirection, SortField, Tag, TagStore, TaskoraError, TaskoraResult,
    Todo, TodoStore,
};
use taskora_cache::{create_pool, RedisConfig};
use testcontainers::{runners::AsyncRunner, ContainerAsync};
use testcontainers_modules::redis::Redis;

/// A throwaway Redis for one test, alive as long as this handle.
pub struct TestRedis {
    _container: ContainerAsync<Redis>,
    pool: Pool,
}

impl TestRedis {
    /// Starts a fresh Redis container and connects a pool to it.
    pub async fn new() -> Self {
        let container = Redis::default()
            .start()
            .await
            .expect("redis container did not start (is Docker running?)");

        let port = container
            .get_host_port_ipv4(6379)
            .await
            .expect("redis container exposed no mapped port");

        let config = RedisConfig {
            url: format!("redis://127.0.0.1:{}", port),
            ..RedisConfig::default()
        };

        let pool = create_pool(&config)
            .await
            .expect("pool could not reach the redis container");

        Self {
            _container: container,
            pool,
        }
    }

    /// Returns the connection pool.
    pub fn pool(&self) -> Pool {
        self.pool.clone()
    }
}

/// A pool pointing at a port nothing listens on, for outage tests.
pub fn dead_pool() -> Pool {
    deadpool_redis::Config::from_url("redis://127.0.0.1:1")
        .builder()
        .expect("valid config")
        .max_size(2)
        .runtime(deadpool_redis::Runtime::Tokio1)
        .build()
        .expect("pool builds without connecting")
}

/// In-memory todo store that counts its calls.
#[derive(Default)]
pub struct FakeTodoStore {
    todos: Mutex<HashMap<i64, Todo>>,
    next_id: AtomicI64,
    delay: Option<Duration>,

    pub find_by_id_calls: AtomicU32,
    pub filter_calls: AtomicU32,
}

impl FakeTodoStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    /// A store whose reads take `delay`, to widen coalescing windows.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            next_id: AtomicI64::new(1),
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Inserts a todo directly, keeping its id.
    pub fn seed(&self, todo: Todo) {
        let id = todo.id;
        self.todos.lock().insert(id, todo);
        let next = self.next_id.load(Ordering::SeqCst).max(id + 1);
        self.next_id.store(next, Ordering::SeqCst);
    }

    pub fn get(&self, id: i64) -> Option<Todo> {
        self.todos.lock().get(&id).cloned()
    }

    async fn simulate_latency(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn matches(todo: &Todo, user_id: i64, filter: &ListFilter) -> bool {
        if todo.user_id != user_id {
            return false;
        }
        if let Some(status) = filter.status {
            if todo.status != status {
                return false;
            }
        }
        if let Some(priority) = filter.priority {
            if todo.priority != priority {
                return false;
            }
        }
        if filter.has_search() {
            let needle = filter.search.to_lowercase();
            if !todo.title.to_lowercase().contains(&needle)
                && !todo.description.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if filter.has_date_range() {
            let Some(due) = todo.due_date else {
                return false;
            };
            if matches!(filter.due_from, Some(from) if due < from) {
                return false;
            }
            if matches!(filter.due_to, Some(to) if due > to) {
                return false;
            }
        }
        true
    }

    fn sort(todos: &mut [Todo], order: &ListOrder) {
        // Undated todos use the max sentinel: last ascending, first
        // descending.
        let due_key = |t: &Todo| t.due_date.map_or(i64::MAX, |d| d.timestamp());

        match &order.field {
            SortField::DueDate => todos.sort_by_key(due_key),
            SortField::Title => todos.sort_by(|a, b| a.title.cmp(&b.title)),
            SortField::CreatedAt | SortField::Other(_) => {
                todos.sort_by_key(|t| t.created_at.timestamp());
            }
        }

        let effective_direction = match order.field {
            SortField::Other(_) => SortDirection::Desc,
            _ => order.direction,
        };
        if effective_direction == SortDirection::Desc {
            todos.reverse();
        }
    }
}

#[async_trait]
impl TodoStore for FakeTodoStore {
    async fn find_by_id(&self, id: i64) -> TaskoraResult<Option<Todo>> {
        self.find_by_id_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        Ok(self.todos.lock().get(&id).cloned())
    }

    async fn find_by_user_and_filters(
        &self,
        user_id: i64,
        filter: &ListFilter,
        order: &ListOrder,
        offset: u32,
        limit: u32,
    ) -> TaskoraResult<(Vec<Todo>, i64)> {
        self.filter_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        let mut matching: Vec<Todo> = self
            .todos
            .lock()
            .values()
            .filter(|t| Self::matches(t, user_id, filter))
            .cloned()
            .collect();
        Self::sort(&mut matching, order);

        let total = matching.len() as i64;
        let page: Vec<Todo> = matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();

        Ok((page, total))
    }

    async fn create(&self, todo: &Todo) -> TaskoraResult<Todo> {
        let mut created = todo.clone();
        created.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.todos.lock().insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, todo: &Todo) -> TaskoraResult<Todo> {
        let mut todos = self.todos.lock();
        if !todos.contains_key(&todo.id) {
            return Err(TaskoraError::not_found("Todo", todo.id));
        }
        todos.insert(todo.id, todo.clone());
        Ok(todo.clone())
    }

    async fn delete(&self, id: i64, user_id: i64) -> TaskoraResult<()> {
        let mut todos = self.todos.lock();
        match todos.get(&id) {
            Some(todo) if todo.user_id == user_id => {
                todos.remove(&id);
                Ok(())
            }
            _ => Err(TaskoraError::not_found("Todo", id)),
        }
    }
}

/// In-memory tag store that counts its calls.
#[derive(Default)]
pub struct FakeTagStore {
    tags: Mutex<HashMap<i64, Tag>>,
    user_tags: Mutex<HashMap<i64, Vec<i64>>>,
    next_id: AtomicI64,
    delay: Option<Duration>,

    pub find_by_id_calls: AtomicU32,
    pub list_calls: AtomicU32,
}

impl FakeTagStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            next_id: AtomicI64::new(1),
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn seed(&self, tag: Tag) {
        let id = tag.id;
        self.tags.lock().insert(id, tag);
        let next = self.next_id.load(Ordering::SeqCst).max(id + 1);
        self.next_id.store(next, Ordering::SeqCst);
    }

    pub fn assign(&self, user_id: i64, tag_ids: Vec<i64>) {
        self.user_tags.lock().insert(user_id, tag_ids);
    }

    async fn simulate_latency(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn sorted_tags(&self) -> Vec<Tag> {
        let mut tags: Vec<Tag> = self.tags.lock().values().cloned().collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        tags
    }
}

#[async_trait]
impl TagStore for FakeTagStore {
    async fn find_by_id(&self, id: i64) -> TaskoraResult<Option<Tag>> {
        self.find_by_id_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        Ok(self.tags.lock().get(&id).cloned())
    }

    async fn list(&self, offset: u32, limit: u32) -> TaskoraResult<Vec<Tag>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        Ok(self
            .sorted_tags()
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count(&self) -> TaskoraResult<i64> {
        Ok(self.tags.lock().len() as i64)
    }

    async fn list_by_user(&self, user_id: i64) -> TaskoraResult<Vec<Tag>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        let ids = self.user_tags.lock().get(&user_id).cloned().unwrap_or_default();
        let tags = self.tags.lock();
        Ok(ids.iter().filter_map(|id| tags.get(id).cloned()).collect())
    }

    async fn create(&self, tag: &Tag) -> TaskoraResult<Tag> {
        let mut created = tag.clone();
        created.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.tags.lock().insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, tag: &Tag) -> TaskoraResult<Tag> {
        let mut tags = self.tags.lock();
        if !tags.contains_key(&tag.id) {
            return Err(TaskoraError::not_found("Tag", tag.id));
        }
        tags.insert(tag.id, tag.clone());
        Ok(tag.clone())
    }

    async fn delete(&self, id: i64) -> TaskoraResult<()> {
        if self.tags.lock().remove(&id).is_none() {
            return Err(TaskoraError::not_found("Tag", id));
        }
        Ok(())
    }
}
