//! Integration tests for the todo cache engine.
//!
//! These tests run against a real Redis using testcontainers and
//! require Docker. The store side is an in-memory counting fake.

mod common;

use chrono::{TimeZone, Utc};
use common::{dead_pool, FakeTodoStore, TestRedis};
use redis::AsyncCommands;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use taskora_core::{
    ListFilter, ListOrder, PageRequest, TaskoraError, Todo, TodoPriority, TodoStatus,
};
use taskora_cache::{CacheConfig, TodoCache};

fn make_todo(id: i64, user_id: i64, title: &str, due: Option<(i32, u32, u32)>) -> Todo {
    let mut todo = Todo::new(user_id, title.to_string(), String::new());
    todo.id = id;
    todo.due_date = due.map(|(y, m, d)| Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap());
    todo.created_at = Utc.with_ymd_and_hms(2024, 12, 1, 8, 0, 0).unwrap()
        + chrono::Duration::minutes(id);
    todo.updated_at = todo.created_at;
    todo
}

fn seeded_store() -> Arc<FakeTodoStore> {
    let store = Arc::new(FakeTodoStore::new());
    store.seed(make_todo(101, 7, "file taxes", Some((2025, 1, 1))));
    store.seed(make_todo(102, 7, "book flights", Some((2025, 1, 3))));
    store.seed(make_todo(103, 7, "clean garage", None));
    store
}

fn ids(page: &taskora_core::Page<Todo>) -> Vec<i64> {
    page.data.iter().map(|t| t.id).collect()
}

#[tokio::test]
async fn test_cold_read_then_warm_read() {
    let redis = TestRedis::new().await;
    let store = seeded_store();
    let cache = TodoCache::new(redis.pool(), store.clone(), CacheConfig::default());

    let page = cache
        .list_todos(
            7,
            &ListFilter::default(),
            &ListOrder::due_date_asc(),
            PageRequest::new(1, 10),
        )
        .await
        .unwrap();

    // Undated todo 103 sorts last ascending.
    assert_eq!(ids(&page), vec![101, 102, 103]);
    assert_eq!(page.total, 3);
    assert_eq!(store.filter_calls.load(Ordering::SeqCst), 1);

    // Warm read: served from the index, the store is not consulted
    // again.
    let again = cache
        .list_todos(
            7,
            &ListFilter::default(),
            &ListOrder::due_date_asc(),
            PageRequest::new(1, 10),
        )
        .await
        .unwrap();
    assert_eq!(ids(&again), vec![101, 102, 103]);
    assert_eq!(store.filter_calls.load(Ordering::SeqCst), 1);

    let mut conn = redis.pool().get().await.unwrap();
    let cardinality: i64 = conn
        .zcard("cache:todos:user:7:sorted:due_date:asc")
        .await
        .unwrap();
    assert_eq!(cardinality, 3);
}

#[tokio::test]
async fn test_null_due_date_sorts_first_descending() {
    let redis = TestRedis::new().await;
    let store = seeded_store();
    let cache = TodoCache::new(redis.pool(), store, CacheConfig::default());

    let order = ListOrder::new(
        taskora_core::SortField::DueDate,
        taskora_core::SortDirection::Desc,
    );
    let page = cache
        .list_todos(7, &ListFilter::default(), &order, PageRequest::new(1, 10))
        .await
        .unwrap();

    assert_eq!(ids(&page), vec![103, 102, 101]);
}

#[tokio::test]
async fn test_status_change_moves_between_indexes() {
    let redis = TestRedis::new().await;
    let store = seeded_store();
    store.seed(make_todo(42, 7, "draft review", Some((2025, 2, 1))));
    let cache = TodoCache::new(redis.pool(), store.clone(), CacheConfig::default());

    cache
        .update_todo_status(42, 7, TodoStatus::InProgress)
        .await
        .unwrap();

    let mut conn = redis.pool().get().await.unwrap();
    let old_score: Option<f64> = conn
        .zscore("cache:todos:user:7:sorted:status:not_started:due_date:asc", 42)
        .await
        .unwrap();
    let new_score: Option<f64> = conn
        .zscore("cache:todos:user:7:sorted:status:in_progress:due_date:asc", 42)
        .await
        .unwrap();

    assert!(old_score.is_none());
    assert!(new_score.is_some());
    assert_eq!(store.get(42).unwrap().status, TodoStatus::InProgress);
}

#[tokio::test]
async fn test_blob_invalidation_on_create() {
    let redis = TestRedis::new().await;
    let store = seeded_store();
    let cache = TodoCache::new(redis.pool(), store, CacheConfig::default());

    // Seed three blob entries for the user, plus one for a bystander.
    let mut conn = redis.pool().get().await.unwrap();
    for fingerprint in ["aaa", "bbb", "ccc"] {
        let key = format!("cache:todos:user:7:query:{}", fingerprint);
        conn.set::<_, _, ()>(&key, "{}").await.unwrap();
    }
    conn.set::<_, _, ()>("cache:todos:user:8:query:ddd", "{}")
        .await
        .unwrap();
    drop(conn);

    let todo = Todo::new(7, "new item".to_string(), String::new());
    let created = cache.create_todo(&todo).await.unwrap();
    assert!(created.id > 0);

    let mut conn = redis.pool().get().await.unwrap();
    for fingerprint in ["aaa", "bbb", "ccc"] {
        let key = format!("cache:todos:user:7:query:{}", fingerprint);
        let exists: bool = conn.exists(&key).await.unwrap();
        assert!(!exists, "blob {} should be swept", key);
    }
    let bystander: bool = conn.exists("cache:todos:user:8:query:ddd").await.unwrap();
    assert!(bystander, "other users' blobs are untouched");
    drop(conn);

    // The new todo is immediately discoverable.
    let fetched = cache.get_todo(created.id).await.unwrap();
    assert_eq!(fetched.title, "new item");
}

#[tokio::test]
async fn test_redis_down_reads_degrade_to_store() {
    let store = seeded_store();
    let cache = TodoCache::new(dead_pool(), store.clone(), CacheConfig::default());

    let page = cache
        .list_todos(
            7,
            &ListFilter::default(),
            &ListOrder::due_date_asc(),
            PageRequest::new(1, 10),
        )
        .await
        .unwrap();
    assert_eq!(ids(&page), vec![101, 102, 103]);

    let todo = cache.get_todo(101).await.unwrap();
    assert_eq!(todo.title, "file taxes");
}

#[tokio::test]
async fn test_redis_down_write_still_succeeds() {
    let store = seeded_store();
    let cache = TodoCache::new(dead_pool(), store.clone(), CacheConfig::default());

    let todo = Todo::new(7, "offline write".to_string(), String::new());
    let created = cache.create_todo(&todo).await.unwrap();

    assert!(created.id > 0);
    assert_eq!(store.get(created.id).unwrap().title, "offline write");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_singleflight_collapses_point_reads() {
    let redis = TestRedis::new().await;
    let store = Arc::new(FakeTodoStore::with_delay(Duration::from_millis(300)));
    store.seed(make_todo(999, 7, "hot todo", None));
    let cache = Arc::new(TodoCache::new(
        redis.pool(),
        store.clone(),
        CacheConfig::default(),
    ));

    let mut handles = Vec::new();
    for _ in 0..100 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move { cache.get_todo(999).await }));
    }

    for handle in handles {
        let todo = handle.await.unwrap().unwrap();
        assert_eq!(todo.id, 999);
        assert_eq!(todo.title, "hot todo");
    }

    assert_eq!(store.find_by_id_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_singleflight_collapses_list_rebuild() {
    let redis = TestRedis::new().await;
    let store = Arc::new(FakeTodoStore::with_delay(Duration::from_millis(300)));
    store.seed(make_todo(101, 7, "file taxes", Some((2025, 1, 1))));
    store.seed(make_todo(102, 7, "book flights", Some((2025, 1, 3))));
    let cache = Arc::new(TodoCache::new(
        redis.pool(),
        store.clone(),
        CacheConfig::default(),
    ));

    let mut handles = Vec::new();
    for _ in 0..20 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            cache
                .list_todos(
                    7,
                    &ListFilter::default(),
                    &ListOrder::due_date_asc(),
                    PageRequest::new(1, 10),
                )
                .await
        }));
    }

    for handle in handles {
        let page = handle.await.unwrap().unwrap();
        assert_eq!(ids(&page), vec![101, 102]);
    }

    // All concurrent cold reads share one rebuild scan.
    assert_eq!(store.filter_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rebuild_is_idempotent() {
    let redis = TestRedis::new().await;
    let store = seeded_store();
    let cache = TodoCache::new(redis.pool(), store, CacheConfig::default());
    let index_key = "cache:todos:user:7:sorted:due_date:asc";

    let list = || async {
        cache
            .list_todos(
                7,
                &ListFilter::default(),
                &ListOrder::due_date_asc(),
                PageRequest::new(1, 10),
            )
            .await
            .unwrap()
    };

    list().await;
    let mut conn = redis.pool().get().await.unwrap();
    let first: Vec<(String, f64)> = conn.zrange_withscores(index_key, 0, -1).await.unwrap();

    // Drop the index and rebuild from scratch.
    conn.del::<_, ()>(index_key).await.unwrap();
    drop(conn);

    list().await;
    let mut conn = redis.pool().get().await.unwrap();
    let second: Vec<(String, f64)> = conn.zrange_withscores(index_key, 0, -1).await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_read_your_write() {
    let redis = TestRedis::new().await;
    let store = seeded_store();
    let cache = TodoCache::new(redis.pool(), store, CacheConfig::default());

    // Warm the index first so the write must maintain it in place.
    cache
        .list_todos(
            7,
            &ListFilter::default(),
            &ListOrder::due_date_asc(),
            PageRequest::new(1, 10),
        )
        .await
        .unwrap();

    let todo = make_todo(0, 7, "urgent errand", Some((2024, 12, 25)));
    let created = cache.create_todo(&todo).await.unwrap();

    let page = cache
        .list_todos(
            7,
            &ListFilter::default(),
            &ListOrder::due_date_asc(),
            PageRequest::new(1, 10),
        )
        .await
        .unwrap();

    // Earliest due date, so it leads the page.
    assert_eq!(ids(&page), vec![created.id, 101, 102, 103]);
    assert_eq!(page.total, 4);
}

#[tokio::test]
async fn test_delete_removes_point_and_index_members() {
    let redis = TestRedis::new().await;
    let store = seeded_store();
    let cache = TodoCache::new(redis.pool(), store, CacheConfig::default());

    // Warm caches.
    cache
        .list_todos(
            7,
            &ListFilter::default(),
            &ListOrder::due_date_asc(),
            PageRequest::new(1, 10),
        )
        .await
        .unwrap();
    cache.get_todo(102).await.unwrap();

    cache.delete_todo(102, 7).await.unwrap();

    let page = cache
        .list_todos(
            7,
            &ListFilter::default(),
            &ListOrder::due_date_asc(),
            PageRequest::new(1, 10),
        )
        .await
        .unwrap();
    assert_eq!(ids(&page), vec![101, 103]);

    let mut conn = redis.pool().get().await.unwrap();
    let record_exists: bool = conn.exists("cache:todo:102").await.unwrap();
    assert!(!record_exists);
    let score: Option<f64> = conn
        .zscore("cache:todos:user:7:sorted:due_date:asc", 102)
        .await
        .unwrap();
    assert!(score.is_none());

    let missing = cache.get_todo(102).await.unwrap_err();
    assert!(matches!(missing, TaskoraError::NotFound { .. }));
}

#[tokio::test]
async fn test_blob_path_serves_complex_queries() {
    let redis = TestRedis::new().await;
    let store = seeded_store();
    let cache = TodoCache::new(redis.pool(), store.clone(), CacheConfig::default());

    let filter = ListFilter {
        search: "flights".to_string(),
        ..ListFilter::default()
    };

    let page = cache
        .list_todos(7, &filter, &ListOrder::due_date_asc(), PageRequest::new(1, 10))
        .await
        .unwrap();
    assert_eq!(ids(&page), vec![102]);
    assert_eq!(store.filter_calls.load(Ordering::SeqCst), 1);

    // Second read is served from the blob.
    let again = cache
        .list_todos(7, &filter, &ListOrder::due_date_asc(), PageRequest::new(1, 10))
        .await
        .unwrap();
    assert_eq!(ids(&again), vec![102]);
    assert_eq!(store.filter_calls.load(Ordering::SeqCst), 1);

    // No ordered index was materialised for the search query.
    let mut conn = redis.pool().get().await.unwrap();
    let keys: Vec<String> = redis::cmd("KEYS")
        .arg("cache:todos:user:7:sorted:*")
        .query_async(&mut *conn)
        .await
        .unwrap();
    assert!(keys.is_empty());
}

#[tokio::test]
async fn test_status_plus_priority_goes_through_blob_path() {
    let redis = TestRedis::new().await;
    let store = seeded_store();
    let mut urgent = make_todo(104, 7, "pay invoice", Some((2025, 1, 2)));
    urgent.priority = TodoPriority::High;
    store.seed(urgent);
    let cache = TodoCache::new(redis.pool(), store, CacheConfig::default());

    let filter = ListFilter {
        status: Some(TodoStatus::NotStarted),
        priority: Some(TodoPriority::High),
        ..ListFilter::default()
    };

    let page = cache
        .list_todos(7, &filter, &ListOrder::due_date_asc(), PageRequest::new(1, 10))
        .await
        .unwrap();
    assert_eq!(ids(&page), vec![104]);

    let mut conn = redis.pool().get().await.unwrap();
    let blobs: Vec<String> = redis::cmd("KEYS")
        .arg("cache:todos:user:7:query:*")
        .query_async(&mut *conn)
        .await
        .unwrap();
    assert_eq!(blobs.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writes_serialise_and_both_land() {
    let redis = TestRedis::new().await;
    let store = seeded_store();
    let cache = Arc::new(TodoCache::new(
        redis.pool(),
        store.clone(),
        CacheConfig::default(),
    ));

    let mut first = store.get(101).unwrap();
    first.title = "updated by writer A".to_string();
    let mut second = store.get(101).unwrap();
    second.priority = TodoPriority::High;

    let a = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.update_todo(&first).await })
    };
    let b = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.update_todo(&second).await })
    };

    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    // Whatever order the lease granted, the cached record equals the
    // store's final state.
    let stored = store.get(101).unwrap();
    let cached = cache.get_todo(101).await.unwrap();
    assert_eq!(cached, stored);
}

#[tokio::test]
async fn test_update_of_foreign_todo_is_not_found() {
    let redis = TestRedis::new().await;
    let store = seeded_store();
    let cache = TodoCache::new(redis.pool(), store.clone(), CacheConfig::default());

    let mut foreign = store.get(101).unwrap();
    foreign.user_id = 8;

    let err = cache.update_todo(&foreign).await.unwrap_err();
    assert!(matches!(err, TaskoraError::NotFound { .. }));
}
