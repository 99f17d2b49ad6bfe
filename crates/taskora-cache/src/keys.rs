//! Cache key generators for consistent key naming.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use taskora_core::{ListFilter, ListOrder, SortDirection, SortField, Todo, TodoPriority, TodoStatus};

/// Prefix for single-todo hash records.
pub const TODO_HASH_PREFIX: &str = "cache:todo:";

/// Prefix for per-user todo structures (indexes and query blobs).
pub const TODO_USER_PREFIX: &str = "cache:todos:user:";

/// Prefix for single-tag records.
pub const TAG_POINT_PREFIX: &str = "cache:tag:";

/// Prefix for tag list pages.
pub const TAG_LIST_PREFIX: &str = "cache:tags:";

/// Prefix for per-user tag listings.
pub const USER_TAGS_PREFIX: &str = "cache:tags:my-tags:";

/// Lock resource covering all tag caches.
pub const TAGS_LOCK_RESOURCE: &str = "tags:all";

/// Key for a single todo's hash record.
#[must_use]
pub fn todo_hash_key(todo_id: i64) -> String {
    format!("{}{}", TODO_HASH_PREFIX, todo_id)
}

/// Key for the ordered index answering one (user, filter-subset, order)
/// query shape.
#[must_use]
pub fn index_set_key(user_id: i64, filter: &ListFilter, order: &ListOrder) -> String {
    let mut key = format!("{}{}:sorted:", TODO_USER_PREFIX, user_id);

    if let Some(status) = filter.status {
        key.push_str(&format!("status:{}:", status));
    }
    if let Some(priority) = filter.priority {
        key.push_str(&format!("priority:{}:", priority));
    }

    key.push_str(&format!("{}:{}", order.field, order.direction));
    key
}

/// Key for the status-filtered due-date index of one status.
#[must_use]
pub fn status_index_key(user_id: i64, status: TodoStatus) -> String {
    index_set_key(
        user_id,
        &ListFilter::by_status(status),
        &ListOrder::due_date_asc(),
    )
}

/// Lock resource serialising writes to one user's todo cache.
#[must_use]
pub fn todo_user_lock_resource(user_id: i64) -> String {
    format!("todo:user:{}", user_id)
}

/// One entry of the fixed index enumeration kept hot per user.
#[derive(Debug, Clone)]
pub struct IndexSpec {
    /// Status restriction of the index, if any.
    pub status: Option<TodoStatus>,
    /// Priority restriction of the index, if any.
    pub priority: Option<TodoPriority>,
    /// Sort field.
    pub field: SortField,
    /// Sort direction.
    pub direction: SortDirection,
}

impl IndexSpec {
    fn new(
        status: Option<TodoStatus>,
        priority: Option<TodoPriority>,
        field: SortField,
        direction: SortDirection,
    ) -> Self {
        Self {
            status,
            priority,
            field,
            direction,
        }
    }

    /// The filter this index answers.
    #[must_use]
    pub fn filter(&self) -> ListFilter {
        ListFilter {
            status: self.status,
            priority: self.priority,
            ..ListFilter::default()
        }
    }

    /// The ordering this index answers.
    #[must_use]
    pub fn order(&self) -> ListOrder {
        ListOrder::new(self.field.clone(), self.direction)
    }

    /// The Redis key of this index for one user.
    #[must_use]
    pub fn key(&self, user_id: i64) -> String {
        index_set_key(user_id, &self.filter(), &self.order())
    }

    /// Checks if a todo belongs in this index.
    #[must_use]
    pub fn matches(&self, todo: &Todo) -> bool {
        self.status.map_or(true, |s| todo.status == s)
            && self.priority.map_or(true, |p| todo.priority == p)
    }
}

/// The fixed set of indexes maintained per user.
///
/// Not a cross-product over all filter combinations; this is the subset
/// judged worth keeping hot. Everything else is answered by query blobs.
#[must_use]
pub fn enumerated_indexes() -> Vec<IndexSpec> {
    vec![
        IndexSpec::new(None, None, SortField::DueDate, SortDirection::Asc),
        IndexSpec::new(None, None, SortField::DueDate, SortDirection::Desc),
        IndexSpec::new(None, None, SortField::CreatedAt, SortDirection::Desc),
        IndexSpec::new(None, None, SortField::Title, SortDirection::Asc),
        IndexSpec::new(
            Some(TodoStatus::NotStarted),
            None,
            SortField::DueDate,
            SortDirection::Asc,
        ),
        IndexSpec::new(
            Some(TodoStatus::InProgress),
            None,
            SortField::DueDate,
            SortDirection::Asc,
        ),
        IndexSpec::new(
            Some(TodoStatus::Completed),
            None,
            SortField::DueDate,
            SortDirection::Asc,
        ),
        IndexSpec::new(
            None,
            Some(TodoPriority::High),
            SortField::DueDate,
            SortDirection::Asc,
        ),
    ]
}

/// All index keys for one user, for bulk removal.
#[must_use]
pub fn all_index_keys(user_id: i64) -> Vec<String> {
    enumerated_indexes()
        .iter()
        .map(|spec| spec.key(user_id))
        .collect()
}

/// Decides whether a query is answered by an ordered index or by a
/// fingerprinted result blob.
///
/// Only the enumerated index shapes take the index path; they are the
/// ones writes keep maintained. Everything else (date ranges,
/// free-text search, combined status+priority filters, non-indexable
/// sort fields, and orderings with no enumerated index) goes to the
/// blob path, which write invalidation sweeps.
#[must_use]
pub fn uses_index_path(filter: &ListFilter, order: &ListOrder) -> bool {
    if filter.has_date_range() || filter.has_search() {
        return false;
    }

    enumerated_indexes().iter().any(|spec| {
        spec.status == filter.status
            && spec.priority == filter.priority
            && spec.field == order.field
            && spec.direction == order.direction
    })
}

/// Canonical form of a list query, fingerprinted for blob keys.
///
/// Field order is fixed by declaration, optional values serialize as
/// null, timestamps as unix seconds and enums as their wire strings, so
/// the digest is stable across processes and equivalent parameter
/// orderings.
#[derive(Serialize)]
struct QueryCanonical<'a> {
    user_id: i64,
    status: Option<&'a str>,
    priority: Option<&'a str>,
    search: &'a str,
    due_from: Option<i64>,
    due_to: Option<i64>,
    sort_by: &'a str,
    sort_order: &'a str,
    page: u32,
    limit: u32,
}

fn unix_seconds(ts: Option<DateTime<Utc>>) -> Option<i64> {
    ts.map(|t| t.timestamp())
}

/// Deterministic fingerprint of a list query.
#[must_use]
pub fn query_fingerprint(
    user_id: i64,
    filter: &ListFilter,
    order: &ListOrder,
    page: u32,
    limit: u32,
) -> String {
    let canonical = QueryCanonical {
        user_id,
        status: filter.status.map(|s| s.as_str()),
        priority: filter.priority.map(|p| p.as_str()),
        search: &filter.search,
        due_from: unix_seconds(filter.due_from),
        due_to: unix_seconds(filter.due_to),
        sort_by: order.field.as_str(),
        sort_order: order.direction.as_str(),
        page,
        limit,
    };

    // Struct serialization order is declaration order; the canonical
    // JSON is total.
    let json = serde_json::to_string(&canonical).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    hex::encode(hasher.finalize())
}

/// Key for a complex-query result blob.
#[must_use]
pub fn query_blob_key(
    user_id: i64,
    filter: &ListFilter,
    order: &ListOrder,
    page: u32,
    limit: u32,
) -> String {
    format!(
        "{}{}:query:{}",
        TODO_USER_PREFIX,
        user_id,
        query_fingerprint(user_id, filter, order, page, limit)
    )
}

/// Pattern matching all of one user's query blobs.
#[must_use]
pub fn query_blob_pattern(user_id: i64) -> String {
    format!("{}{}:query:*", TODO_USER_PREFIX, user_id)
}

/// Key for a single tag record.
#[must_use]
pub fn tag_point_key(tag_id: i64) -> String {
    format!("{}{}", TAG_POINT_PREFIX, tag_id)
}

/// Key for one page of the tag listing.
#[must_use]
pub fn tag_list_key(page: u32, limit: u32) -> String {
    format!("{}page:{}:limit:{}", TAG_LIST_PREFIX, page, limit)
}

/// Pattern matching all tag list pages.
#[must_use]
pub fn tag_list_pattern() -> String {
    format!("{}page:*:limit:*", TAG_LIST_PREFIX)
}

/// Key for one user's tag listing.
#[must_use]
pub fn user_tags_key(user_id: i64) -> String {
    format!("{}{}", USER_TAGS_PREFIX, user_id)
}

/// Pattern matching all per-user tag listings.
#[must_use]
pub fn user_tags_pattern() -> String {
    format!("{}*", USER_TAGS_PREFIX)
}
