//! Wire codec for single-todo hash records.
//!
//! A point record is a Redis hash of scalar fields with unix-second
//! timestamps. Optional fields are simply absent; parsers tolerate
//! that, but a record missing its identity fields is corrupt.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use taskora_core::{TaskoraError, TaskoraResult, Todo, TodoPriority, TodoStatus};

/// Field pairs for writing a todo into its hash record.
///
/// `description` and `due_date` are omitted when unset so the record
/// mirrors the wire contract of absent optional fields.
#[must_use]
pub fn todo_hash_pairs(todo: &Todo) -> Vec<(&'static str, String)> {
    let mut pairs = vec![
        ("id", todo.id.to_string()),
        ("user_id", todo.user_id.to_string()),
        ("title", todo.title.clone()),
        ("status", todo.status.as_str().to_string()),
        ("priority", todo.priority.as_str().to_string()),
        ("created_at", todo.created_at.timestamp().to_string()),
        ("updated_at", todo.updated_at.timestamp().to_string()),
    ];

    if !todo.description.is_empty() {
        pairs.push(("description", todo.description.clone()));
    }
    if let Some(due) = todo.due_date {
        pairs.push(("due_date", due.timestamp().to_string()));
    }

    pairs
}

/// Parses a todo from its hash record.
///
/// Identity fields (`id`, `user_id`) are required; everything else
/// falls back to defaults when absent. Unparseable fields make the
/// record corrupt.
pub fn parse_todo_hash(key: &str, fields: &HashMap<String, String>) -> TaskoraResult<Todo> {
    if fields.is_empty() {
        return Err(TaskoraError::corrupt_cache(key, "empty hash"));
    }

    let id = required_i64(key, fields, "id")?;
    let user_id = required_i64(key, fields, "user_id")?;

    let status = match fields.get("status") {
        Some(raw) => raw
            .parse::<TodoStatus>()
            .map_err(|e| TaskoraError::corrupt_cache(key, e))?,
        None => TodoStatus::default(),
    };

    let priority = match fields.get("priority") {
        Some(raw) => raw
            .parse::<TodoPriority>()
            .map_err(|e| TaskoraError::corrupt_cache(key, e))?,
        None => TodoPriority::default(),
    };

    Ok(Todo {
        id,
        user_id,
        title: fields.get("title").cloned().unwrap_or_default(),
        description: fields.get("description").cloned().unwrap_or_default(),
        due_date: optional_timestamp(key, fields, "due_date")?,
        status,
        priority,
        created_at: optional_timestamp(key, fields, "created_at")?.unwrap_or(DateTime::UNIX_EPOCH),
        updated_at: optional_timestamp(key, fields, "updated_at")?.unwrap_or(DateTime::UNIX_EPOCH),
    })
}

fn required_i64(key: &str, fields: &HashMap<String, String>, field: &str) -> TaskoraResult<i64> {
    let raw = fields
        .get(field)
        .ok_or_else(|| TaskoraError::corrupt_cache(key, format!("missing field '{}'", field)))?;
    raw.parse::<i64>().map_err(|e| {
        TaskoraError::corrupt_cache(key, format!("failed to parse '{}': {}", field, e))
    })
}

fn optional_timestamp(
    key: &str,
    fields: &HashMap<String, String>,
    field: &str,
) -> TaskoraResult<Option<DateTime<Utc>>> {
    let Some(raw) = fields.get(field).filter(|raw| !raw.is_empty()) else {
        return Ok(None);
    };

    let secs = raw.parse::<i64>().map_err(|e| {
        TaskoraError::corrupt_cache(key, format!("failed to parse '{}': {}", field, e))
    })?;

    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(Some)
        .ok_or_else(|| {
            TaskoraError::corrupt_cache(key, format!("'{}' out of range: {}", field, secs))
        })
}
