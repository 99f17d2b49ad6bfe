//! Todo entity.

use super::super::value_objects::{TodoPriority, TodoStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A todo item owned by a single user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    /// Unique identifier, assigned by the store.
    pub id: i64,

    /// Owning user.
    pub user_id: i64,

    /// Short title.
    pub title: String,

    /// Free-form description.
    #[serde(default)]
    pub description: String,

    /// Optional deadline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,

    /// Lifecycle status.
    pub status: TodoStatus,

    /// Priority.
    pub priority: TodoPriority,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Todo {
    /// Creates a new todo in its initial state.
    #[must_use]
    pub fn new(user_id: i64, title: String, description: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            user_id,
            title,
            description,
            due_date: None,
            status: TodoStatus::NotStarted,
            priority: TodoPriority::Medium,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the due date.
    #[must_use]
    pub fn with_due_date(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: TodoPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Checks if the todo is past its due date.
    #[must_use]
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        matches!(self.due_date, Some(due) if due < now && self.status.is_open())
    }
}
