//! List query types: filters and ordering.

use crate::{TodoPriority, TodoStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Filter parameters for todo list queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListFilter {
    /// Restrict to a single status.
    #[serde(default)]
    pub status: Option<TodoStatus>,

    /// Restrict to a single priority.
    #[serde(default)]
    pub priority: Option<TodoPriority>,

    /// Free-text search over title and description. Empty means unset.
    #[serde(default)]
    pub search: String,

    /// Lower bound (inclusive) on the due date.
    #[serde(default)]
    pub due_from: Option<DateTime<Utc>>,

    /// Upper bound (inclusive) on the due date.
    #[serde(default)]
    pub due_to: Option<DateTime<Utc>>,
}

impl ListFilter {
    /// A filter with only a status restriction.
    #[must_use]
    pub fn by_status(status: TodoStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// A filter with only a priority restriction.
    #[must_use]
    pub fn by_priority(priority: TodoPriority) -> Self {
        Self {
            priority: Some(priority),
            ..Self::default()
        }
    }

    /// Checks if a due-date bound is set.
    #[must_use]
    pub const fn has_date_range(&self) -> bool {
        self.due_from.is_some() || self.due_to.is_some()
    }

    /// Checks if a free-text search is set.
    #[must_use]
    pub fn has_search(&self) -> bool {
        !self.search.is_empty()
    }
}

/// Field a todo list can be sorted by.
///
/// Unknown fields arriving from the API are preserved as [`SortField::Other`]
/// so callers can still fingerprint and forward them to the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SortField {
    /// Sort by due date.
    DueDate,
    /// Sort by creation time.
    CreatedAt,
    /// Sort by title.
    Title,
    /// A sort field the cache does not index.
    Other(String),
}

impl SortField {
    /// Returns the wire representation used in cache keys.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::DueDate => "due_date",
            Self::CreatedAt => "created_at",
            Self::Title => "title",
            Self::Other(s) => s,
        }
    }

    /// Checks if the cache maintains ordered indexes for this field.
    #[must_use]
    pub const fn is_indexable(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<String> for SortField {
    fn from(s: String) -> Self {
        match s.as_str() {
            "due_date" => Self::DueDate,
            "created_at" => Self::CreatedAt,
            "title" => Self::Title,
            _ => Self::Other(s),
        }
    }
}

impl From<SortField> for String {
    fn from(field: SortField) -> Self {
        field.as_str().to_string()
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl SortDirection {
    /// Returns the wire representation used in cache keys.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested ordering for a todo list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListOrder {
    /// Field to sort by.
    pub field: SortField,
    /// Direction to sort in.
    pub direction: SortDirection,
}

impl ListOrder {
    /// Creates a new ordering.
    #[must_use]
    pub const fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    /// Due date ascending, the most common list view.
    #[must_use]
    pub const fn due_date_asc() -> Self {
        Self::new(SortField::DueDate, SortDirection::Asc)
    }

    /// Creation time descending, the fallback ordering.
    #[must_use]
    pub const fn created_at_desc() -> Self {
        Self::new(SortField::CreatedAt, SortDirection::Desc)
    }
}

impl Default for ListOrder {
    fn default() -> Self {
        Self::created_at_desc()
    }
}
