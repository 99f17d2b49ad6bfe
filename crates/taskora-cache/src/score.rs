//! Score functions for the ordered indexes.
//!
//! A score is a pure function of a todo's fields and the requested
//! ordering, so recomputation is idempotent and two processes always
//! agree on index placement.

use chrono::{DateTime, Utc};
use taskora_core::{SortDirection, SortField, Todo};
use xxhash_rust::xxh32::xxh32;

/// Computes the index score of a todo under one ordering.
///
/// Unknown sort fields fall back to creation time descending.
#[must_use]
pub fn todo_score(todo: &Todo, field: &SortField, direction: SortDirection) -> f64 {
    match field {
        SortField::DueDate => due_date_score(todo.due_date, direction),
        SortField::CreatedAt => created_at_score(todo.created_at, direction),
        SortField::Title => title_score(&todo.title),
        SortField::Other(_) => created_at_score(todo.created_at, SortDirection::Desc),
    }
}

/// Score for due-date ordering.
///
/// Todos without a due date sort last ascending and first descending,
/// expressed with the infinity sentinels.
fn due_date_score(due_date: Option<DateTime<Utc>>, direction: SortDirection) -> f64 {
    let Some(due) = due_date else {
        return match direction {
            SortDirection::Asc => f64::INFINITY,
            SortDirection::Desc => f64::NEG_INFINITY,
        };
    };

    let timestamp = due.timestamp() as f64;
    match direction {
        SortDirection::Asc => timestamp,
        SortDirection::Desc => -timestamp,
    }
}

/// Score for creation-time ordering.
fn created_at_score(created_at: DateTime<Utc>, direction: SortDirection) -> f64 {
    let timestamp = created_at.timestamp() as f64;
    match direction {
        SortDirection::Asc => timestamp,
        SortDirection::Desc => -timestamp,
    }
}

/// Score for title ordering.
///
/// A stable 32-bit hash lifted to float. Collisions are permitted; the
/// tie-break within a collision group is unspecified.
fn title_score(title: &str) -> f64 {
    f64::from(xxh32(title.as_bytes(), 0))
}
