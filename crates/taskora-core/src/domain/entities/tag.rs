//! Tag entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A label that can be attached to todos. Tag names are unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    /// Unique identifier, assigned by the store.
    pub id: i64,

    /// Unique tag name.
    pub name: String,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Tag {
    /// Creates a new tag.
    #[must_use]
    pub fn new(name: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name,
            created_at: now,
            updated_at: now,
        }
    }
}
