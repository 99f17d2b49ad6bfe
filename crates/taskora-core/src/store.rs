//! Store contracts the cache layer builds on.
//!
//! The relational store is an external collaborator. These traits define
//! the exact surface the cache engines call; concrete implementations
//! live outside this workspace and tests use in-memory fakes.

use crate::{ListFilter, ListOrder, Tag, TaskoraResult, Todo};
use async_trait::async_trait;

/// Store operations for todos.
///
/// Mutators return `Conflict` for constraint violations and `NotFound`
/// for rows that do not exist (or are not owned by the given user);
/// other failures map to `Database`.
#[async_trait]
pub trait TodoStore: Send + Sync {
    /// Finds a todo by id. Returns `None` if absent or soft-deleted.
    async fn find_by_id(&self, id: i64) -> TaskoraResult<Option<Todo>>;

    /// Finds todos for a user matching the filter, ordered and paged.
    ///
    /// Returns the page of matching todos together with the unpaged
    /// total.
    async fn find_by_user_and_filters(
        &self,
        user_id: i64,
        filter: &ListFilter,
        order: &ListOrder,
        offset: u32,
        limit: u32,
    ) -> TaskoraResult<(Vec<Todo>, i64)>;

    /// Persists a new todo and returns it with its assigned id.
    async fn create(&self, todo: &Todo) -> TaskoraResult<Todo>;

    /// Updates an existing todo and returns the persisted state.
    async fn update(&self, todo: &Todo) -> TaskoraResult<Todo>;

    /// Deletes a todo owned by the given user.
    async fn delete(&self, id: i64, user_id: i64) -> TaskoraResult<()>;
}

/// Store operations for tags.
#[async_trait]
pub trait TagStore: Send + Sync {
    /// Finds a tag by id. Returns `None` if absent.
    async fn find_by_id(&self, id: i64) -> TaskoraResult<Option<Tag>>;

    /// Lists tags ordered by name.
    async fn list(&self, offset: u32, limit: u32) -> TaskoraResult<Vec<Tag>>;

    /// Counts all tags.
    async fn count(&self) -> TaskoraResult<i64>;

    /// Lists the tags used by a user's todos.
    async fn list_by_user(&self, user_id: i64) -> TaskoraResult<Vec<Tag>>;

    /// Persists a new tag and returns it with its assigned id.
    async fn create(&self, tag: &Tag) -> TaskoraResult<Tag>;

    /// Updates an existing tag and returns the persisted state.
    async fn update(&self, tag: &Tag) -> TaskoraResult<Tag>;

    /// Deletes a tag.
    async fn delete(&self, id: i64) -> TaskoraResult<()>;
}
