//! Owner-scoped persistence contracts for tasks and categories.
//!
//! Every read and write takes the owner id; an id belonging to another owner
//! behaves exactly like a missing one.

pub mod memory;
pub mod mongo;

use async_trait::async_trait;

use chrono::{DateTime, Utc};

use crate::error::ServiceResult;
use crate::models::{Category, Task, TaskChanges, TaskFilter};

#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Tasks matching `filter`, newest first.
    async fn find(&self, owner_id: &str, filter: &TaskFilter) -> ServiceResult<Vec<Task>>;

    async fn find_one(&self, id: &str, owner_id: &str) -> ServiceResult<Option<Task>>;

    async fn insert(&self, task: Task) -> ServiceResult<Task>;

    /// Applies `changes` in one atomic write and returns the task as stored
    /// afterwards, or `None` if it no longer exists. Fields not named by
    /// `changes` are never written.
    async fn update(
        &self,
        id: &str,
        owner_id: &str,
        changes: &TaskChanges,
    ) -> ServiceResult<Option<Task>>;

    /// Removes one attachment in one atomic write. `None` if the task or
    /// the attachment is gone.
    async fn pull_attachment(
        &self,
        id: &str,
        owner_id: &str,
        attachment_id: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<Option<Task>>;

    async fn delete(&self, id: &str, owner_id: &str) -> ServiceResult<bool>;

    /// Clears `category_id` on every task of `owner_id` pointing at
    /// `category_id` in one bulk write. Returns the number of tasks touched.
    async fn clear_category(&self, category_id: &str, owner_id: &str) -> ServiceResult<u64>;
}

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// All categories of `owner_id`, sorted by name.
    async fn find(&self, owner_id: &str) -> ServiceResult<Vec<Category>>;

    async fn find_one(&self, id: &str, owner_id: &str) -> ServiceResult<Option<Category>>;

    /// Case-insensitive name lookup, optionally ignoring one category id.
    async fn find_by_name_ci(
        &self,
        name: &str,
        owner_id: &str,
        exclude_id: Option<&str>,
    ) -> ServiceResult<Option<Category>>;

    /// Fails with `DuplicateName` if the owner already has a category of
    /// that name (ignoring case). The check and the write are atomic.
    async fn insert(&self, category: Category) -> ServiceResult<Category>;

    /// Same uniqueness rule as `insert`. `None` if the category is gone.
    async fn replace(&self, category: Category) -> ServiceResult<Option<Category>>;

    async fn delete(&self, id: &str, owner_id: &str) -> ServiceResult<bool>;
}
