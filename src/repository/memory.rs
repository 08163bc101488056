// src/repository/memory.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{CategoryRepository, TaskRepository};
use crate::error::{ServiceError, ServiceResult};
use crate::models::{Category, Task, TaskChanges, TaskFilter};

/// In-process task store with the same scoping rules as the MongoDB one.
#[derive(Default)]
pub struct MemoryTaskRepository {
    tasks: RwLock<HashMap<String, Task>>,
}

impl MemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskRepository for MemoryTaskRepository {
    async fn find(&self, owner_id: &str, filter: &TaskFilter) -> ServiceResult<Vec<Task>> {
        let tasks = self.tasks.read().await;
        let mut found: Vec<Task> = tasks
            .values()
            .filter(|t| t.owner_id == owner_id && filter.matches(t))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn find_one(&self, id: &str, owner_id: &str) -> ServiceResult<Option<Task>> {
        let tasks = self.tasks.read().await;
        Ok(tasks.get(id).filter(|t| t.owner_id == owner_id).cloned())
    }

    async fn insert(&self, task: Task) -> ServiceResult<Task> {
        self.tasks.write().await.insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn update(
        &self,
        id: &str,
        owner_id: &str,
        changes: &TaskChanges,
    ) -> ServiceResult<Option<Task>> {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(id) {
            Some(task) if task.owner_id == owner_id => {
                task.apply(changes);
                Ok(Some(task.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn pull_attachment(
        &self,
        id: &str,
        owner_id: &str,
        attachment_id: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<Option<Task>> {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(id) {
            Some(task) if task.owner_id == owner_id => Ok(task
                .remove_attachment(attachment_id, now)
                .map(|_| task.clone())),
            _ => Ok(None),
        }
    }

    async fn delete(&self, id: &str, owner_id: &str) -> ServiceResult<bool> {
        let mut tasks = self.tasks.write().await;
        if tasks.get(id).is_some_and(|t| t.owner_id == owner_id) {
            tasks.remove(id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn clear_category(&self, category_id: &str, owner_id: &str) -> ServiceResult<u64> {
        let now = Utc::now();
        let mut tasks = self.tasks.write().await;
        let mut touched = 0;
        for task in tasks.values_mut().filter(|t| {
            t.owner_id == owner_id && t.category_id.as_deref() == Some(category_id)
        }) {
            task.category_id = None;
            task.touch(now);
            touched += 1;
        }
        Ok(touched)
    }
}

#[derive(Default)]
pub struct MemoryCategoryRepository {
    categories: RwLock<HashMap<String, Category>>,
}

impl MemoryCategoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn name_taken(categories: &HashMap<String, Category>, candidate: &Category) -> bool {
    categories.values().any(|c| {
        c.owner_id == candidate.owner_id && c.id != candidate.id && c.has_name(&candidate.name)
    })
}

#[async_trait]
impl CategoryRepository for MemoryCategoryRepository {
    async fn find(&self, owner_id: &str) -> ServiceResult<Vec<Category>> {
        let categories = self.categories.read().await;
        let mut found: Vec<Category> = categories
            .values()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn find_one(&self, id: &str, owner_id: &str) -> ServiceResult<Option<Category>> {
        let categories = self.categories.read().await;
        Ok(categories.get(id).filter(|c| c.owner_id == owner_id).cloned())
    }

    async fn find_by_name_ci(
        &self,
        name: &str,
        owner_id: &str,
        exclude_id: Option<&str>,
    ) -> ServiceResult<Option<Category>> {
        let categories = self.categories.read().await;
        Ok(categories
            .values()
            .find(|c| {
                c.owner_id == owner_id && c.has_name(name) && Some(c.id.as_str()) != exclude_id
            })
            .cloned())
    }

    async fn insert(&self, category: Category) -> ServiceResult<Category> {
        let mut categories = self.categories.write().await;
        if name_taken(&categories, &category) {
            return Err(ServiceError::duplicate_category());
        }
        categories.insert(category.id.clone(), category.clone());
        Ok(category)
    }

    async fn replace(&self, category: Category) -> ServiceResult<Option<Category>> {
        let mut categories = self.categories.write().await;
        if name_taken(&categories, &category) {
            return Err(ServiceError::duplicate_category());
        }
        match categories.get_mut(&category.id) {
            Some(existing) if existing.owner_id == category.owner_id => {
                *existing = category.clone();
                Ok(Some(category))
            }
            _ => Ok(None),
        }
    }

    async fn delete(&self, id: &str, owner_id: &str) -> ServiceResult<bool> {
        let mut categories = self.categories.write().await;
        if categories.get(id).is_some_and(|c| c.owner_id == owner_id) {
            categories.remove(id);
            return Ok(true);
        }
        Ok(false)
    }
}
