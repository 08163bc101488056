// src/service.rs

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::info;
use serde::Serialize;
use uuid::Uuid;

use crate::attachment_store::AttachmentStore;
use crate::best_effort::attempt;
use crate::calendar::{CalendarEntry, CalendarProvider};
use crate::error::{ServiceError, ServiceResult};
use crate::events::{EventPublisher, LiveEvent};
use crate::models::{
    normalize_name, Attachment, Category, CategoryPatch, CategorySummary, FieldUpdate,
    NewCategory, NewFile, NewTask, Task, TaskChanges, TaskFilter, TaskPatch, TaskView,
};
use crate::repository::{CategoryRepository, TaskRepository};

pub const DEFAULT_EXTERNAL_TIMEOUT: Duration = Duration::from_secs(3);

/// Outcome of [`TaskService::sync_calendar`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CalendarSyncReport {
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Task and category lifecycle.
///
/// Repositories are the source of truth. Calendar and attachment-store calls
/// are best-effort: they are attempted once, bounded by `external_timeout`,
/// and their failure never changes the result of the operation. Events are
/// published only after the write succeeded.
pub struct TaskService {
    tasks: Arc<dyn TaskRepository>,
    categories: Arc<dyn CategoryRepository>,
    files: Arc<dyn AttachmentStore>,
    calendar: Arc<dyn CalendarProvider>,
    events: Arc<dyn EventPublisher>,
    external_timeout: Duration,
}

fn calendar_entry(task: &Task) -> Option<CalendarEntry> {
    task.due_date.map(|due| CalendarEntry {
        owner_id: task.owner_id.clone(),
        title: task.title.clone(),
        due,
    })
}

impl TaskService {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        categories: Arc<dyn CategoryRepository>,
        files: Arc<dyn AttachmentStore>,
        calendar: Arc<dyn CalendarProvider>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        TaskService {
            tasks,
            categories,
            files,
            calendar,
            events,
            external_timeout: DEFAULT_EXTERNAL_TIMEOUT,
        }
    }

    pub fn with_external_timeout(mut self, timeout: Duration) -> Self {
        self.external_timeout = timeout;
        self
    }

    // ─── TASKS ────────────────────────────────────────────────────────────────

    pub async fn list_tasks(&self, owner_id: &str, filter: &TaskFilter) -> ServiceResult<Vec<TaskView>> {
        let tasks = self.tasks.find(owner_id, filter).await?;
        let summaries: HashMap<String, CategorySummary> = self
            .categories
            .find(owner_id)
            .await?
            .iter()
            .map(|c| (c.id.clone(), c.summary()))
            .collect();

        Ok(tasks
            .into_iter()
            .map(|task| {
                let category = task
                    .category_id
                    .as_ref()
                    .and_then(|id| summaries.get(id))
                    .cloned();
                TaskView { task, category }
            })
            .collect())
    }

    pub async fn get_task(&self, task_id: &str, owner_id: &str) -> ServiceResult<TaskView> {
        let task = self.load_task(task_id, owner_id).await?;
        self.view(task).await
    }

    pub async fn create_task(
        &self,
        owner_id: &str,
        fields: NewTask,
        new_files: Vec<NewFile>,
        want_calendar_sync: bool,
    ) -> ServiceResult<TaskView> {
        let mut task = Task::new(owner_id, fields, Utc::now())?;
        if let Some(category_id) = &task.category_id {
            self.check_category(category_id, owner_id).await?;
        }

        // Files go to the store before the record references them.
        task.attachments = self.store_files(&task.id, new_files).await;

        if want_calendar_sync {
            if let Some(entry) = calendar_entry(&task) {
                task.external_event_id = attempt(
                    format!("calendar create for task {}", task.id),
                    self.external_timeout,
                    self.calendar.create_event(&entry),
                )
                .await;
            }
        }

        let task = self.tasks.insert(task).await?;
        info!("Task {} created by {}", task.id, owner_id);

        let view = self.view(task).await?;
        self.events.publish(owner_id, LiveEvent::TaskCreated(view.clone()));
        Ok(view)
    }

    pub async fn update_task(
        &self,
        task_id: &str,
        owner_id: &str,
        patch: TaskPatch,
        new_files: Vec<NewFile>,
    ) -> ServiceResult<TaskView> {
        let task = self.load_task(task_id, owner_id).await?;
        if let FieldUpdate::Set(category_id) = &patch.category_id {
            let category_id = category_id.trim();
            if !category_id.is_empty() {
                self.check_category(category_id, owner_id).await?;
            }
        }

        let added = self.store_files(&task.id, new_files).await;
        let changes = TaskChanges::from_patch(patch, Utc::now()).with_attachments(added);
        let Some(task) = self.tasks.update(&task.id, owner_id, &changes).await? else {
            // Deleted meanwhile; the files just stored belong to nobody.
            for attachment in &changes.add_attachments {
                self.remove_file(task_id, attachment).await;
            }
            return Err(ServiceError::task_not_found());
        };

        if let (Some(event_id), Some(entry)) = (task.external_event_id.as_deref(), calendar_entry(&task)) {
            attempt(
                format!("calendar update for task {}", task.id),
                self.external_timeout,
                self.calendar.update_event(event_id, &entry),
            )
            .await;
        }
        info!("Task {} updated by {}", task.id, owner_id);

        let view = self.view(task).await?;
        self.events.publish(owner_id, LiveEvent::TaskUpdated(view.clone()));
        Ok(view)
    }

    pub async fn delete_task(&self, task_id: &str, owner_id: &str) -> ServiceResult<()> {
        let task = self.load_task(task_id, owner_id).await?;

        for attachment in &task.attachments {
            self.remove_file(&task.id, attachment).await;
        }
        if let Some(event_id) = &task.external_event_id {
            attempt(
                format!("calendar delete for task {}", task.id),
                self.external_timeout,
                self.calendar.delete_event(event_id),
            )
            .await;
        }

        if !self.tasks.delete(&task.id, owner_id).await? {
            return Err(ServiceError::task_not_found());
        }
        info!("Task {} deleted by {}", task.id, owner_id);

        self.events.publish(owner_id, LiveEvent::TaskDeleted(task.id));
        Ok(())
    }

    pub async fn remove_attachment(
        &self,
        task_id: &str,
        attachment_id: &str,
        owner_id: &str,
    ) -> ServiceResult<TaskView> {
        let task = self.load_task(task_id, owner_id).await?;
        let Some(attachment) = task.attachments.iter().find(|a| a.id == attachment_id).cloned() else {
            return Err(ServiceError::attachment_not_found());
        };

        // The record stops referencing the file before the file goes.
        let task = self
            .tasks
            .pull_attachment(&task.id, owner_id, attachment_id, Utc::now())
            .await?
            .ok_or_else(ServiceError::attachment_not_found)?;
        self.remove_file(&task.id, &attachment).await;

        let view = self.view(task).await?;
        self.events.publish(owner_id, LiveEvent::TaskUpdated(view.clone()));
        Ok(view)
    }

    // ─── CALENDAR LINKS ───────────────────────────────────────────────────────

    /// Mirrors one task into the calendar, or refreshes an existing mirror.
    pub async fn link_calendar(&self, task_id: &str, owner_id: &str) -> ServiceResult<TaskView> {
        let task = self.load_task(task_id, owner_id).await?;
        let entry = calendar_entry(&task)
            .ok_or_else(|| ServiceError::validation("Task does not have a due date"))?;

        if let Some(event_id) = &task.external_event_id {
            attempt(
                format!("calendar update for task {}", task.id),
                self.external_timeout,
                self.calendar.update_event(event_id, &entry),
            )
            .await;
            return self.view(task).await;
        }

        let created = attempt(
            format!("calendar create for task {}", task.id),
            self.external_timeout,
            self.calendar.create_event(&entry),
        )
        .await;
        let Some(event_id) = created else {
            return self.view(task).await;
        };

        let task = self.record_link(&task.id, owner_id, event_id).await?;
        let view = self.view(task).await?;
        self.events.publish(owner_id, LiveEvent::TaskUpdated(view.clone()));
        Ok(view)
    }

    /// Drops the calendar link. The link is cleared even if the remote
    /// delete fails.
    pub async fn unlink_calendar(&self, task_id: &str, owner_id: &str) -> ServiceResult<TaskView> {
        let task = self.load_task(task_id, owner_id).await?;
        let Some(event_id) = task.external_event_id.as_deref() else {
            return Err(ServiceError::validation("Task is not linked to a calendar"));
        };

        attempt(
            format!("calendar delete for task {}", task.id),
            self.external_timeout,
            self.calendar.delete_event(event_id),
        )
        .await;

        let task = self
            .tasks
            .update(&task.id, owner_id, &TaskChanges::unlink_event(Utc::now()))
            .await?
            .ok_or_else(ServiceError::task_not_found)?;
        let view = self.view(task).await?;
        self.events.publish(owner_id, LiveEvent::TaskUpdated(view.clone()));
        Ok(view)
    }

    /// Pushes every dated task of `owner_id` to the calendar.
    pub async fn sync_calendar(&self, owner_id: &str) -> ServiceResult<CalendarSyncReport> {
        let mut report = CalendarSyncReport::default();

        for task in self.tasks.find(owner_id, &TaskFilter::default()).await? {
            let Some(entry) = calendar_entry(&task) else {
                continue;
            };

            if let Some(event_id) = &task.external_event_id {
                let updated = attempt(
                    format!("calendar update for task {}", task.id),
                    self.external_timeout,
                    self.calendar.update_event(event_id, &entry),
                )
                .await;
                match updated {
                    Some(()) => report.updated += 1,
                    None => report.failed += 1,
                }
                continue;
            }

            let created = attempt(
                format!("calendar create for task {}", task.id),
                self.external_timeout,
                self.calendar.create_event(&entry),
            )
            .await;
            let Some(event_id) = created else {
                report.failed += 1;
                continue;
            };

            let task = match self.record_link(&task.id, owner_id, event_id).await {
                Ok(task) => task,
                Err(ServiceError::NotFound(_)) => {
                    report.failed += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            let view = self.view(task).await?;
            self.events.publish(owner_id, LiveEvent::TaskUpdated(view));
            report.created += 1;
        }

        info!(
            "Calendar sync for {}: {} created, {} updated, {} failed",
            owner_id, report.created, report.updated, report.failed
        );
        Ok(report)
    }

    // ─── CATEGORIES ───────────────────────────────────────────────────────────

    pub async fn list_categories(&self, owner_id: &str) -> ServiceResult<Vec<Category>> {
        self.categories.find(owner_id).await
    }

    pub async fn create_category(&self, owner_id: &str, fields: NewCategory) -> ServiceResult<Category> {
        let category = Category::new(owner_id, fields, Utc::now())?;
        self.ensure_unique_name(&category.name, owner_id, None).await?;

        let category = self.categories.insert(category).await?;
        info!("Category {} created by {}", category.id, owner_id);

        self.events.publish(owner_id, LiveEvent::CategoryCreated(category.clone()));
        Ok(category)
    }

    pub async fn update_category(
        &self,
        category_id: &str,
        owner_id: &str,
        patch: CategoryPatch,
    ) -> ServiceResult<Category> {
        let mut category = self
            .categories
            .find_one(category_id, owner_id)
            .await?
            .ok_or_else(ServiceError::category_not_found)?;

        if let Some(raw) = patch.name.as_deref() {
            let name = normalize_name(raw)?;
            self.ensure_unique_name(&name, owner_id, Some(&category.id)).await?;
            category.name = name;
        }
        if let Some(color) = patch.color.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            category.color = color.to_string();
        }

        let category = self
            .categories
            .replace(category)
            .await?
            .ok_or_else(ServiceError::category_not_found)?;

        self.events.publish(owner_id, LiveEvent::CategoryUpdated(category.clone()));
        Ok(category)
    }

    /// Deletes a category and clears it from every task that used it.
    pub async fn delete_category(&self, category_id: &str, owner_id: &str) -> ServiceResult<()> {
        let category = self
            .categories
            .find_one(category_id, owner_id)
            .await?
            .ok_or_else(ServiceError::category_not_found)?;

        let cleared = self.tasks.clear_category(&category.id, owner_id).await?;
        if !self.categories.delete(&category.id, owner_id).await? {
            return Err(ServiceError::category_not_found());
        }
        info!(
            "Category {} deleted by {} ({} task(s) cleared)",
            category.id, owner_id, cleared
        );

        self.events.publish(owner_id, LiveEvent::CategoryDeleted(category.id));
        Ok(())
    }

    // ─── HELPERS ──────────────────────────────────────────────────────────────

    async fn load_task(&self, task_id: &str, owner_id: &str) -> ServiceResult<Task> {
        self.tasks
            .find_one(task_id, owner_id)
            .await?
            .ok_or_else(ServiceError::task_not_found)
    }

    /// Stores a confirmed calendar event id. If the task was deleted while
    /// the event was being created, the event is removed again.
    async fn record_link(&self, task_id: &str, owner_id: &str, event_id: String) -> ServiceResult<Task> {
        let changes = TaskChanges::link_event(event_id.clone(), Utc::now());
        match self.tasks.update(task_id, owner_id, &changes).await? {
            Some(task) => Ok(task),
            None => {
                attempt(
                    format!("calendar delete for vanished task {}", task_id),
                    self.external_timeout,
                    self.calendar.delete_event(&event_id),
                )
                .await;
                Err(ServiceError::task_not_found())
            }
        }
    }

    async fn view(&self, task: Task) -> ServiceResult<TaskView> {
        let category = match &task.category_id {
            Some(id) => self
                .categories
                .find_one(id, &task.owner_id)
                .await?
                .map(|c| c.summary()),
            None => None,
        };
        Ok(TaskView { task, category })
    }

    async fn check_category(&self, category_id: &str, owner_id: &str) -> ServiceResult<()> {
        match self.categories.find_one(category_id, owner_id).await? {
            Some(_) => Ok(()),
            None => Err(ServiceError::InvalidReference(format!(
                "Category {} does not exist",
                category_id
            ))),
        }
    }

    async fn ensure_unique_name(
        &self,
        name: &str,
        owner_id: &str,
        exclude_id: Option<&str>,
    ) -> ServiceResult<()> {
        if self
            .categories
            .find_by_name_ci(name, owner_id, exclude_id)
            .await?
            .is_some()
        {
            return Err(ServiceError::duplicate_category());
        }
        Ok(())
    }

    /// Stores uploads in order. A file the store rejects is left out.
    async fn store_files(&self, task_id: &str, new_files: Vec<NewFile>) -> Vec<Attachment> {
        let mut attachments = Vec::with_capacity(new_files.len());
        for file in new_files {
            let stored = attempt(
                format!("storing '{}' for task {}", file.original_name, task_id),
                self.external_timeout,
                self.files.store(&file.bytes, &file.original_name, &file.mime_type),
            )
            .await;
            let Some(stored) = stored else {
                continue;
            };
            attachments.push(Attachment {
                id: Uuid::new_v4().to_string(),
                stored_name: stored.stored_name,
                original_name: file.original_name,
                storage_path: stored.path,
                mime_type: file.mime_type,
                size_bytes: stored.size,
                uploaded_at: Utc::now(),
            });
        }
        attachments
    }

    async fn remove_file(&self, task_id: &str, attachment: &Attachment) {
        attempt(
            format!("deleting {} of task {}", attachment.storage_path, task_id),
            self.external_timeout,
            self.files.delete(&attachment.storage_path),
        )
        .await;
    }
}
