use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CategorySummary, FieldUpdate};
use crate::error::{ServiceError, ServiceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Completed => "completed",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(TaskStatus::Pending),
            "in-progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            other => Err(ServiceError::validation(format!("Invalid status '{}'", other))),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
        }
    }
}

impl FromStr for TaskPriority {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "low" => Ok(TaskPriority::Low),
            "medium" => Ok(TaskPriority::Medium),
            "high" => Ok(TaskPriority::High),
            other => Err(ServiceError::validation(format!("Invalid priority '{}'", other))),
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file attached to a task. Lives only inside its task's record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    pub stored_name: String,
    pub original_name: String,
    pub storage_path: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: TaskPriority,
    pub category_id: Option<String>,
    pub attachments: Vec<Attachment>,
    /// Set only once the calendar confirmed the event.
    #[serde(rename = "googleCalendarEventId")]
    pub external_event_id: Option<String>,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields accepted when creating a task.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Option<TaskPriority>,
    pub category_id: Option<String>,
}

/// Field-by-field update of a task.
///
/// `title`, `status` and `priority` can only be replaced; the other three
/// fields can also be cleared.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: FieldUpdate<String>,
    pub status: Option<TaskStatus>,
    pub due_date: FieldUpdate<DateTime<Utc>>,
    pub priority: Option<TaskPriority>,
    pub category_id: FieldUpdate<String>,
}

/// A received upload, before it has been written to the attachment store.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub bytes: Vec<u8>,
    pub original_name: String,
    pub mime_type: String,
}

impl Task {
    pub fn new(owner_id: &str, fields: NewTask, now: DateTime<Utc>) -> ServiceResult<Self> {
        let title = fields.title.trim();
        if title.is_empty() {
            return Err(ServiceError::validation("Title is required"));
        }

        Ok(Task {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            description: fields
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            status: fields.status.unwrap_or_default(),
            due_date: fields.due_date,
            priority: fields.priority.unwrap_or_default(),
            category_id: fields.category_id.filter(|c| !c.trim().is_empty()),
            attachments: Vec::new(),
            external_event_id: None,
            owner_id: owner_id.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Writes `changes` into the task. Fields the changes do not name are
    /// left exactly as they are.
    pub fn apply(&mut self, changes: &TaskChanges) {
        if let Some(title) = &changes.title {
            self.title = title.clone();
        }
        if let Some(status) = changes.status {
            self.status = status;
        }
        if let Some(priority) = changes.priority {
            self.priority = priority;
        }
        self.description = changes.description.clone().apply(self.description.take());
        self.due_date = changes.due_date.clone().apply(self.due_date.take());
        self.category_id = changes.category_id.clone().apply(self.category_id.take());
        self.external_event_id = changes
            .external_event_id
            .clone()
            .apply(self.external_event_id.take());
        self.attachments.extend(changes.add_attachments.iter().cloned());
        self.touch(changes.updated_at);
    }

    /// Drops one attachment. `None` if the task has no such attachment.
    pub fn remove_attachment(&mut self, attachment_id: &str, now: DateTime<Utc>) -> Option<Attachment> {
        let position = self.attachments.iter().position(|a| a.id == attachment_id)?;
        let removed = self.attachments.remove(position);
        self.touch(now);
        Some(removed)
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        // Never moves backwards, so it also stays >= created_at.
        self.updated_at = self.updated_at.max(now);
    }
}

/// One field-level write to a stored task.
///
/// Only the fields named here are written and attachments are appended, so
/// a concurrent write to other fields of the same task is not lost.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: FieldUpdate<String>,
    pub status: Option<TaskStatus>,
    pub due_date: FieldUpdate<DateTime<Utc>>,
    pub priority: Option<TaskPriority>,
    pub category_id: FieldUpdate<String>,
    pub external_event_id: FieldUpdate<String>,
    pub add_attachments: Vec<Attachment>,
    pub updated_at: DateTime<Utc>,
}

impl TaskChanges {
    /// Changes nothing except `updated_at`.
    pub fn at(now: DateTime<Utc>) -> Self {
        TaskChanges {
            title: None,
            description: FieldUpdate::Keep,
            status: None,
            due_date: FieldUpdate::Keep,
            priority: None,
            category_id: FieldUpdate::Keep,
            external_event_id: FieldUpdate::Keep,
            add_attachments: Vec::new(),
            updated_at: now,
        }
    }

    /// Normalizes a client patch: an empty title is ignored, blank
    /// description or category clear the field.
    pub fn from_patch(patch: TaskPatch, now: DateTime<Utc>) -> Self {
        TaskChanges {
            title: patch
                .title
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            description: patch.description.non_blank(),
            status: patch.status,
            due_date: patch.due_date,
            priority: patch.priority,
            category_id: patch.category_id.non_blank(),
            ..TaskChanges::at(now)
        }
    }

    pub fn link_event(event_id: String, now: DateTime<Utc>) -> Self {
        TaskChanges {
            external_event_id: FieldUpdate::Set(event_id),
            ..TaskChanges::at(now)
        }
    }

    pub fn unlink_event(now: DateTime<Utc>) -> Self {
        TaskChanges {
            external_event_id: FieldUpdate::Clear,
            ..TaskChanges::at(now)
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.add_attachments = attachments;
        self
    }
}

/// Task as returned to clients, with the category's display fields resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: Task,
    pub category: Option<CategorySummary>,
}

/// Listing filter. Equality filters are AND-combined; `search` matches
/// title OR description, case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub category_id: Option<String>,
    pub priority: Option<TaskPriority>,
    pub search: Option<String>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        if self.status.is_some_and(|s| s != task.status) {
            return false;
        }
        if self.priority.is_some_and(|p| p != task.priority) {
            return false;
        }
        if let Some(category_id) = &self.category_id {
            if task.category_id.as_deref() != Some(category_id.as_str()) {
                return false;
            }
        }
        match self.search_term() {
            Some(term) => {
                let term = term.to_lowercase();
                task.title.to_lowercase().contains(&term)
                    || task
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&term))
            }
            None => true,
        }
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Accepts an RFC 3339 timestamp or a plain `YYYY-MM-DD` date (midnight UTC).
pub fn parse_due_date(raw: &str) -> ServiceResult<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| ServiceError::validation(format!("Invalid due date '{}'", raw)))
}
