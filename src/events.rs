use serde::Serialize;

use crate::models::{Category, TaskView};

/// Lifecycle notifications pushed to an owner's live sessions.
///
/// Serialized as `{ "event": "<name>", "data": <payload> }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum LiveEvent {
    TaskCreated(TaskView),
    TaskUpdated(TaskView),
    TaskDeleted(String),
    CategoryCreated(Category),
    CategoryUpdated(Category),
    CategoryDeleted(String),
}

impl LiveEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LiveEvent::TaskCreated(_) => "taskCreated",
            LiveEvent::TaskUpdated(_) => "taskUpdated",
            LiveEvent::TaskDeleted(_) => "taskDeleted",
            LiveEvent::CategoryCreated(_) => "categoryCreated",
            LiveEvent::CategoryUpdated(_) => "categoryUpdated",
            LiveEvent::CategoryDeleted(_) => "categoryDeleted",
        }
    }
}

/// Fire-and-forget delivery to one owner's private channel.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, owner_id: &str, event: LiveEvent);
}
