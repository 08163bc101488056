// src/calendar.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::debug;
use mongodb::bson::{doc, DateTime as BsonDateTime};
use mongodb::Collection;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::MongoDB;
use crate::error::ExternalSyncError;
use crate::repository::mongo::to_bson_date;

pub const CALENDAR_COLLECTION: &str = "calendar_events";

/// What gets mirrored for one task.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEntry {
    pub owner_id: String,
    pub title: String,
    pub due: DateTime<Utc>,
}

impl CalendarEntry {
    pub fn end(&self) -> DateTime<Utc> {
        self.due + Duration::hours(1)
    }
}

/// External calendar capability. Calls may fail at any time.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    async fn create_event(&self, entry: &CalendarEntry) -> Result<String, ExternalSyncError>;

    async fn update_event(
        &self,
        event_id: &str,
        entry: &CalendarEntry,
    ) -> Result<(), ExternalSyncError>;

    async fn delete_event(&self, event_id: &str) -> Result<(), ExternalSyncError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct CalendarEvent {
    #[serde(rename = "_id")]
    event_id: String,
    user_id: String,
    title: String,
    start: BsonDateTime,
    end: BsonDateTime,
    created_at: BsonDateTime,
    updated_at: BsonDateTime,
}

/// Calendar kept in the `calendar_events` collection.
pub struct MongoCalendar {
    collection: Collection<CalendarEvent>,
}

impl MongoCalendar {
    pub fn new(mongodb: &MongoDB) -> Self {
        MongoCalendar {
            collection: mongodb.db.collection::<CalendarEvent>(CALENDAR_COLLECTION),
        }
    }
}

#[async_trait]
impl CalendarProvider for MongoCalendar {
    async fn create_event(&self, entry: &CalendarEntry) -> Result<String, ExternalSyncError> {
        let now = BsonDateTime::now();
        let event = CalendarEvent {
            event_id: Uuid::new_v4().to_string(),
            user_id: entry.owner_id.clone(),
            title: entry.title.clone(),
            start: to_bson_date(entry.due),
            end: to_bson_date(entry.end()),
            created_at: now,
            updated_at: now,
        };
        self.collection.insert_one(&event).await?;
        debug!("Calendar event {} created for {}", event.event_id, entry.owner_id);
        Ok(event.event_id)
    }

    async fn update_event(
        &self,
        event_id: &str,
        entry: &CalendarEntry,
    ) -> Result<(), ExternalSyncError> {
        let result = self
            .collection
            .update_one(
                doc! { "_id": event_id, "user_id": &entry.owner_id },
                doc! { "$set": {
                    "title": &entry.title,
                    "start": to_bson_date(entry.due),
                    "end": to_bson_date(entry.end()),
                    "updated_at": BsonDateTime::now(),
                } },
            )
            .await?;
        if result.matched_count == 0 {
            return Err(ExternalSyncError::UnknownEvent(event_id.to_string()));
        }
        Ok(())
    }

    async fn delete_event(&self, event_id: &str) -> Result<(), ExternalSyncError> {
        let result = self.collection.delete_one(doc! { "_id": event_id }).await?;
        if result.deleted_count == 0 {
            return Err(ExternalSyncError::UnknownEvent(event_id.to_string()));
        }
        Ok(())
    }
}

/// In-process calendar used with the memory storage backend.
#[derive(Default)]
pub struct MemoryCalendar {
    events: RwLock<HashMap<String, CalendarEntry>>,
}

impl MemoryCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, event_id: &str) -> Option<CalendarEntry> {
        self.events.read().await.get(event_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }
}

#[async_trait]
impl CalendarProvider for MemoryCalendar {
    async fn create_event(&self, entry: &CalendarEntry) -> Result<String, ExternalSyncError> {
        let id = Uuid::new_v4().to_string();
        self.events.write().await.insert(id.clone(), entry.clone());
        Ok(id)
    }

    async fn update_event(
        &self,
        event_id: &str,
        entry: &CalendarEntry,
    ) -> Result<(), ExternalSyncError> {
        match self.events.write().await.get_mut(event_id) {
            Some(existing) => {
                *existing = entry.clone();
                Ok(())
            }
            None => Err(ExternalSyncError::UnknownEvent(event_id.to_string())),
        }
    }

    async fn delete_event(&self, event_id: &str) -> Result<(), ExternalSyncError> {
        self.events
            .write()
            .await
            .remove(event_id)
            .map(|_| ())
            .ok_or_else(|| ExternalSyncError::UnknownEvent(event_id.to_string()))
    }
}
