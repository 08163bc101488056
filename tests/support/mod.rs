#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use taskline::attachment_store::{AttachmentStore, StoredFile, PUBLIC_PREFIX};
use taskline::calendar::{CalendarEntry, CalendarProvider, MemoryCalendar};
use taskline::error::ExternalSyncError;
use taskline::events::{EventPublisher, LiveEvent};
use taskline::models::NewFile;
use taskline::repository::memory::{MemoryCategoryRepository, MemoryTaskRepository};
use taskline::service::TaskService;

/// Keeps every published event in order.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<(String, LiveEvent)>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<(String, LiveEvent)> {
        self.events.lock().unwrap().clone()
    }

    pub fn names_for(&self, owner_id: &str) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(owner, _)| owner == owner_id)
            .map(|(_, event)| event.name())
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, owner_id: &str, event: LiveEvent) {
        self.events
            .lock()
            .unwrap()
            .push((owner_id.to_string(), event));
    }
}

/// In-memory attachment store that counts calls and can be told to fail
/// for particular original file names.
#[derive(Default)]
pub struct RecordingStore {
    files: Mutex<HashMap<String, String>>,
    fail_store: Mutex<HashSet<String>>,
    fail_delete: Mutex<HashSet<String>>,
    delete_attempts: AtomicUsize,
    next_id: AtomicUsize,
    store_delay: Mutex<Option<Duration>>,
}

impl RecordingStore {
    pub fn fail_store_of(&self, original_name: &str) {
        self.fail_store.lock().unwrap().insert(original_name.to_string());
    }

    pub fn fail_delete_of(&self, original_name: &str) {
        self.fail_delete.lock().unwrap().insert(original_name.to_string());
    }

    /// Makes every later `store` call take at least `delay`.
    pub fn delay_stores(&self, delay: Duration) {
        *self.store_delay.lock().unwrap() = Some(delay);
    }

    pub fn delete_attempts(&self) -> usize {
        self.delete_attempts.load(Ordering::SeqCst)
    }

    pub fn stored_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }
}

#[async_trait]
impl AttachmentStore for RecordingStore {
    async fn store(
        &self,
        bytes: &[u8],
        original_name: &str,
        _mime_type: &str,
    ) -> Result<StoredFile, ExternalSyncError> {
        let delay = *self.store_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_store.lock().unwrap().contains(original_name) {
            return Err(ExternalSyncError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        let stored_name = format!("{}-{}", self.next_id.fetch_add(1, Ordering::SeqCst), original_name);
        let path = format!("{}/{}", PUBLIC_PREFIX, stored_name);
        self.files
            .lock()
            .unwrap()
            .insert(path.clone(), original_name.to_string());
        Ok(StoredFile {
            stored_name,
            path,
            size: bytes.len() as u64,
        })
    }

    async fn delete(&self, path: &str) -> Result<(), ExternalSyncError> {
        self.delete_attempts.fetch_add(1, Ordering::SeqCst);
        let original = self.files.lock().unwrap().get(path).cloned();
        match original {
            Some(name) if self.fail_delete.lock().unwrap().contains(&name) => Err(
                ExternalSyncError::Io(std::io::Error::new(std::io::ErrorKind::Other, "busy")),
            ),
            _ => {
                self.files.lock().unwrap().remove(path);
                Ok(())
            }
        }
    }
}

/// Calendar whose every call fails.
#[derive(Default)]
pub struct FailingCalendar {
    pub calls: AtomicUsize,
}

#[async_trait]
impl CalendarProvider for FailingCalendar {
    async fn create_event(&self, _entry: &CalendarEntry) -> Result<String, ExternalSyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ExternalSyncError::Calendar("unavailable".into()))
    }

    async fn update_event(&self, _id: &str, _entry: &CalendarEntry) -> Result<(), ExternalSyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ExternalSyncError::Calendar("unavailable".into()))
    }

    async fn delete_event(&self, _id: &str) -> Result<(), ExternalSyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ExternalSyncError::Calendar("unavailable".into()))
    }
}

/// Calendar that never answers within any reasonable timeout.
pub struct HangingCalendar;

#[async_trait]
impl CalendarProvider for HangingCalendar {
    async fn create_event(&self, _entry: &CalendarEntry) -> Result<String, ExternalSyncError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok("late".into())
    }

    async fn update_event(&self, _id: &str, _entry: &CalendarEntry) -> Result<(), ExternalSyncError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    }

    async fn delete_event(&self, _id: &str) -> Result<(), ExternalSyncError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    }
}

pub struct Harness {
    pub service: TaskService,
    pub tasks: Arc<MemoryTaskRepository>,
    pub categories: Arc<MemoryCategoryRepository>,
    pub files: Arc<RecordingStore>,
    pub events: Arc<RecordingPublisher>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_calendar(Arc::new(MemoryCalendar::new()))
    }

    pub fn with_calendar(calendar: Arc<dyn CalendarProvider>) -> Self {
        let tasks = Arc::new(MemoryTaskRepository::new());
        let categories = Arc::new(MemoryCategoryRepository::new());
        let files = Arc::new(RecordingStore::default());
        let events = Arc::new(RecordingPublisher::default());
        let service = TaskService::new(
            tasks.clone(),
            categories.clone(),
            files.clone(),
            calendar,
            events.clone(),
        )
        .with_external_timeout(Duration::from_millis(100));
        Harness {
            service,
            tasks,
            categories,
            files,
            events,
        }
    }
}

pub fn file(name: &str) -> NewFile {
    NewFile {
        bytes: name.as_bytes().to_vec(),
        original_name: name.to_string(),
        mime_type: "text/plain".to_string(),
    }
}
