// src/repository/mongo.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{StreamExt, TryStreamExt};
use log::{debug, info};
use mongodb::bson::{doc, Bson, DateTime as BsonDateTime, Document};
use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use mongodb::options::{Collation, CollationStrength, IndexOptions, ReturnDocument};
use mongodb::{Collection, IndexModel};
use serde::{Deserialize, Serialize};

use super::{CategoryRepository, TaskRepository};
use crate::db::MongoDB;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{
    Attachment, Category, FieldUpdate, Task, TaskChanges, TaskFilter, TaskPriority, TaskStatus,
};

pub const TASKS_COLLECTION: &str = "tasks";
pub const CATEGORIES_COLLECTION: &str = "categories";
const DUPLICATE_KEY: i32 = 11000;

pub(crate) fn to_bson_date(dt: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(dt.timestamp_millis())
}

pub(crate) fn from_bson_date(dt: BsonDateTime) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(dt.timestamp_millis()).unwrap_or_default()
}

// ─── DOCUMENT SHAPES ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct AttachmentDocument {
    id: String,
    stored_name: String,
    original_name: String,
    path: String,
    mime_type: String,
    size: i64,
    uploaded_at: BsonDateTime,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskDocument {
    #[serde(rename = "_id")]
    id: String,
    owner_id: String,
    title: String,
    description: Option<String>,
    status: TaskStatus,
    due_date: Option<BsonDateTime>,
    priority: TaskPriority,
    category_id: Option<String>,
    #[serde(default)]
    attachments: Vec<AttachmentDocument>,
    google_calendar_event_id: Option<String>,
    created_at: BsonDateTime,
    updated_at: BsonDateTime,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CategoryDocument {
    #[serde(rename = "_id")]
    id: String,
    owner_id: String,
    name: String,
    color: String,
    created_at: BsonDateTime,
}

impl From<&Attachment> for AttachmentDocument {
    fn from(a: &Attachment) -> Self {
        AttachmentDocument {
            id: a.id.clone(),
            stored_name: a.stored_name.clone(),
            original_name: a.original_name.clone(),
            path: a.storage_path.clone(),
            mime_type: a.mime_type.clone(),
            size: i64::try_from(a.size_bytes).unwrap_or(i64::MAX),
            uploaded_at: to_bson_date(a.uploaded_at),
        }
    }
}

impl From<AttachmentDocument> for Attachment {
    fn from(d: AttachmentDocument) -> Self {
        Attachment {
            id: d.id,
            stored_name: d.stored_name,
            original_name: d.original_name,
            storage_path: d.path,
            mime_type: d.mime_type,
            size_bytes: u64::try_from(d.size).unwrap_or_default(),
            uploaded_at: from_bson_date(d.uploaded_at),
        }
    }
}

/// Same layout as [`AttachmentDocument`], for use inside update operators.
fn attachment_document(a: &Attachment) -> Document {
    let d = AttachmentDocument::from(a);
    doc! {
        "id": d.id,
        "stored_name": d.stored_name,
        "original_name": d.original_name,
        "path": d.path,
        "mime_type": d.mime_type,
        "size": d.size,
        "uploaded_at": d.uploaded_at,
    }
}

impl From<&Task> for TaskDocument {
    fn from(t: &Task) -> Self {
        TaskDocument {
            id: t.id.clone(),
            owner_id: t.owner_id.clone(),
            title: t.title.clone(),
            description: t.description.clone(),
            status: t.status,
            due_date: t.due_date.map(to_bson_date),
            priority: t.priority,
            category_id: t.category_id.clone(),
            attachments: t.attachments.iter().map(AttachmentDocument::from).collect(),
            google_calendar_event_id: t.external_event_id.clone(),
            created_at: to_bson_date(t.created_at),
            updated_at: to_bson_date(t.updated_at),
        }
    }
}

impl From<TaskDocument> for Task {
    fn from(d: TaskDocument) -> Self {
        Task {
            id: d.id,
            title: d.title,
            description: d.description,
            status: d.status,
            due_date: d.due_date.map(from_bson_date),
            priority: d.priority,
            category_id: d.category_id,
            attachments: d.attachments.into_iter().map(Attachment::from).collect(),
            external_event_id: d.google_calendar_event_id,
            owner_id: d.owner_id,
            created_at: from_bson_date(d.created_at),
            updated_at: from_bson_date(d.updated_at),
        }
    }
}

impl From<&Category> for CategoryDocument {
    fn from(c: &Category) -> Self {
        CategoryDocument {
            id: c.id.clone(),
            owner_id: c.owner_id.clone(),
            name: c.name.clone(),
            color: c.color.clone(),
            created_at: to_bson_date(c.created_at),
        }
    }
}

impl From<CategoryDocument> for Category {
    fn from(d: CategoryDocument) -> Self {
        Category {
            id: d.id,
            name: d.name,
            color: d.color,
            owner_id: d.owner_id,
            created_at: from_bson_date(d.created_at),
        }
    }
}

// ─── QUERIES ──────────────────────────────────────────────────────────────────

/// Case-insensitive regex condition; user input is always escaped.
fn ci_regex(pattern: String) -> Document {
    doc! { "$regex": pattern, "$options": "i" }
}

pub(crate) fn task_query(owner_id: &str, filter: &TaskFilter) -> Document {
    let mut query = doc! { "owner_id": owner_id };
    if let Some(status) = filter.status {
        query.insert("status", status.as_str());
    }
    if let Some(category_id) = &filter.category_id {
        query.insert("category_id", category_id.as_str());
    }
    if let Some(priority) = filter.priority {
        query.insert("priority", priority.as_str());
    }
    if let Some(term) = filter.search_term() {
        let pattern = regex::escape(term);
        query.insert(
            "$or",
            vec![
                doc! { "title": ci_regex(pattern.clone()) },
                doc! { "description": ci_regex(pattern) },
            ],
        );
    }
    query
}

pub(crate) fn category_name_query(name: &str, owner_id: &str, exclude_id: Option<&str>) -> Document {
    let mut query = doc! {
        "owner_id": owner_id,
        "name": ci_regex(format!("^{}$", regex::escape(name.trim()))),
    };
    if let Some(id) = exclude_id {
        query.insert("_id", doc! { "$ne": id });
    }
    query
}

fn set_nullable<T: Into<Bson>>(set: &mut Document, key: &str, update: FieldUpdate<T>) {
    match update {
        FieldUpdate::Keep => {}
        FieldUpdate::Clear => {
            set.insert(key, Bson::Null);
        }
        FieldUpdate::Set(value) => {
            set.insert(key, value);
        }
    }
}

/// Update operators for `changes`: `$set` for named fields only, `$push`
/// for new attachments, `$max` so `updated_at` never moves backwards.
pub(crate) fn task_update(changes: &TaskChanges) -> Document {
    let mut set = Document::new();
    if let Some(title) = &changes.title {
        set.insert("title", title.as_str());
    }
    if let Some(status) = changes.status {
        set.insert("status", status.as_str());
    }
    if let Some(priority) = changes.priority {
        set.insert("priority", priority.as_str());
    }
    set_nullable(&mut set, "description", changes.description.clone());
    set_nullable(&mut set, "due_date", changes.due_date.clone().map(to_bson_date));
    set_nullable(&mut set, "category_id", changes.category_id.clone());
    set_nullable(
        &mut set,
        "google_calendar_event_id",
        changes.external_event_id.clone(),
    );

    let mut update = doc! { "$max": { "updated_at": to_bson_date(changes.updated_at) } };
    if !set.is_empty() {
        update.insert("$set", set);
    }
    if !changes.add_attachments.is_empty() {
        let added: Vec<Document> = changes.add_attachments.iter().map(attachment_document).collect();
        update.insert("$push", doc! { "attachments": { "$each": added } });
    }
    update
}

fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

fn category_write_error(err: MongoError) -> ServiceError {
    if is_duplicate_key(&err) {
        debug!("Duplicate category name rejected by index");
        return ServiceError::duplicate_category();
    }
    err.into()
}

// ─── REPOSITORIES ─────────────────────────────────────────────────────────────

pub struct MongoTaskRepository {
    collection: Collection<TaskDocument>,
}

impl MongoTaskRepository {
    pub fn new(mongodb: &MongoDB) -> Self {
        MongoTaskRepository {
            collection: mongodb.db.collection::<TaskDocument>(TASKS_COLLECTION),
        }
    }

    pub async fn ensure_indexes(&self) -> ServiceResult<()> {
        let indexes = vec![
            IndexModel::builder()
                .keys(doc! { "owner_id": 1, "created_at": -1 })
                .build(),
            IndexModel::builder()
                .keys(doc! { "owner_id": 1, "category_id": 1 })
                .build(),
        ];
        self.collection.create_indexes(indexes).await?;
        info!("Indexes ensured on '{}'", TASKS_COLLECTION);
        Ok(())
    }
}

#[async_trait]
impl TaskRepository for MongoTaskRepository {
    async fn find(&self, owner_id: &str, filter: &TaskFilter) -> ServiceResult<Vec<Task>> {
        let query = task_query(owner_id, filter);
        debug!("Task query: {}", query);
        let mut cursor = self.collection.find(query).sort(doc! { "created_at": -1 }).await?;

        let mut tasks = Vec::new();
        while let Some(document) = cursor.next().await {
            tasks.push(Task::from(document?));
        }
        Ok(tasks)
    }

    async fn find_one(&self, id: &str, owner_id: &str) -> ServiceResult<Option<Task>> {
        let found = self
            .collection
            .find_one(doc! { "_id": id, "owner_id": owner_id })
            .await?;
        Ok(found.map(Task::from))
    }

    async fn insert(&self, task: Task) -> ServiceResult<Task> {
        self.collection.insert_one(TaskDocument::from(&task)).await?;
        Ok(task)
    }

    async fn update(
        &self,
        id: &str,
        owner_id: &str,
        changes: &TaskChanges,
    ) -> ServiceResult<Option<Task>> {
        let found = self
            .collection
            .find_one_and_update(doc! { "_id": id, "owner_id": owner_id }, task_update(changes))
            .return_document(ReturnDocument::After)
            .await?;
        Ok(found.map(Task::from))
    }

    async fn pull_attachment(
        &self,
        id: &str,
        owner_id: &str,
        attachment_id: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<Option<Task>> {
        let found = self
            .collection
            .find_one_and_update(
                doc! { "_id": id, "owner_id": owner_id, "attachments.id": attachment_id },
                doc! {
                    "$pull": { "attachments": { "id": attachment_id } },
                    "$max": { "updated_at": to_bson_date(now) },
                },
            )
            .return_document(ReturnDocument::After)
            .await?;
        Ok(found.map(Task::from))
    }

    async fn delete(&self, id: &str, owner_id: &str) -> ServiceResult<bool> {
        let result = self
            .collection
            .delete_one(doc! { "_id": id, "owner_id": owner_id })
            .await?;
        Ok(result.deleted_count > 0)
    }

    async fn clear_category(&self, category_id: &str, owner_id: &str) -> ServiceResult<u64> {
        let result = self
            .collection
            .update_many(
                doc! { "owner_id": owner_id, "category_id": category_id },
                doc! {
                    "$set": { "category_id": null },
                    "$max": { "updated_at": BsonDateTime::now() },
                },
            )
            .await?;
        Ok(result.modified_count)
    }
}

pub struct MongoCategoryRepository {
    collection: Collection<CategoryDocument>,
}

impl MongoCategoryRepository {
    pub fn new(mongodb: &MongoDB) -> Self {
        MongoCategoryRepository {
            collection: mongodb.db.collection::<CategoryDocument>(CATEGORIES_COLLECTION),
        }
    }

    /// Names are unique per owner ignoring case; the index enforces it even
    /// when two creates race past the lookup in the service.
    pub async fn ensure_indexes(&self) -> ServiceResult<()> {
        let case_insensitive = Collation::builder()
            .locale("en".to_string())
            .strength(CollationStrength::Secondary)
            .build();
        let options = IndexOptions::builder()
            .name("owner_name_ci_unique".to_string())
            .unique(true)
            .collation(case_insensitive)
            .build();
        self.collection
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "owner_id": 1, "name": 1 })
                    .options(options)
                    .build(),
            )
            .await?;
        info!("Indexes ensured on '{}'", CATEGORIES_COLLECTION);
        Ok(())
    }
}

#[async_trait]
impl CategoryRepository for MongoCategoryRepository {
    async fn find(&self, owner_id: &str) -> ServiceResult<Vec<Category>> {
        let documents: Vec<CategoryDocument> = self
            .collection
            .find(doc! { "owner_id": owner_id })
            .sort(doc! { "name": 1 })
            .await?
            .try_collect()
            .await?;
        Ok(documents.into_iter().map(Category::from).collect())
    }

    async fn find_one(&self, id: &str, owner_id: &str) -> ServiceResult<Option<Category>> {
        let found = self
            .collection
            .find_one(doc! { "_id": id, "owner_id": owner_id })
            .await?;
        Ok(found.map(Category::from))
    }

    async fn find_by_name_ci(
        &self,
        name: &str,
        owner_id: &str,
        exclude_id: Option<&str>,
    ) -> ServiceResult<Option<Category>> {
        let found = self
            .collection
            .find_one(category_name_query(name, owner_id, exclude_id))
            .await?;
        Ok(found.map(Category::from))
    }

    async fn insert(&self, category: Category) -> ServiceResult<Category> {
        self.collection
            .insert_one(CategoryDocument::from(&category))
            .await
            .map_err(category_write_error)?;
        Ok(category)
    }

    async fn replace(&self, category: Category) -> ServiceResult<Option<Category>> {
        let result = self
            .collection
            .replace_one(
                doc! { "_id": &category.id, "owner_id": &category.owner_id },
                CategoryDocument::from(&category),
            )
            .await
            .map_err(category_write_error)?;
        Ok((result.matched_count > 0).then_some(category))
    }

    async fn delete(&self, id: &str, owner_id: &str) -> ServiceResult<bool> {
        let result = self
            .collection
            .delete_one(doc! { "_id": id, "owner_id": owner_id })
            .await?;
        Ok(result.deleted_count > 0)
    }
}
