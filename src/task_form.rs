// src/task_form.rs

use actix_multipart::Multipart;
use actix_web::{http::header, web, HttpRequest};
use futures_util::StreamExt;
use log::debug;
use serde::Deserialize;

use crate::error::{ServiceError, ServiceResult};
use crate::models::{parse_due_date, FieldUpdate, NewFile, NewTask, TaskPatch};

/// Form field carrying uploaded files.
pub const ATTACHMENTS_FIELD: &str = "attachments";
pub const MAX_FILES_PER_REQUEST: usize = 5;
const MAX_JSON_BYTES: usize = 256 * 1024;

/// Raw task fields as sent by a client, before validation.
///
/// Presence matters: a missing field leaves the stored value alone, a present
/// empty (or JSON `null`) one clears `description`, `dueDate` and `categoryId`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskForm {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: FieldUpdate<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub due_date: FieldUpdate<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub category_id: FieldUpdate<String>,
    #[serde(default)]
    pub add_to_calendar: Option<serde_json::Value>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl TaskForm {
    /// Records one multipart text field.
    pub fn set_text(&mut self, name: &str, value: String) {
        match name {
            "title" => self.title = Some(value),
            "description" => self.description = FieldUpdate::Set(value),
            "status" => self.status = Some(value),
            "dueDate" => self.due_date = FieldUpdate::Set(value),
            "priority" => self.priority = Some(value),
            "categoryId" => self.category_id = FieldUpdate::Set(value),
            "addToCalendar" => self.add_to_calendar = Some(serde_json::Value::String(value)),
            other => debug!("Ignoring unknown task field '{}'", other),
        }
    }

    pub fn wants_calendar(&self) -> bool {
        match &self.add_to_calendar {
            Some(serde_json::Value::Bool(flag)) => *flag,
            Some(serde_json::Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    pub fn into_new_task(self) -> ServiceResult<NewTask> {
        let due_date = match self.due_date.non_blank() {
            FieldUpdate::Set(raw) => Some(parse_due_date(&raw)?),
            _ => None,
        };
        Ok(NewTask {
            title: self.title.unwrap_or_default(),
            description: self.description.non_blank().apply(None),
            status: non_empty(self.status).map(|s| s.parse()).transpose()?,
            due_date,
            priority: non_empty(self.priority).map(|p| p.parse()).transpose()?,
            category_id: self.category_id.non_blank().apply(None),
        })
    }

    pub fn into_patch(self) -> ServiceResult<TaskPatch> {
        Ok(TaskPatch {
            title: self.title,
            description: self.description,
            status: non_empty(self.status).map(|s| s.parse()).transpose()?,
            due_date: self
                .due_date
                .non_blank()
                .try_map(|raw| parse_due_date(&raw))?,
            priority: non_empty(self.priority).map(|p| p.parse()).transpose()?,
            category_id: self.category_id,
        })
    }
}

fn is_multipart(req: &HttpRequest) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"))
}

/// Reads a task create/update request, either `multipart/form-data` (text
/// fields plus `attachments` files) or a JSON body.
pub async fn read_task_request(
    req: &HttpRequest,
    mut payload: web::Payload,
    max_file_bytes: usize,
) -> ServiceResult<(TaskForm, Vec<NewFile>)> {
    if is_multipart(req) {
        return read_multipart(Multipart::new(req.headers(), payload), max_file_bytes).await;
    }

    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| ServiceError::validation(format!("Malformed body: {}", e)))?;
        if body.len() + chunk.len() > MAX_JSON_BYTES {
            return Err(ServiceError::validation("Request body too large"));
        }
        body.extend_from_slice(&chunk);
    }
    if body.is_empty() {
        return Ok((TaskForm::default(), Vec::new()));
    }
    let form = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::validation(format!("Invalid JSON: {}", e)))?;
    Ok((form, Vec::new()))
}

async fn read_multipart(
    mut multipart: Multipart,
    max_file_bytes: usize,
) -> ServiceResult<(TaskForm, Vec<NewFile>)> {
    let mut form = TaskForm::default();
    let mut files = Vec::new();

    while let Some(field) = multipart.next().await {
        let mut field =
            field.map_err(|e| ServiceError::validation(format!("Malformed upload: {}", e)))?;
        let name = field.name().unwrap_or_default().to_string();
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);
        let mime_type = field
            .content_type()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk =
                chunk.map_err(|e| ServiceError::validation(format!("Malformed upload: {}", e)))?;
            if bytes.len() + chunk.len() > max_file_bytes {
                return Err(ServiceError::validation(format!(
                    "Field '{}' exceeds {} bytes",
                    name, max_file_bytes
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        match filename {
            Some(original_name) => {
                if name != ATTACHMENTS_FIELD {
                    return Err(ServiceError::validation(format!("Unexpected file field '{}'", name)));
                }
                if files.len() == MAX_FILES_PER_REQUEST {
                    return Err(ServiceError::validation(format!(
                        "At most {} files per request",
                        MAX_FILES_PER_REQUEST
                    )));
                }
                files.push(NewFile {
                    bytes,
                    original_name,
                    mime_type,
                });
            }
            None => {
                let value = String::from_utf8(bytes).map_err(|_| {
                    ServiceError::validation(format!("Field '{}' is not valid UTF-8", name))
                })?;
                form.set_text(&name, value);
            }
        }
    }

    Ok((form, files))
}
