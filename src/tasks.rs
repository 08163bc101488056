// src/tasks.rs

use actix_web::{web, HttpRequest, HttpResponse};
use log::debug;
use serde::Deserialize;
use serde_json::json;

use crate::app_state::AppState;
use crate::auth::current_user;
use crate::error::{ServiceError, ServiceResult};
use crate::models::TaskFilter;
use crate::task_form::read_task_request;

/// Query string of `GET /api/tasks`. Empty values are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct TaskQuery {
    pub status: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub search: Option<String>,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl TaskQuery {
    pub fn into_filter(self) -> ServiceResult<TaskFilter> {
        Ok(TaskFilter {
            status: present(self.status).map(|s| s.parse()).transpose()?,
            category_id: present(self.category),
            priority: present(self.priority).map(|p| p.parse()).transpose()?,
            search: present(self.search),
        })
    }
}

/// GET /api/tasks
/// Lists the caller's tasks, newest first.
pub async fn list_tasks(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<TaskQuery>,
) -> Result<HttpResponse, ServiceError> {
    let owner_id = current_user(&req)?;
    let filter = query.into_inner().into_filter()?;
    debug!("Listing tasks for {} with {:?}", owner_id, filter);

    let tasks = data.service.list_tasks(&owner_id, &filter).await?;
    Ok(HttpResponse::Ok().json(tasks))
}

/// GET /api/tasks/{id}
pub async fn get_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let owner_id = current_user(&req)?;
    let task = data.service.get_task(&path.into_inner(), &owner_id).await?;
    Ok(HttpResponse::Ok().json(task))
}

/// POST /api/tasks
/// Accepts `multipart/form-data` (with `attachments`) or JSON.
pub async fn create_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Payload,
) -> Result<HttpResponse, ServiceError> {
    let owner_id = current_user(&req)?;
    let (form, files) = read_task_request(&req, payload, data.config.max_upload_bytes).await?;
    let want_calendar_sync = form.wants_calendar();
    let fields = form.into_new_task()?;

    let task = data
        .service
        .create_task(&owner_id, fields, files, want_calendar_sync)
        .await?;
    Ok(HttpResponse::Created().json(task))
}

/// PUT /api/tasks/{id}
/// Partial update; new `attachments` are appended.
pub async fn update_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Payload,
) -> Result<HttpResponse, ServiceError> {
    let owner_id = current_user(&req)?;
    let (form, files) = read_task_request(&req, payload, data.config.max_upload_bytes).await?;
    let patch = form.into_patch()?;

    let task = data
        .service
        .update_task(&path.into_inner(), &owner_id, patch, files)
        .await?;
    Ok(HttpResponse::Ok().json(task))
}

/// DELETE /api/tasks/{id}
pub async fn delete_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let owner_id = current_user(&req)?;
    data.service.delete_task(&path.into_inner(), &owner_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Task deleted successfully" })))
}

/// DELETE /api/tasks/{task_id}/attachments/{attachment_id}
/// Responds with the updated task.
pub async fn remove_attachment(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ServiceError> {
    let owner_id = current_user(&req)?;
    let (task_id, attachment_id) = path.into_inner();
    let task = data
        .service
        .remove_attachment(&task_id, &attachment_id, &owner_id)
        .await?;
    Ok(HttpResponse::Ok().json(task))
}
