// src/calendar_endpoints.rs

use actix_web::{web, HttpRequest, HttpResponse};

use crate::app_state::AppState;
use crate::auth::current_user;
use crate::error::ServiceError;

/// POST /api/calendar/sync
/// Mirrors every dated task; responds with created/updated/failed counts.
pub async fn sync_calendar(
    req: HttpRequest,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ServiceError> {
    let owner_id = current_user(&req)?;
    let report = data.service.sync_calendar(&owner_id).await?;
    Ok(HttpResponse::Ok().json(report))
}

/// POST /api/calendar/task/{task_id}
pub async fn link_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let owner_id = current_user(&req)?;
    let task = data
        .service
        .link_calendar(&path.into_inner(), &owner_id)
        .await?;
    Ok(HttpResponse::Ok().json(task))
}

/// DELETE /api/calendar/task/{task_id}
pub async fn unlink_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let owner_id = current_user(&req)?;
    let task = data
        .service
        .unlink_calendar(&path.into_inner(), &owner_id)
        .await?;
    Ok(HttpResponse::Ok().json(task))
}
