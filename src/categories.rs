// src/categories.rs

use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;

use crate::app_state::AppState;
use crate::auth::current_user;
use crate::error::ServiceError;
use crate::models::{CategoryPatch, NewCategory};

/// GET /api/categories
/// Lists the caller's categories sorted by name.
pub async fn list_categories(
    req: HttpRequest,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ServiceError> {
    let owner_id = current_user(&req)?;
    let categories = data.service.list_categories(&owner_id).await?;
    Ok(HttpResponse::Ok().json(categories))
}

/// POST /api/categories
pub async fn create_category(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<NewCategory>,
) -> Result<HttpResponse, ServiceError> {
    let owner_id = current_user(&req)?;
    let category = data
        .service
        .create_category(&owner_id, body.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(category))
}

/// PUT /api/categories/{id}
pub async fn update_category(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<CategoryPatch>,
) -> Result<HttpResponse, ServiceError> {
    let owner_id = current_user(&req)?;
    let category = data
        .service
        .update_category(&path.into_inner(), &owner_id, body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(category))
}

/// DELETE /api/categories/{id}
/// Tasks in the category become uncategorized.
pub async fn delete_category(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let owner_id = current_user(&req)?;
    data.service
        .delete_category(&path.into_inner(), &owner_id)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Category deleted successfully" })))
}
