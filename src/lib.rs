// src/lib.rs

pub mod app_state;
pub mod attachment_store;
pub mod auth;
pub mod best_effort;
pub mod calendar;
pub mod calendar_endpoints;
pub mod categories;
pub mod config;
pub mod db;
pub mod error;
pub mod event_hub;
pub mod events;
pub mod models;
pub mod repository;
pub mod service;
pub mod task_form;
pub mod tasks;
pub mod web_socket_server;

use std::path::PathBuf;

use actix_files::Files;
use actix_web::web;

use crate::attachment_store::PUBLIC_PREFIX;
use crate::error::ServiceError;

use crate::calendar_endpoints::{link_task, sync_calendar, unlink_task};
use crate::categories::{create_category, delete_category, list_categories, update_category};
use crate::tasks::{create_task, delete_task, get_task, list_tasks, remove_attachment, update_task};
use crate::web_socket_server::ws_index;

/// Registers the REST API under `/api` and the live channel at `/ws`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .app_data(json_config())
            // TASKS
            .service(
                web::scope("/tasks")
                    .route("", web::get().to(list_tasks))
                    .route("", web::post().to(create_task))
                    .route("/{task_id}", web::get().to(get_task))
                    .route("/{task_id}", web::put().to(update_task))
                    .route("/{task_id}", web::delete().to(delete_task))
                    .route(
                        "/{task_id}/attachments/{attachment_id}",
                        web::delete().to(remove_attachment),
                    ),
            )
            // CATEGORIES
            .service(
                web::scope("/categories")
                    .route("", web::get().to(list_categories))
                    .route("", web::post().to(create_category))
                    .route("/{category_id}", web::put().to(update_category))
                    .route("/{category_id}", web::delete().to(delete_category)),
            )
            // CALENDAR
            .service(
                web::scope("/calendar")
                    .route("/sync", web::post().to(sync_calendar))
                    .route("/task/{task_id}", web::post().to(link_task))
                    .route("/task/{task_id}", web::delete().to(unlink_task)),
            ),
    )
    // WEBSOCKET route for real-time
    .service(web::resource("/ws").route(web::get().to(ws_index)));
}

/// Malformed JSON bodies answer like every other validation failure.
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| ServiceError::validation(err.to_string()).into())
}

/// Serves stored attachments read-only at `/uploads/<storedName>`.
pub fn upload_files(upload_dir: impl Into<PathBuf>) -> Files {
    Files::new(PUBLIC_PREFIX, upload_dir.into())
}
