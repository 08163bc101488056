// src/main.rs

use std::io;
use std::sync::Arc;

use actix::Actor;
use actix_cors::Cors;
use actix_web::{http, middleware::Logger, web, App, HttpServer};
use env_logger::Env;
use log::info;

use taskline::app_state::AppState;
use taskline::attachment_store::{AttachmentStore, DiskAttachmentStore};
use taskline::auth::{Authentication, JwtIdentity};
use taskline::calendar::{CalendarProvider, MemoryCalendar, MongoCalendar};
use taskline::config::{Config, StorageBackend};
use taskline::db::MongoDB;
use taskline::event_hub::EventHub;
use taskline::repository::memory::{MemoryCategoryRepository, MemoryTaskRepository};
use taskline::repository::mongo::{MongoCategoryRepository, MongoTaskRepository};
use taskline::repository::{CategoryRepository, TaskRepository};
use taskline::service::TaskService;

type Backends = (
    Arc<dyn TaskRepository>,
    Arc<dyn CategoryRepository>,
    Arc<dyn CalendarProvider>,
);

async fn open_backends(config: &Config) -> io::Result<Backends> {
    match config.storage_backend {
        StorageBackend::Memory => {
            info!("Using in-memory storage");
            Ok((
                Arc::new(MemoryTaskRepository::new()),
                Arc::new(MemoryCategoryRepository::new()),
                Arc::new(MemoryCalendar::new()),
            ))
        }
        StorageBackend::Mongo => {
            let uri = config.mongo_uri.as_deref().unwrap_or_default();
            let mongodb = MongoDB::init(uri, &config.database_name)
                .await
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

            let tasks = MongoTaskRepository::new(&mongodb);
            let categories = MongoCategoryRepository::new(&mongodb);
            tasks
                .ensure_indexes()
                .await
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            categories
                .ensure_indexes()
                .await
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

            Ok((
                Arc::new(tasks),
                Arc::new(categories),
                Arc::new(MongoCalendar::new(&mongodb)),
            ))
        }
    }
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = Config::from_env().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let (tasks, categories, calendar) = open_backends(&config).await?;
    let files: Arc<dyn AttachmentStore> = Arc::new(DiskAttachmentStore::open(&config.upload_dir).await?);

    // One hub per process; every session registers with it.
    let hub = EventHub::new().start();
    let service = TaskService::new(tasks, categories, files, calendar, Arc::new(hub.clone()))
        .with_external_timeout(config.external_call_timeout);

    let state = AppState {
        service: Arc::new(service),
        hub,
        identity: JwtIdentity::new(&config.jwt_secret),
        config: config.clone(),
    };

    info!("Server running at http://{}", config.bind_addr);
    info!("Allowed CORS Origin: {}", config.frontend_origin);

    let bind_addr = config.bind_addr.clone();
    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&state.config.frontend_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                http::header::CONTENT_TYPE,
                http::header::ACCEPT,
                http::header::AUTHORIZATION,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Authentication::new(state.identity.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(taskline::configure)
            .service(taskline::upload_files(state.config.upload_dir.clone()))
    })
    .bind(bind_addr)?
    .run()
    .await
}
