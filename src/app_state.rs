use std::sync::Arc;

use actix::Addr;

use crate::auth::JwtIdentity;
use crate::config::Config;
use crate::event_hub::EventHub;
use crate::service::TaskService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TaskService>,
    pub hub: Addr<EventHub>,
    pub identity: JwtIdentity,
    pub config: Config,
}
