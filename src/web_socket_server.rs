use actix::prelude::*;
use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use log::{debug, warn};
use serde::Deserialize;
use std::time::{Duration, Instant};

use crate::app_state::AppState;
use crate::auth::OwnerId;
use crate::error::ServiceError;
use crate::event_hub::{Connect, Disconnect, EventHub, LiveMessage};
//web_socket_server.rs

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// One live connection. Joins the owner's channel on start and leaves it on
/// stop; incoming text frames are ignored.
pub struct WsSession {
    pub owner_id: String,
    pub hb: Instant,
    pub hub: Addr<EventHub>,
}

impl WsSession {
    pub fn new(owner_id: String, hub: Addr<EventHub>) -> Self {
        WsSession {
            owner_id,
            hb: Instant::now(),
            hub,
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                warn!("WebSocket heartbeat failed for {}, disconnecting", act.owner_id);
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.hb(ctx);
        self.hub.do_send(Connect {
            owner_id: self.owner_id.clone(),
            addr: ctx.address().recipient(),
        });
    }

    fn stopped(&mut self, ctx: &mut Self::Context) {
        self.hub.do_send(Disconnect {
            owner_id: self.owner_id.clone(),
            addr: ctx.address().recipient(),
        });
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(_)) | Ok(ws::Message::Binary(_)) => {
                debug!("Ignoring client frame from {}", self.owner_id);
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                warn!("WebSocket error for {}: {}", self.owner_id, e);
                ctx.stop();
            }
            _ => {}
        }
    }
}

impl Handler<LiveMessage> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: LiveMessage, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// Browsers cannot set headers on a WebSocket handshake, so the token may
/// also arrive as `?token=`.
pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    query: web::Query<WsQuery>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let from_header = req.extensions().get::<OwnerId>().map(|o| o.0.clone());
    let owner_id = match (from_header, query.token.as_deref()) {
        (Some(owner), _) => owner,
        (None, Some(token)) => data.identity.resolve(token)?,
        (None, None) => return Err(ServiceError::Unauthenticated("Unauthorized".into()).into()),
    };

    ws::start(WsSession::new(owner_id, data.hub.clone()), &req, stream)
}
