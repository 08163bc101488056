// src/event_hub.rs

use std::collections::HashMap;

use actix::prelude::*;
use log::{debug, error, info};

use crate::events::{EventPublisher, LiveEvent};

/// Serialized event text delivered to one WebSocket session.
#[derive(Message, Clone, Debug)]
#[rtype(result = "()")]
pub struct LiveMessage(pub String);

#[derive(Message)]
#[rtype(result = "()")]
pub struct Connect {
    pub owner_id: String,
    pub addr: Recipient<LiveMessage>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub owner_id: String,
    pub addr: Recipient<LiveMessage>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Publish {
    pub owner_id: String,
    pub event: LiveEvent,
}

/// Number of open sessions for one owner.
#[derive(Message)]
#[rtype(result = "usize")]
pub struct SessionCount {
    pub owner_id: String,
}

/// Routes events to the sessions of the owning user only.
///
/// Delivery is at-most-once: nothing is buffered for owners without an open
/// session.
#[derive(Default)]
pub struct EventHub {
    // One owner may have several sessions (tabs, devices).
    sessions: HashMap<String, Vec<Recipient<LiveMessage>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Actor for EventHub {
    type Context = Context<Self>;
}

impl Handler<Connect> for EventHub {
    type Result = ();

    fn handle(&mut self, msg: Connect, _: &mut Context<Self>) {
        info!("User {} connected (WS)", msg.owner_id);
        self.sessions.entry(msg.owner_id).or_default().push(msg.addr);
    }
}

impl Handler<Disconnect> for EventHub {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _: &mut Context<Self>) {
        info!("User {} disconnected (WS)", msg.owner_id);
        if let Some(addrs) = self.sessions.get_mut(&msg.owner_id) {
            // Remove only the connection that matches the provided address.
            addrs.retain(|a| a != &msg.addr);
            if addrs.is_empty() {
                self.sessions.remove(&msg.owner_id);
            }
        }
    }
}

impl Handler<Publish> for EventHub {
    type Result = ();

    fn handle(&mut self, msg: Publish, _: &mut Context<Self>) {
        let Some(addrs) = self.sessions.get(&msg.owner_id) else {
            debug!("No live sessions for {}, dropping {}", msg.owner_id, msg.event.name());
            return;
        };
        let text = match serde_json::to_string(&msg.event) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to serialize {}: {}", msg.event.name(), e);
                return;
            }
        };
        for addr in addrs {
            addr.do_send(LiveMessage(text.clone()));
        }
        debug!("{} sent to {} session(s) of {}", msg.event.name(), addrs.len(), msg.owner_id);
    }
}

impl Handler<SessionCount> for EventHub {
    type Result = usize;

    fn handle(&mut self, msg: SessionCount, _: &mut Context<Self>) -> usize {
        self.sessions.get(&msg.owner_id).map_or(0, Vec::len)
    }
}

impl EventPublisher for Addr<EventHub> {
    fn publish(&self, owner_id: &str, event: LiveEvent) {
        self.do_send(Publish {
            owner_id: owner_id.to_string(),
            event,
        });
    }
}
