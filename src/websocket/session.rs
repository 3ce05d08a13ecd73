use actix::prelude::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::hub::{Connect, Disconnect, Inbound, RelayHub};
use crate::config::RelayConfig;
use crate::error::WebSocketError;
use crate::relay::{ClientEvent, ConnectionId, ServerEvent};
use crate::AppState;

/// Decodes one text frame into a client event.
pub fn decode_frame(text: &str) -> Result<ClientEvent, WebSocketError> {
    Ok(serde_json::from_str(text)?)
}

pub fn encode_event(event: &ServerEvent) -> Result<String, WebSocketError> {
    Ok(serde_json::to_string(event)?)
}

/// Upgrades `GET /ws` to a relay session.
pub async fn relay_route(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> std::result::Result<HttpResponse, Error> {
    let peer_addr = req.peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    info!("New WebSocket connection request from: {}", peer_addr);

    ws::start(
        RelaySession::new(state.hub.clone(), peer_addr, &state.config.relay),
        &req,
        stream,
    )
}

/// One client connection. Inbound frames go to the hub, events the hub
/// routes to this connection come back through an unbounded channel.
pub struct RelaySession {
    hub: Addr<RelayHub>,
    peer_addr: String,
    id: ConnectionId,
    last_heartbeat: Instant,
    heartbeat_interval: Duration,
    client_timeout: Duration,
}

impl RelaySession {
    pub fn new(hub: Addr<RelayHub>, peer_addr: String, config: &RelayConfig) -> Self {
        Self {
            hub,
            peer_addr,
            id: ConnectionId::new(),
            last_heartbeat: Instant::now(),
            heartbeat_interval: config.heartbeat_interval(),
            client_timeout: config.client_timeout(),
        }
    }

    fn handle_text(&mut self, text: &str) {
        match decode_frame(text) {
            Ok(event) => {
                self.hub.do_send(Inbound { id: self.id, event });
            }
            Err(e) => {
                // No reply channel in this protocol, so the frame is dropped.
                warn!("Dropping frame from {} (connection {}): {}", self.peer_addr, self.id, e);
            }
        }
    }

    fn start_heartbeat(&self, ctx: &mut <Self as Actor>::Context) {
        ctx.run_interval(self.heartbeat_interval, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > act.client_timeout {
                warn!("Heartbeat timeout for connection {} ({})", act.id, act.peer_addr);
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for RelaySession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("WebSocket connection established with {} (id: {})", self.peer_addr, self.id);

        let (tx, rx) = mpsc::unbounded_channel::<ServerEvent>();
        ctx.add_stream(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        }));
        self.hub.do_send(Connect { id: self.id, sender: tx });

        self.start_heartbeat(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!("WebSocket connection closed with {} (id: {})", self.peer_addr, self.id);
        self.hub.do_send(Disconnect { id: self.id });
    }
}

/// Events routed to this connection by the hub.
impl StreamHandler<ServerEvent> for RelaySession {
    fn handle(&mut self, event: ServerEvent, ctx: &mut Self::Context) {
        match encode_event(&event) {
            Ok(json_str) => ctx.text(json_str),
            Err(e) => error!("Failed to serialize {} for connection {}: {}", event.name(), self.id, e),
        }
    }
}

impl StreamHandler<std::result::Result<ws::Message, ws::ProtocolError>> for RelaySession {
    fn handle(&mut self, msg: std::result::Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                self.handle_text(&text);
            }
            Ok(ws::Message::Binary(bin)) => {
                let e = WebSocketError::UnsupportedFrame(format!("binary, {} bytes", bin.len()));
                warn!("Dropping frame from {}: {}", self.peer_addr, e);
            }
            Ok(ws::Message::Close(reason)) => {
                info!("WebSocket closed from {}: {:?}", self.peer_addr, reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => {
                // Continuation and Nop frames carry no events
            }
            Err(e) => {
                error!("Error handling WebSocket message from {}: {}", self.peer_addr, e);
                ctx.stop();
            }
        }
    }
}
