use crate::error::AppError;
use crate::middleware::auth::{bearer_token, verify_jwt};
use crate::state::AppState;
use crate::websocket::events::WsOutboundEvent;
use crate::websocket::message_types::WsInboundEvent;
use crate::websocket::session::{run_session, ConnectionContext, SessionEvent};
use crate::websocket::ConnectionId;
use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use error_types::error_codes;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

// WebSocket Actor
struct WsSession {
    connection: ConnectionId,
    user_id: Uuid,
    events: UnboundedSender<SessionEvent>,
    // Taken in `started` and attached as a stream
    outbound: Option<UnboundedReceiver<String>>,
    hb: Instant,
    heartbeat_interval: Duration,
    client_timeout: Duration,
}

impl WsSession {
    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let timeout = self.client_timeout;
        ctx.run_interval(self.heartbeat_interval, move |act, ctx| {
            if Instant::now().duration_since(act.hb) > timeout {
                tracing::warn!(connection = %act.connection, "WebSocket heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn reject_frame(&self, ctx: &mut ws::WebsocketContext<Self>, reason: &str) {
        let err = AppError::validation(error_codes::VALIDATION_FAILED, reason);
        if let Ok(payload) = WsOutboundEvent::from_error(&err).to_payload() {
            ctx.text(payload);
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(
            connection = %self.connection,
            user_id = %self.user_id,
            "WebSocket session started"
        );

        self.hb(ctx);

        // Bridge the registry's channel into this actor
        if let Some(rx) = self.outbound.take() {
            ctx.add_stream(UnboundedReceiverStream::new(rx));
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(
            connection = %self.connection,
            user_id = %self.user_id,
            "WebSocket session stopped"
        );
        // Queued behind anything still pending, so in-flight events finish first
        let _ = self.events.send(SessionEvent::Closed);
    }
}

// Frames pushed by the broadcast router
impl StreamHandler<String> for WsSession {
    fn handle(&mut self, frame: String, ctx: &mut Self::Context) {
        ctx.text(frame);
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        // Registry dropped this connection
        ctx.stop();
    }
}

// Handle WebSocket protocol messages
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
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                match serde_json::from_str::<WsInboundEvent>(&text) {
                    Ok(evt) => {
                        if self.events.send(SessionEvent::Inbound(evt)).is_err() {
                            ctx.stop();
                        }
                    }
                    Err(e) => {
                        tracing::warn!(connection = %self.connection, error = %e, "Failed to parse WS message");
                        self.reject_frame(ctx, "malformed event");
                    }
                }
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!("Binary WebSocket messages not supported");
                self.reject_frame(ctx, "binary frames are not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::info!(connection = %self.connection, ?reason, "WebSocket close message received");
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                tracing::warn!(connection = %self.connection, error = %e, "WebSocket protocol error");
                ctx.stop();
            }
            _ => {}
        }
    }
}

// HTTP handler
#[get("/ws")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    query: web::Query<WsParams>,
) -> Result<HttpResponse, Error> {
    // Authentication: query token first, then the Authorization header
    let token = query.into_inner().token.or_else(|| bearer_token(&req));
    let Some(token) = token else {
        tracing::warn!("WebSocket connection rejected: no token");
        return Err(AppError::Unauthorized.into());
    };
    let user_id = verify_jwt(&token, &state.config.jwt_secret)?.user_id()?;
    // Tokens outlive deleted accounts
    if state.store.find_user(user_id).await?.is_none() {
        tracing::warn!(%user_id, "WebSocket connection rejected: unknown user");
        return Err(AppError::Unauthorized.into());
    }

    let connection = ConnectionId::new();
    let (outbound_tx, outbound_rx) = unbounded_channel();
    let (events_tx, events_rx) = unbounded_channel();

    state.registry.open(connection, outbound_tx);
    let ctx = ConnectionContext {
        connection,
        authenticated_user: user_id,
    };
    actix::spawn(run_session(state.get_ref().clone(), ctx, events_rx));

    let session = WsSession {
        connection,
        user_id,
        events: events_tx,
        outbound: Some(outbound_rx),
        hb: Instant::now(),
        heartbeat_interval: state.config.ws.heartbeat_interval,
        client_timeout: state.config.ws.client_timeout,
    };

    // On failure the session is dropped, which closes the worker's queue and
    // runs the usual teardown
    ws::start(session, &req, stream)
}
