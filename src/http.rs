//! HTTP servers: the publishing API and the Prometheus endpoint.
//!
//! - `POST /send` - JSON array of messages, each routed to a recipient's
//!   private address or to its channel
//! - `POST /updateUsers` - `{ "<userId>": ["channel", ...] }` full
//!   subscription replacements
//! - `POST /notify` - `{ "<userId>": <any JSON> }` written verbatim to
//!   every connection of the user
//! - `POST /slack` - inbound bridge webhook
//! - `GET /metrics` - served on its own port
//!
//! The API routes need `Authorization: Bearer <api.key>` and are only
//! mounted when a key is configured. The key is checked before the body is
//! decoded.

use axum::extract::{Form, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use http::{HeaderMap, StatusCode, header};
use relay_proto::{ChatMessage, ProtoError, channel_address, private_address, user_update_address};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bridge::{BridgeAdapter, IncomingForm, SlackBridge};
use crate::bus::{Bus, Payload};
use crate::error::RelayError;

/// Shared state of the API routes.
#[derive(Clone)]
pub struct ApiState {
    bus: Arc<dyn Bus>,
    api_key: Option<Arc<str>>,
    bridge: Option<Arc<SlackBridge>>,
}

impl ApiState {
    pub fn new(bus: Arc<dyn Bus>, api_key: Option<String>, bridge: Option<Arc<SlackBridge>>) -> Self {
        Self {
            bus,
            api_key: api_key.filter(|k| !k.is_empty()).map(Arc::from),
            bridge,
        }
    }
}

/// One item of a `/send` body.
#[derive(Debug, Deserialize)]
struct SendItem {
    #[serde(flatten)]
    message: ChatMessage,
    #[serde(default)]
    recipient: Option<String>,
}

impl SendItem {
    fn topic(&self) -> Result<String, RelayError> {
        self.message.validate()?;
        match (self.recipient.as_deref(), self.message.channel.as_deref()) {
            (Some(recipient), _) if !recipient.is_empty() => Ok(private_address(recipient)),
            (_, Some(channel)) => Ok(channel_address(channel)),
            _ => Err(RelayError::Unaddressed),
        }
    }
}

/// Build the API router for `state`.
pub fn api_router(state: ApiState) -> Router {
    let mut app = Router::new();
    if state.api_key.is_some() {
        app = app
            .route("/send", post(send_handler))
            .route("/updateUsers", post(update_users_handler))
            .route("/notify", post(notify_handler));
    } else {
        warn!("No api.key configured, /send, /updateUsers and /notify are disabled");
    }
    if state
        .bridge
        .as_ref()
        .is_some_and(|bridge| bridge.can_receive_incoming())
    {
        app = app.route("/slack", post(slack_handler));
    }
    app.with_state(state)
}

fn authorized(headers: &HeaderMap, key: Option<&str>) -> bool {
    let Some(key) = key else {
        return false;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|given| bool::from(given.as_bytes().ct_eq(key.as_bytes())))
}

fn error_response(status: StatusCode, err: &RelayError) -> Response {
    (status, Json(json!({ "error": err.to_string(), "code": err.error_code() }))).into_response()
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, RelayError> {
    serde_json::from_slice(body).map_err(|e| RelayError::from(ProtoError::from(e)))
}

async fn send_handler(State(state): State<ApiState>, headers: HeaderMap, body: Bytes) -> Response {
    if !authorized(&headers, state.api_key.as_deref()) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let items: Vec<SendItem> = match parse_body(&body) {
        Ok(items) => items,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e),
    };
    let _span = crate::telemetry::api_request("send", items.len()).entered();

    let mut routed = Vec::with_capacity(items.len());
    for item in items {
        match item.topic() {
            Ok(topic) => routed.push((topic, item.message)),
            Err(e) => return error_response(StatusCode::BAD_REQUEST, &e),
        }
    }

    let accepted = routed.len();
    for (topic, message) in routed {
        let consumers = state.bus.publish(&topic, Payload::from(message));
        debug!(%topic, consumers, "Published message");
    }
    crate::metrics::record_api_messages("send", accepted);
    Json(json!({ "accepted": accepted })).into_response()
}

async fn update_users_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !authorized(&headers, state.api_key.as_deref()) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let updates: HashMap<String, Vec<String>> = match parse_body(&body) {
        Ok(updates) => updates,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e),
    };
    let _span = crate::telemetry::api_request("updateUsers", updates.len()).entered();

    let accepted = updates.len();
    for (user_id, channels) in updates {
        if user_id.is_empty() {
            continue;
        }
        state
            .bus
            .publish(&user_update_address(&user_id), Payload::from(channels));
    }
    crate::metrics::record_api_messages("updateUsers", accepted);
    Json(json!({ "accepted": accepted })).into_response()
}

async fn notify_handler(State(state): State<ApiState>, headers: HeaderMap, body: Bytes) -> Response {
    if !authorized(&headers, state.api_key.as_deref()) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let notices: HashMap<String, Value> = match parse_body(&body) {
        Ok(notices) => notices,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e),
    };
    let _span = crate::telemetry::api_request("notify", notices.len()).entered();

    let mut accepted = 0;
    for (user_id, notice) in notices {
        if user_id.is_empty() {
            continue;
        }
        let frame = match serde_json::to_vec(&notice) {
            Ok(frame) => Bytes::from(frame),
            Err(e) => {
                warn!(user = %user_id, error = %e, "Failed to encode notice");
                continue;
            }
        };
        state.bus.publish(&private_address(&user_id), Payload::Raw(frame));
        accepted += 1;
    }
    crate::metrics::record_api_messages("notify", accepted);
    Json(json!({ "accepted": accepted })).into_response()
}

async fn slack_handler(State(state): State<ApiState>, Form(form): Form<IncomingForm>) -> StatusCode {
    let Some(bridge) = state.bridge.as_ref() else {
        return StatusCode::NOT_FOUND;
    };
    let _span = crate::telemetry::bridge_incoming(form.channel_name.as_deref()).entered();

    match bridge.translate_incoming(&form) {
        Ok(Some(message)) => {
            if let Some(channel) = message.channel.clone() {
                state.bus.publish(&channel_address(&channel), Payload::from(message));
            }
            StatusCode::OK
        }
        Ok(None) => StatusCode::OK,
        Err(e) => {
            debug!(error = %e, "Rejected inbound bridge post");
            StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_REQUEST)
        }
    }
}

/// Serve `app` on `listener` until `shutdown` fires.
pub async fn serve(listener: TcpListener, app: Router, shutdown: CancellationToken) {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "HTTP API listening");
    }
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;
    if let Err(e) = result {
        tracing::error!("HTTP server error: {}", e);
    }
}

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

/// Run the HTTP server for Prometheus metrics.
///
/// Binds to `0.0.0.0:port` and serves the `/metrics` endpoint.
/// This is a long-running task that should be spawned in the background.
pub async fn run_metrics_server(port: u16) {
    let app = Router::new().route("/metrics", get(metrics_handler));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Prometheus HTTP server listening on {}", addr);

    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind HTTP server on {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("HTTP server error: {}", e);
    }
}
