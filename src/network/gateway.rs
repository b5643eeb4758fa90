//! Gateway - WebSocket listener that accepts client connections.
//!
//! Identity is established upstream; the handshake path carries it as
//! `/socket?user=<id>`, percent-encoded. The gateway only checks that it is
//! present and that the Origin is allowed, then hands the stream to a
//! [`WsConnection`].

use percent_encoding::percent_decode_str;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, instrument, warn};

use super::WsConnection;
use crate::state::UserRegistry;

/// Path clients attach on.
pub const SOCKET_PATH: &str = "/socket";

/// The Gateway accepts WebSocket connections and spawns their tasks.
pub struct Gateway {
    listener: TcpListener,
    allow_origins: Arc<[String]>,
    connection_queue: usize,
    registry: Arc<UserRegistry>,
}

impl Gateway {
    /// Bind the gateway to `addr`.
    pub async fn bind(
        addr: SocketAddr,
        allow_origins: Vec<String>,
        connection_queue: usize,
        registry: Arc<UserRegistry>,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(address = %listener.local_addr()?, "WebSocket listener bound");
        Ok(Self {
            listener,
            allow_origins: allow_origins.into(),
            connection_queue,
            registry,
        })
    }

    /// Run the gateway until `shutdown` fires.
    #[instrument(skip_all, name = "gateway")]
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };
            let (stream, addr) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "Failed to accept WebSocket connection");
                    continue;
                }
            };

            let registry = Arc::clone(&self.registry);
            let allowed = Arc::clone(&self.allow_origins);
            let queue = self.connection_queue;
            tokio::spawn(async move {
                let mut user_id: Option<String> = None;
                let callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
                    check_origin(req, &allowed, addr)?;
                    user_id = Some(user_from_request(req)?);
                    Ok(response)
                };

                let ws_stream = match accept_hdr_async(stream, callback).await {
                    Ok(ws) => ws,
                    Err(e) => {
                        warn!(%addr, error = %e, "WebSocket handshake failed");
                        return;
                    }
                };
                let Some(user_id) = user_id else {
                    return;
                };

                let span = crate::telemetry::connection(&user_id, &addr.to_string());
                let connection = WsConnection::new(user_id, addr, registry, queue);
                connection.run(ws_stream).instrument(span).await;
            });
        }
        info!("Gateway stopped");
        Ok(())
    }
}

fn reject(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}

/// Empty `allowed` accepts every origin.
#[allow(clippy::result_large_err)]
fn check_origin(req: &Request, allowed: &[String], addr: SocketAddr) -> Result<(), ErrorResponse> {
    if allowed.is_empty() {
        return Ok(());
    }
    if let Some(origin) = req.headers().get("Origin").and_then(|o| o.to_str().ok()) {
        if allowed.iter().any(|a| a == origin || a == "*") {
            return Ok(());
        }
        warn!(%addr, %origin, "WebSocket origin rejected");
    }
    Err(reject(StatusCode::FORBIDDEN, "origin not allowed"))
}

#[allow(clippy::result_large_err)]
fn user_from_request(req: &Request) -> Result<String, ErrorResponse> {
    if req.uri().path().trim_end_matches('/') != SOCKET_PATH {
        return Err(reject(StatusCode::NOT_FOUND, "unknown path"));
    }
    req.uri()
        .query()
        .and_then(user_from_query)
        .ok_or_else(|| reject(StatusCode::BAD_REQUEST, "missing user"))
}

/// Decoded `user` parameter. Invalid UTF-8 counts as missing.
fn user_from_query(query: &str) -> Option<String> {
    let (_, raw) = query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "user")?;
    let user = percent_decode_str(raw).decode_utf8().ok()?;
    (!user.is_empty()).then(|| user.into_owned())
}
