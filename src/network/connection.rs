//! One live WebSocket client.
//!
//! Owns the outbound queue whose sender is registered with the user as its
//! connection handle. Inbound frames carry nothing for the relay and are
//! ignored; the task ends on close or error and detaches the connection.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::state::{Connection, UserRegistry};

pub struct WsConnection {
    user_id: String,
    addr: SocketAddr,
    registry: Arc<UserRegistry>,
    queue: usize,
}

impl WsConnection {
    pub fn new(user_id: String, addr: SocketAddr, registry: Arc<UserRegistry>, queue: usize) -> Self {
        Self {
            user_id,
            addr,
            registry,
            queue: queue.max(1),
        }
    }

    /// Attach, pump frames until the client goes away, then detach.
    pub async fn run(self, ws: WebSocketStream<TcpStream>) {
        let (tx, mut rx) = mpsc::channel::<Bytes>(self.queue);
        let handle = Connection::new(tx);
        let connection_id = handle.id();

        let user = match self.registry.attach_connection(&self.user_id, handle) {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Failed to attach connection");
                let (mut sink, _) = ws.split();
                let _ = sink.send(WsMessage::Close(None)).await;
                return;
            }
        };
        info!(addr = %self.addr, connection = %connection_id, "Client attached");

        let (mut sink, mut stream) = ws.split();
        loop {
            tokio::select! {
                frame = rx.recv() => {
                    let Some(frame) = frame else { break };
                    if let Err(e) = sink.send(to_ws_message(frame)).await {
                        debug!(error = %e, "Write failed, closing");
                        break;
                    }
                }
                incoming = stream.next() => match incoming {
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "Read failed, closing");
                        break;
                    }
                },
            }
        }

        let removed = self.registry.detach_connection(&user, connection_id);
        info!(connection = %connection_id, user_removed = removed, "Client detached");
    }
}

/// Envelopes are JSON; anything else goes out as binary.
fn to_ws_message(frame: Bytes) -> WsMessage {
    match String::from_utf8(frame.to_vec()) {
        Ok(text) => WsMessage::Text(text),
        Err(e) => WsMessage::Binary(e.into_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_frames_become_text() {
        assert!(matches!(to_ws_message(Bytes::from_static(b"{\"a\":1}")), WsMessage::Text(t) if t == "{\"a\":1}"));
        assert!(matches!(to_ws_message(Bytes::from_static(&[0xff, 0x00])), WsMessage::Binary(b) if b == vec![0xff, 0x00]));
    }
}
