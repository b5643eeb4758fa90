//! Test WebSocket client.
//!
//! Attaches to the relay and decodes the envelopes it receives.

use futures_util::{SinkExt, StreamExt};
use relay_proto::ChatEnvelope;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// A test relay client.
pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    /// Connect to `url`.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let (ws, _response) = connect_async(url).await?;
        Ok(Self { ws })
    }

    /// Receive a single envelope.
    pub async fn recv(&mut self) -> anyhow::Result<ChatEnvelope> {
        self.recv_timeout(Duration::from_secs(5)).await
    }

    /// Receive an envelope with a timeout.
    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<ChatEnvelope> {
        let text = self.next_text(dur).await?;
        Ok(ChatEnvelope::from_slice(text.as_bytes())?)
    }

    /// Receive the next text frame as plain JSON.
    #[allow(dead_code)]
    pub async fn recv_json(&mut self) -> anyhow::Result<serde_json::Value> {
        let text = self.next_text(Duration::from_secs(5)).await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn next_text(&mut self, dur: Duration) -> anyhow::Result<String> {
        loop {
            let frame = timeout(dur, self.ws.next())
                .await?
                .ok_or_else(|| anyhow::anyhow!("connection closed"))??;
            match frame {
                Message::Text(text) => return Ok(text),
                Message::Close(_) => anyhow::bail!("connection closed"),
                _ => continue,
            }
        }
    }

    /// Assert nothing arrives within `dur`.
    #[allow(dead_code)]
    pub async fn expect_silence(&mut self, dur: Duration) -> bool {
        self.recv_timeout(dur).await.is_err()
    }

    /// Close the connection cleanly.
    #[allow(dead_code)]
    pub async fn close(mut self) -> anyhow::Result<()> {
        self.ws.send(Message::Close(None)).await?;
        while let Some(Ok(_)) = self.ws.next().await {}
        Ok(())
    }
}
