//! Test server management.
//!
//! Spawns and manages eventrelayd instances for integration testing.

use std::net::TcpListener;
use std::process::{Child, Command};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

pub const API_KEY: &str = "test-api-key";

/// A test server instance.
pub struct TestServer {
    child: Child,
    pub ws_port: u16,
    pub http_port: u16,
    pub metrics_port: u16,
    _dir: TempDir,
}

/// Reserve a free local port.
pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .map(|a| a.port())
        .expect("no free port")
}

impl TestServer {
    /// Spawn a relay with the default test configuration.
    #[allow(dead_code)]
    pub async fn spawn() -> anyhow::Result<Self> {
        Self::spawn_with("").await
    }

    /// Spawn a relay, appending `extra` TOML sections to the config.
    pub async fn spawn_with(extra: &str) -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;
        let ws_port = free_port();
        let http_port = free_port();
        let metrics_port = free_port();

        let config_path = dir.path().join("config.toml");
        let config_content = format!(
            r#"
[server]
name = "relay-test"
metrics_port = {metrics_port}

[listen]
websocket = "127.0.0.1:{ws_port}"
http = "127.0.0.1:{http_port}"

[api]
key = "{API_KEY}"

[election]
retry_interval_secs = 1
{extra}
"#
        );
        std::fs::write(&config_path, config_content)?;

        let child = Command::new(env!("CARGO_BIN_EXE_eventrelayd"))
            .arg(&config_path)
            .env("RUST_LOG", "eventrelay=debug")
            .spawn()?;

        let server = Self {
            child,
            ws_port,
            http_port,
            metrics_port,
            _dir: dir,
        };
        server.wait_until_ready().await?;
        Ok(server)
    }

    /// Wait until every listener is accepting connections.
    async fn wait_until_ready(&self) -> anyhow::Result<()> {
        for port in [self.ws_port, self.http_port, self.metrics_port] {
            let mut ready = false;
            for _ in 0..50 {
                if tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
                    ready = true;
                    break;
                }
                sleep(Duration::from_millis(100)).await;
            }
            if !ready {
                anyhow::bail!("Server failed to listen on {port} within 5 seconds");
            }
        }
        Ok(())
    }

    pub fn ws_url(&self, user: &str) -> String {
        format!("ws://127.0.0.1:{}/socket?user={}", self.ws_port, user)
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.http_port, path)
    }

    /// Attach a WebSocket client as `user`.
    pub async fn connect(&self, user: &str) -> anyhow::Result<super::client::TestClient> {
        super::client::TestClient::connect(&self.ws_url(user)).await
    }

    /// POST a JSON body to an authenticated API route.
    pub async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> anyhow::Result<reqwest::StatusCode> {
        let resp = reqwest::Client::new()
            .post(self.api_url(path))
            .bearer_auth(API_KEY)
            .json(body)
            .send()
            .await?;
        Ok(resp.status())
    }

    /// Fetch the Prometheus text output.
    pub async fn metrics(&self) -> anyhow::Result<String> {
        let url = format!("http://127.0.0.1:{}/metrics", self.metrics_port);
        Ok(reqwest::get(url).await?.text().await?)
    }

    /// Poll `/metrics` until it contains `line`.
    pub async fn wait_for_metric(&self, line: &str) -> bool {
        for _ in 0..50 {
            if self.metrics().await.is_ok_and(|m| m.lines().any(|l| l == line)) {
                return true;
            }
            sleep(Duration::from_millis(100)).await;
        }
        false
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
