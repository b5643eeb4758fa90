//! Integration tests for subscription, fan-out and connection lifecycle.

mod common;

use common::TestServer;
use common::server::API_KEY;
use serde_json::json;
use std::time::Duration;

const QUIET: Duration = Duration::from_millis(400);

/// Subscription updates are applied asynchronously by the user's consumer.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn channel_message_reaches_only_subscribers() {
    let server = TestServer::spawn().await.expect("Failed to spawn test server");
    let mut alice = server.connect("alice").await.unwrap();
    let mut alice_tab = server.connect("alice").await.unwrap();
    let mut bob = server.connect("bob").await.unwrap();

    let status = server
        .post_json("/updateUsers", &json!({"alice": ["general"]}))
        .await
        .unwrap();
    assert_eq!(status, 200);
    settle().await;

    let status = server
        .post_json(
            "/send",
            &json!([{"channel": "general", "senderId": "sys", "senderDisplayName": "System", "text": "hello"}]),
        )
        .await
        .unwrap();
    assert_eq!(status, 200);

    let first = alice.recv().await.unwrap();
    let second = alice_tab.recv().await.unwrap();
    assert_eq!(first.message.text.as_deref(), Some("hello"));
    assert_eq!(first.message.channel.as_deref(), Some("general"));
    assert_eq!(first, second);
    assert!(bob.expect_silence(QUIET).await);
}

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let server = TestServer::spawn().await.unwrap();
    let mut alice = server.connect("alice").await.unwrap();

    server.post_json("/updateUsers", &json!({"alice": ["a", "b"]})).await.unwrap();
    settle().await;
    server.post_json("/updateUsers", &json!({"alice": ["b"]})).await.unwrap();
    settle().await;

    let send = |channel: &str, text: &str| {
        json!([{"channel": channel, "senderId": "sys", "senderDisplayName": "System", "text": text}])
    };
    server.post_json("/send", &send("a", "dropped")).await.unwrap();
    server.post_json("/send", &send("b", "kept")).await.unwrap();

    let env = alice.recv().await.unwrap();
    assert_eq!(env.message.text.as_deref(), Some("kept"));
    assert!(alice.expect_silence(QUIET).await);
}

#[tokio::test]
async fn direct_message_reaches_every_connection_of_recipient() {
    let server = TestServer::spawn().await.unwrap();
    let mut x1 = server.connect("x").await.unwrap();
    let mut x2 = server.connect("x").await.unwrap();
    let mut y = server.connect("y").await.unwrap();

    let status = server
        .post_json(
            "/send",
            &json!([
                {"recipient": "x", "senderId": "y", "senderDisplayName": "Y", "text": "psst"},
                {"recipient": "nobody", "senderId": "y", "senderDisplayName": "Y", "text": "lost"}
            ]),
        )
        .await
        .unwrap();
    assert_eq!(status, 200);

    let a = x1.recv().await.unwrap();
    let b = x2.recv().await.unwrap();
    assert_eq!(a, b);
    assert_eq!(a.message.text.as_deref(), Some("psst"));
    assert!(y.expect_silence(QUIET).await);
}

#[tokio::test]
async fn notify_writes_payload_verbatim() {
    let server = TestServer::spawn().await.unwrap();
    let mut x = server.connect("x").await.unwrap();
    let mut y = server.connect("y").await.unwrap();

    let status = server
        .post_json("/notify", &json!({"x": {"kind": "badge", "count": 2}}))
        .await
        .unwrap();
    assert_eq!(status, 200);

    assert_eq!(x.recv_json().await.unwrap(), json!({"kind": "badge", "count": 2}));
    assert!(y.expect_silence(QUIET).await);
}

#[tokio::test]
async fn percent_encoded_user_id_is_decoded() {
    let server = TestServer::spawn().await.unwrap();
    let url = format!("ws://127.0.0.1:{}/socket?user=a%40b", server.ws_port);
    let mut client = common::TestClient::connect(&url).await.unwrap();

    server
        .post_json(
            "/send",
            &json!([{"recipient": "a@b", "senderId": "s", "senderDisplayName": "S", "text": "hi"}]),
        )
        .await
        .unwrap();
    let env = client.recv().await.unwrap();
    assert_eq!(env.message.text.as_deref(), Some("hi"));
}

#[tokio::test]
async fn last_disconnect_removes_user() {
    let server = TestServer::spawn().await.unwrap();
    let first = server.connect("alice").await.unwrap();
    let second = server.connect("alice").await.unwrap();
    assert!(server.wait_for_metric("relay_connected_users 1").await);
    assert!(server.wait_for_metric("relay_live_connections 2").await);

    first.close().await.unwrap();
    assert!(server.wait_for_metric("relay_live_connections 1").await);
    assert!(server.wait_for_metric("relay_connected_users 1").await);

    second.close().await.unwrap();
    assert!(server.wait_for_metric("relay_connected_users 0").await);
    assert!(server.wait_for_metric("relay_live_connections 0").await);
}

#[tokio::test]
async fn handshake_without_user_is_rejected() {
    let server = TestServer::spawn().await.unwrap();
    let url = format!("ws://127.0.0.1:{}/socket", server.ws_port);
    assert!(tokio_tungstenite::connect_async(url).await.is_err());
}

#[tokio::test]
async fn api_rejects_missing_key_before_reading_body() {
    let server = TestServer::spawn().await.unwrap();
    let resp = reqwest::Client::new()
        .post(server.api_url("/send"))
        .header("content-type", "application/json")
        .body("[{broken")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn api_requires_bearer_key() {
    let server = TestServer::spawn().await.unwrap();
    let client = reqwest::Client::new();
    let body = json!([{"channel": "general", "senderId": "sys", "text": "x"}]);

    let resp = client.post(server.api_url("/send")).json(&body).send().await.unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .post(server.api_url("/send"))
        .bearer_auth(format!("{API_KEY}-wrong"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn message_without_address_is_rejected() {
    let server = TestServer::spawn().await.unwrap();
    let status = server
        .post_json("/send", &json!([{"senderId": "sys", "text": "nowhere"}]))
        .await
        .unwrap();
    assert_eq!(status, 400);
}
