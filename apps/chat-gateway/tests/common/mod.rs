#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use futures_util::StreamExt;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use chat_gateway::auth::directory::MemoryUserDirectory;
use chat_gateway::auth::tokens::{AccessClaims, JwtVerifier};
use chat_gateway::config::Config;
use chat_gateway::gateway::gate::ConnectionGate;
use chat_gateway::gateway::Gateway;
use chat_gateway::AppState;

pub const TEST_SECRET: &str = "test-secret";
pub const INTERNAL_KEY: &str = "internal-test-key";

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub fn test_config() -> Config {
    Config {
        jwt_secret: TEST_SECRET.to_string(),
        port: 0,
        user_directory_url: None,
        auth_timeout: Duration::from_secs(1),
        outbound_buffer: 64,
        internal_api_key: Some(INTERNAL_KEY.to_string()),
    }
}

/// App state whose user directory knows alice, bob and carol.
pub fn test_state_with(config: Config) -> AppState {
    let gate = ConnectionGate::new(
        Arc::new(JwtVerifier::new(&config.jwt_secret)),
        Arc::new(MemoryUserDirectory::with_users(["alice", "bob", "carol"])),
        config.auth_timeout,
    );
    AppState {
        gateway: Arc::new(Gateway::new(gate)),
        config: Arc::new(config),
    }
}

pub fn test_state() -> AppState {
    test_state_with(test_config())
}

/// Build the full application router wired to the test state.
pub fn test_app() -> (Router, AppState) {
    let state = test_state();
    let app = chat_gateway::routes::router().with_state(state.clone());
    (app, state)
}

/// Start a real TCP server for WebSocket testing. The server runs in the
/// background for the rest of the test.
pub async fn start_server() -> (SocketAddr, AppState) {
    let (app, state) = test_app();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

fn mint(user_id: &str, exp_offset_secs: i64) -> String {
    let claims = AccessClaims {
        sub: user_id.to_string(),
        name: format!("{user_id} test"),
        avatar: None,
        role: "USER".to_string(),
        exp: chrono::Utc::now().timestamp() + exp_offset_secs,
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("mint test token")
}

pub fn mint_token(user_id: &str) -> String {
    mint(user_id, 300)
}

pub fn mint_expired_token(user_id: &str) -> String {
    mint(user_id, -600)
}

/// Open a socket with the token in the query string (or none at all).
pub async fn connect(addr: SocketAddr, token: Option<&str>) -> Ws {
    let url = match token {
        Some(token) => format!("ws://{addr}/socket?token={token}"),
        None => format!("ws://{addr}/socket"),
    };
    let (ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .expect("ws connect");
    ws
}

/// Open a socket with an `Authorization: Bearer` header.
pub async fn connect_with_header(addr: SocketAddr, token: &str) -> Ws {
    let mut request = format!("ws://{addr}/socket")
        .into_client_request()
        .expect("request");
    request.headers_mut().insert(
        "Authorization",
        HeaderValue::from_str(&format!("Bearer {token}")).expect("header"),
    );
    let (ws, _) = tokio_tungstenite::connect_async(request)
        .await
        .expect("ws connect");
    ws
}

/// Connect as `user_id` and consume the `connected` + `onlineUsersList`
/// greeting.
pub async fn connect_user(addr: SocketAddr, user_id: &str) -> Ws {
    let mut ws = connect(addr, Some(&mint_token(user_id))).await;
    let connected = next_event(&mut ws).await;
    assert_eq!(connected["type"], "connected");
    let snapshot = next_event(&mut ws).await;
    assert_eq!(snapshot["type"], "onlineUsersList");
    ws
}

/// Read the next JSON event, skipping control frames.
pub async fn next_event(ws: &mut Ws) -> serde_json::Value {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for event")
            .expect("stream ended")
            .expect("ws read error");
        match msg {
            Message::Text(text) => return serde_json::from_str(&text).expect("parse event"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected text frame, got: {other:?}"),
        }
    }
}

/// Collect every event that arrives within `window`.
pub async fn drain_events(ws: &mut Ws, window: Duration) -> Vec<serde_json::Value> {
    let mut events = Vec::new();
    while let Ok(Some(Ok(msg))) = time::timeout(window, ws.next()).await {
        if let Message::Text(text) = msg {
            events.push(serde_json::from_str(&text).expect("parse event"));
        }
    }
    events
}

/// Poll until `check` holds, failing after a few seconds.
pub async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached in time");
}
