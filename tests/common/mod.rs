#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use arbiter::config::Config;
use arbiter::routes;
use arbiter::state::AppState;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub const AGENT_TAG: &str = "Pi";
pub const INDEX_HTML: &str = "<!doctype html><title>arbiter</title>";

/// Test server with its own arbiter task and a throwaway static directory.
/// Each instance is isolated, so tests can run in parallel.
pub struct TestServer {
    pub state: AppState,
    pub static_path: PathBuf,
}

impl TestServer {
    pub async fn new() -> Self {
        Self::with_passphrase(None).await
    }

    pub async fn with_passphrase(passphrase: Option<&str>) -> Self {
        let static_path = temp_static_dir();
        let config = Config {
            port: 0,
            default_time: 60,
            admin_passphrase: passphrase.map(str::to_string),
            agent_tag: AGENT_TAG.to_string(),
            static_path: static_path.clone(),
        };
        let state = AppState::from_config(&config);
        Self { state, static_path }
    }

    /// Returns an Axum Router wired to this server's state for `oneshot()` calls.
    pub fn router(&self) -> axum::Router {
        routes::router(self.state.clone())
    }

    /// Binds a TCP listener on port 0, spawns the server, and returns the ws:// base URL.
    pub async fn spawn(&self) -> String {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("ws://127.0.0.1:{}", addr.port())
    }
}

fn temp_static_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("arbiter-static-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("index.html"), INDEX_HTML).unwrap();
    dir
}

pub async fn test_app() -> axum::Router {
    TestServer::new().await.router()
}

/// A connected gateway client that has already consumed its `hello`.
pub struct TestClient {
    pub session_id: String,
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    pub async fn connect(base: &str) -> Self {
        let (mut ws, _) = connect_async(format!("{base}/ws")).await.unwrap();
        let hello = next_json(&mut ws).await;
        assert_eq!(hello["type"], "hello");
        let session_id = hello["data"]["session_id"].as_str().unwrap().to_string();
        Self { session_id, ws }
    }

    pub async fn send(&mut self, event_type: &str, data: serde_json::Value) {
        let frame = serde_json::json!({ "type": event_type, "data": data });
        self.ws
            .send(Message::Text(frame.to_string().into()))
            .await
            .unwrap();
    }

    pub async fn send_bare(&mut self, event_type: &str) {
        let frame = serde_json::json!({ "type": event_type });
        self.ws
            .send(Message::Text(frame.to_string().into()))
            .await
            .unwrap();
    }

    /// Next JSON frame, skipping control frames. Panics after two seconds.
    pub async fn recv(&mut self) -> serde_json::Value {
        tokio::time::timeout(Duration::from_secs(2), next_json(&mut self.ws))
            .await
            .expect("timed out waiting for a frame")
    }

    /// Skip frames until one of type `event_type` arrives.
    pub async fn recv_type(&mut self, event_type: &str) -> serde_json::Value {
        loop {
            let frame = self.recv().await;
            if frame["type"] == event_type {
                return frame;
            }
        }
    }

    /// Assert nothing but control frames arrive within `wait`.
    pub async fn expect_silence(&mut self, wait: Duration) {
        if let Ok(frame) = tokio::time::timeout(wait, next_json(&mut self.ws)).await {
            panic!("expected no frame, got {frame}");
        }
    }

    pub async fn identify_as_agent(&mut self) {
        self.send("identify", serde_json::json!({ "user_agent": AGENT_TAG }))
            .await;
    }

    pub async fn close(mut self) {
        self.ws.close(None).await.ok();
    }
}

async fn next_json(ws: &mut WebSocketStream<MaybeTlsStream<TcpStream>>) -> serde_json::Value {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
            Some(Ok(Message::Close(_))) | None => panic!("connection closed"),
            Some(Ok(_)) => continue,
            Some(Err(e)) => panic!("websocket error: {e}"),
        }
    }
}

/// Give the arbiter task a moment to process frames that have no direct reply.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
