use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use castled::config::ServerConfig;
use castled::create_app;
use castled::state::AppState;

/// Boot a server on an ephemeral port and return its address.
pub async fn spawn_server(config: ServerConfig) -> SocketAddr {
    let state = AppState::new(Arc::new(config));
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test listener");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server crashed");
    });
    addr
}

pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let (ws, _) = connect_async(format!("ws://{}/ws", addr))
            .await
            .expect("failed to connect to WebSocket");
        TestClient { ws }
    }

    /// Connect and run the handshake for `session_id`.
    pub async fn connect_and_auth(addr: SocketAddr, session_id: &str) -> Self {
        let mut client = TestClient::connect(addr).await;
        client.send("auth", json!({ "sessionId": session_id })).await;
        let frame = client.recv().await;
        assert_eq!(frame["type"], "auth_ok", "unexpected frame: {}", frame);
        client
    }

    pub async fn send(&mut self, frame_type: &str, payload: Value) {
        let frame = json!({ "type": frame_type, "payload": payload });
        self.ws
            .send(Message::Text(frame.to_string()))
            .await
            .expect("failed to send frame");
    }

    /// Next text frame, decoded. Panics after two seconds of silence.
    pub async fn recv(&mut self) -> Value {
        loop {
            let message = timeout(Duration::from_secs(2), self.ws.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("connection closed")
                .expect("socket error");
            match message {
                Message::Text(text) => {
                    return serde_json::from_str(&text).expect("frame is not valid JSON")
                }
                _ => continue,
            }
        }
    }

    /// Next frame, asserted to be of `frame_type`; returns its payload.
    pub async fn expect(&mut self, frame_type: &str) -> Value {
        let frame = self.recv().await;
        assert_eq!(frame["type"], frame_type, "unexpected frame: {}", frame);
        frame["payload"].clone()
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}
