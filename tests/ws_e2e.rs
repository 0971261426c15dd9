//! End-to-end scenarios over a real server socket.

mod common;

use std::time::Duration;

use serde_json::json;

use castled::config::ServerConfig;
use common::{spawn_server, TestClient};

/// Anything before a successful auth is rejected, but the connection
/// survives and can retry.
#[tokio::test]
async fn test_handshake_gate_rejects_non_auth_first_frame() {
    let addr = spawn_server(ServerConfig::default()).await;
    let mut client = TestClient::connect(addr).await;

    client.send("move", json!({ "san": "e4" })).await;
    let payload = client.expect("error").await;
    assert_eq!(payload["message"], "First message must be auth with sessionId");

    // The gate also rejects an empty session id.
    client.send("auth", json!({ "sessionId": "" })).await;
    let payload = client.expect("error").await;
    assert_eq!(payload["message"], "First message must be auth with sessionId");

    // Retrying with a real session id works.
    client.send("auth", json!({ "sessionId": "s-retry" })).await;
    client.expect("auth_ok").await;
}

/// Create, join (case-insensitively), and play the first move: the opening
/// move carries no clock deduction.
#[tokio::test]
async fn test_create_join_and_first_move() {
    let addr = spawn_server(ServerConfig::default()).await;
    let mut alice = TestClient::connect_and_auth(addr, "s-alice").await;
    let mut bob = TestClient::connect_and_auth(addr, "s-bob").await;

    alice
        .send("create_room", json!({ "name": "Alice", "timeControl": "1+0" }))
        .await;
    let created = alice.expect("room_created").await;
    assert_eq!(created["color"], "w");
    let room_id = created["roomId"].as_str().unwrap().to_string();
    assert_eq!(room_id.len(), 6);

    bob.send(
        "join_room",
        json!({ "roomId": room_id.to_lowercase(), "name": "Bob" }),
    )
    .await;

    let start_a = alice.expect("game_start").await;
    assert_eq!(start_a["color"], "w");
    assert_eq!(start_a["timeControl"], "1+0");
    assert_eq!(start_a["opponentName"], "Bob");
    let start_b = bob.expect("game_start").await;
    assert_eq!(start_b["color"], "b");
    assert_eq!(start_b["roomId"], room_id.as_str());
    assert_eq!(start_b["opponentName"], "Alice");

    alice.send("move", json!({ "san": "e4" })).await;

    let mv = bob.expect("move").await;
    assert_eq!(mv["san"], "e4");
    assert_eq!(
        mv["fen"],
        "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1"
    );
    assert_eq!(mv["clocks"]["w"], 60_000);
    assert_eq!(mv["clocks"]["b"], 60_000);

    let ack = alice.expect("move_ack").await;
    assert_eq!(ack["clocks"]["w"], 60_000);
    assert_eq!(ack["clocks"]["b"], 60_000);
}

/// Domain errors come back as error frames without closing the connection.
#[tokio::test]
async fn test_domain_errors_are_error_frames() {
    let addr = spawn_server(ServerConfig::default()).await;
    let mut client = TestClient::connect_and_auth(addr, "s-1").await;

    client.send("move", json!({ "san": "e4" })).await;
    assert_eq!(client.expect("error").await["message"], "Not in a room");

    client
        .send("join_room", json!({ "roomId": "ZZZZZZ" }))
        .await;
    assert_eq!(client.expect("error").await["message"], "Room not found");

    client.send("warp", json!({})).await;
    assert_eq!(client.expect("error").await["message"], "Unknown message type");

    // Still usable afterwards.
    client.send("create_room", json!({})).await;
    client.expect("room_created").await;
}

/// A second create_room from a seated session must not orphan the first
/// room.
#[tokio::test]
async fn test_second_create_room_is_rejected() {
    let addr = spawn_server(ServerConfig::default()).await;
    let mut client = TestClient::connect_and_auth(addr, "s-1").await;

    client.send("create_room", json!({})).await;
    client.expect("room_created").await;

    client.send("create_room", json!({})).await;
    assert_eq!(client.expect("error").await["message"], "Already in a game");
}

/// Spec scenario: after e4 e5 Nf3, a dropped black client reconnects with
/// the same session and receives the full game state.
#[tokio::test]
async fn test_reconnect_preserves_state() {
    let addr = spawn_server(ServerConfig::default()).await;
    let mut alice = TestClient::connect_and_auth(addr, "s-alice").await;
    let mut bob = TestClient::connect_and_auth(addr, "s-bob").await;

    alice
        .send("create_room", json!({ "name": "Alice", "timeControl": "5+0" }))
        .await;
    let room_id = alice.expect("room_created").await["roomId"]
        .as_str()
        .unwrap()
        .to_string();
    bob.send("join_room", json!({ "roomId": room_id, "name": "Bob" }))
        .await;
    alice.expect("game_start").await;
    bob.expect("game_start").await;

    alice.send("move", json!({ "san": "e4" })).await;
    alice.expect("move_ack").await;
    bob.expect("move").await;
    bob.send("move", json!({ "san": "e5" })).await;
    bob.expect("move_ack").await;
    alice.expect("move").await;
    alice.send("move", json!({ "san": "Nf3" })).await;
    alice.expect("move_ack").await;
    bob.expect("move").await;

    bob.close().await;
    let gone = alice.expect("opponent_disconnected").await;
    assert!(gone["timeout"].is_number());

    let mut bob = TestClient::connect_and_auth(addr, "s-bob").await;
    let rejoin = bob.expect("reconnect").await;
    assert_eq!(rejoin["roomId"], room_id.as_str());
    assert_eq!(rejoin["color"], "b");
    assert_eq!(
        rejoin["fen"],
        "rnbqkbnr/pppp1ppp/8/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R b KQkq - 1 2"
    );
    assert_eq!(rejoin["moves"], json!(["e4", "e5", "Nf3"]));
    assert_eq!(rejoin["timeControl"], "5+0");
    assert_eq!(rejoin["opponentName"], "Alice");
    assert_eq!(rejoin["opponentConnected"], true);
    assert!(rejoin["clocks"]["b"].as_i64().unwrap() <= 300_000);

    alice.expect("opponent_reconnected").await;

    // The game goes on.
    bob.send("move", json!({ "san": "Nc6" })).await;
    bob.expect("move_ack").await;
    assert_eq!(alice.expect("move").await["san"], "Nc6");
}

/// Spec scenario: a player who stays away past the grace period forfeits.
#[tokio::test]
async fn test_abandonment_after_grace_expiry() {
    let addr = spawn_server(ServerConfig {
        disconnect_grace: Duration::from_millis(200),
        ..ServerConfig::default()
    })
    .await;
    let mut alice = TestClient::connect_and_auth(addr, "s-alice").await;
    let mut bob = TestClient::connect_and_auth(addr, "s-bob").await;

    alice.send("create_room", json!({ "name": "Alice" })).await;
    let room_id = alice.expect("room_created").await["roomId"]
        .as_str()
        .unwrap()
        .to_string();
    bob.send("join_room", json!({ "roomId": room_id, "name": "Bob" }))
        .await;
    alice.expect("game_start").await;
    bob.expect("game_start").await;

    bob.close().await;
    alice.expect("opponent_disconnected").await;

    let end = alice.expect("game_end").await;
    assert_eq!(end["result"], "1-0");
    assert_eq!(end["reason"], "abandoned");
}

/// Spec scenario: a wildcard player pairs with a waiting specific player
/// and the specific control wins.
#[tokio::test]
async fn test_matchmaker_wildcard_pairing() {
    let addr = spawn_server(ServerConfig::default()).await;
    let mut xenia = TestClient::connect_and_auth(addr, "s-x").await;
    let mut yuri = TestClient::connect_and_auth(addr, "s-y").await;

    xenia
        .send("quick_match", json!({ "name": "Xenia", "timeControl": "3+2" }))
        .await;
    let queued = xenia.expect("queue_joined").await;
    assert_eq!(queued["timeControl"], "3+2");
    assert_eq!(queued["position"], 1);

    yuri
        .send("quick_match", json!({ "name": "Yuri", "timeControl": "any" }))
        .await;

    let start_x = xenia.expect("game_start").await;
    let start_y = yuri.expect("game_start").await;
    assert_eq!(start_x["timeControl"], "3+2");
    assert_eq!(start_y["timeControl"], "3+2");
    assert_ne!(start_x["color"], start_y["color"]);
    assert_eq!(start_x["roomId"], start_y["roomId"]);
}

#[tokio::test]
async fn test_cancel_queue() {
    let addr = spawn_server(ServerConfig::default()).await;
    let mut client = TestClient::connect_and_auth(addr, "s-1").await;

    client.send("quick_match", json!({})).await;
    client.expect("queue_joined").await;

    client.send("cancel_queue", json!({})).await;
    client.expect("queue_left").await;

    // Queueing twice without cancelling is an error.
    client.send("quick_match", json!({})).await;
    client.expect("queue_joined").await;
    client.send("quick_match", json!({})).await;
    assert_eq!(client.expect("error").await["message"], "Already in queue");
}

/// Spec scenario: an accepted rematch swaps colours, resets clocks, and
/// starts a fresh game.
#[tokio::test]
async fn test_rematch_swaps_colours() {
    let addr = spawn_server(ServerConfig::default()).await;
    let mut alice = TestClient::connect_and_auth(addr, "s-alice").await;
    let mut bob = TestClient::connect_and_auth(addr, "s-bob").await;

    alice
        .send("create_room", json!({ "name": "Alice", "timeControl": "3+0" }))
        .await;
    let room_id = alice.expect("room_created").await["roomId"]
        .as_str()
        .unwrap()
        .to_string();
    bob.send("join_room", json!({ "roomId": room_id, "name": "Bob" }))
        .await;
    alice.expect("game_start").await;
    bob.expect("game_start").await;

    alice.send("resign", json!({})).await;
    let end_a = alice.expect("game_end").await;
    let end_b = bob.expect("game_end").await;
    assert_eq!(end_a["result"], "0-1");
    assert_eq!(end_a["reason"], "resignation");
    assert_eq!(end_b, end_a);

    alice.send("rematch_offer", json!({})).await;
    bob.expect("rematch_offered").await;
    bob.send("rematch_respond", json!({ "accept": true })).await;

    let restart_a = alice.expect("rematch_start").await;
    let restart_b = bob.expect("rematch_start").await;
    assert_eq!(restart_a["color"], "b");
    assert_eq!(restart_b["color"], "w");
    assert_eq!(restart_a["timeControl"], "3+0");

    // Bob now opens as white with full clocks.
    bob.send("move", json!({ "san": "e4" })).await;
    let ack = bob.expect("move_ack").await;
    assert_eq!(ack["clocks"]["w"], 180_000);
    assert_eq!(ack["clocks"]["b"], 180_000);
    assert_eq!(alice.expect("move").await["san"], "e4");
}

#[tokio::test]
async fn test_health_endpoint() {
    let addr = spawn_server(ServerConfig::default()).await;
    let body = reqwest::get(format!("http://{}/health", addr))
        .await
        .expect("health request failed")
        .text()
        .await
        .unwrap();
    assert!(body.starts_with("Healthy!"), "unexpected body: {}", body);
}
