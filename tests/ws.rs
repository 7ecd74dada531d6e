mod common;

use std::time::Duration;

use common::{settle, TestClient, TestServer};
use futures_util::StreamExt;
use serde_json::json;
use tokio_tungstenite::connect_async;

const QUIET: Duration = Duration::from_millis(250);

/// Register an admin and consume its bootstrap frames.
async fn admin(base: &str) -> TestClient {
    let mut admin = TestClient::connect(base).await;
    admin.send("adminRequestQueue", json!({})).await;
    admin.recv_type("adminResponseQueue").await;
    admin.recv_type("piStatus").await;
    admin
}

/// Connect the vehicle agent and wait until the admin sees it linked.
async fn agent(base: &str, admin: &mut TestClient) -> TestClient {
    let mut agent = TestClient::connect(base).await;
    agent.identify_as_agent().await;
    let status = admin.recv_type("piStatus").await;
    assert_eq!(status["data"]["connected"], true);
    agent
}

/// Wait for the admin to see a snapshot with `len` entries and return it.
async fn snapshot_with(admin: &mut TestClient, len: usize) -> serde_json::Value {
    loop {
        let snapshot = admin.recv_type("adminResponseQueue").await;
        if snapshot["data"]["queue"].as_array().map(Vec::len) == Some(len) {
            return snapshot;
        }
    }
}

#[tokio::test]
async fn test_ws_connect_receives_hello() {
    let server = TestServer::new().await;
    let base = server.spawn().await;
    let (mut ws, _) = connect_async(format!("{base}/ws")).await.unwrap();
    let msg = ws.next().await.unwrap().unwrap();
    assert!(msg.is_text(), "expected text message, got {msg:?}");
    let json: serde_json::Value = serde_json::from_str(&msg.into_text().unwrap()).unwrap();
    assert_eq!(json["type"], "hello");
    assert!(json["data"]["session_id"].is_string());
    assert!(json["data"]["heartbeat_interval"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_ws_session_ids_are_unique() {
    let server = TestServer::new().await;
    let base = server.spawn().await;
    let a = TestClient::connect(&base).await;
    let b = TestClient::connect(&base).await;
    assert_ne!(a.session_id, b.session_id);
}

#[tokio::test]
async fn test_ws_heartbeat_ack() {
    let server = TestServer::new().await;
    let base = server.spawn().await;
    let mut client = TestClient::connect(&base).await;
    client.send_bare("heartbeat").await;
    let ack = client.recv().await;
    assert_eq!(ack["type"], "heartbeat_ack");
}

#[tokio::test]
async fn test_ws_unknown_and_malformed_frames_are_ignored() {
    let server = TestServer::new().await;
    let base = server.spawn().await;
    let mut client = TestClient::connect(&base).await;

    client.send("teleport", json!({ "x": 1 })).await;
    client.send("timeleft", json!({ "message": "soon" })).await;
    client.send("controlData", json!(42)).await;

    // still alive and answering
    client.send_bare("heartbeat").await;
    assert_eq!(client.recv().await["type"], "heartbeat_ack");
}

#[tokio::test]
async fn test_ws_first_requester_takes_control() {
    let server = TestServer::new().await;
    let base = server.spawn().await;
    let mut s1 = TestClient::connect(&base).await;
    s1.send_bare("userRequestAdd").await;
    let start = s1.recv().await;
    assert_eq!(start["type"], "timestart");
    assert_eq!(start["data"], 60);

    // asking twice changes nothing
    s1.send_bare("userRequestAdd").await;
    s1.expect_silence(QUIET).await;
}

#[tokio::test]
async fn test_ws_turn_lifecycle() {
    let server = TestServer::new().await;
    let base = server.spawn().await;
    let mut adm = admin(&base).await;
    let mut pi = agent(&base, &mut adm).await;

    let mut s1 = TestClient::connect(&base).await;
    s1.send_bare("userRequestAdd").await;
    assert_eq!(s1.recv_type("timestart").await["data"], 60);
    snapshot_with(&mut adm, 1).await;

    let mut s2 = TestClient::connect(&base).await;
    s2.send_bare("userRequestAdd").await;
    let snapshot = snapshot_with(&mut adm, 2).await;
    assert_eq!(snapshot["data"]["current_index"], 0);
    assert_eq!(snapshot["data"]["queue"][1]["sid"], s2.session_id.as_str());

    // only the holder reaches the agent
    s2.send(
        "controlData",
        json!({ "throttle": "backward", "turn": "left", "throttle_percent": 30, "turn_percent": 30 }),
    )
    .await;
    s1.send(
        "controlData",
        json!({ "throttle": "forward", "turn": "none", "throttle_percent": 40 }),
    )
    .await;
    let forwarded = pi.recv_type("pi_command").await;
    assert_eq!(forwarded["data"]["throttle"], "forward");
    assert_eq!(forwarded["data"]["throttle_percent"], 40);
    assert_eq!(forwarded["data"]["turn_percent"], 0);
    pi.expect_silence(QUIET).await;

    // turn ends: stop first, then s2 takes over
    s1.send_bare("timeover").await;
    let stop = pi.recv_type("pi_command").await;
    assert_eq!(stop["data"]["throttle"], "stop");
    assert_eq!(stop["data"]["emergency"], true);
    assert_eq!(s1.recv_type("controlOff").await["data"], "ack");
    assert_eq!(s2.recv_type("timestart").await["data"], 60);

    // holder leaves: control wraps back to s1
    s2.close().await;
    assert_eq!(s1.recv_type("timestart").await["data"], 60);
    let snapshot = snapshot_with(&mut adm, 1).await;
    assert_eq!(snapshot["data"]["queue"][0]["sid"], s1.session_id.as_str());
    assert_eq!(snapshot["data"]["current_index"], 0);
}

#[tokio::test]
async fn test_ws_legacy_button_command() {
    let server = TestServer::new().await;
    let base = server.spawn().await;
    let mut adm = admin(&base).await;
    let mut pi = agent(&base, &mut adm).await;

    let mut s1 = TestClient::connect(&base).await;
    s1.send_bare("userRequestAdd").await;
    s1.recv_type("timestart").await;

    s1.send("message", json!("LEFT pressed")).await;
    let cmd = pi.recv_type("pi_command").await;
    assert_eq!(cmd["data"]["turn"], "left");
    assert_eq!(cmd["data"]["turn_percent"], 50);
    assert_eq!(cmd["data"]["throttle"], "stop");
}

#[tokio::test]
async fn test_ws_agent_cannot_queue() {
    let server = TestServer::new().await;
    let base = server.spawn().await;
    let mut adm = admin(&base).await;
    let mut pi = agent(&base, &mut adm).await;

    pi.send_bare("userRequestAdd").await;
    pi.expect_silence(QUIET).await;
    assert_eq!(
        server.state.arbiter.snapshot().await.unwrap().queue.len(),
        0
    );
}

#[tokio::test]
async fn test_ws_agent_disconnect_reported_to_admin() {
    let server = TestServer::new().await;
    let base = server.spawn().await;
    let mut adm = admin(&base).await;
    let pi = agent(&base, &mut adm).await;

    pi.close().await;
    let status = adm.recv_type("piStatus").await;
    assert_eq!(status["data"]["connected"], false);
    let notice = adm.recv_type("adminNotification").await;
    assert!(notice["data"]["message"].as_str().unwrap().contains("disconnected"));
}

#[tokio::test]
async fn test_ws_timeleft_updates_admin_row() {
    let server = TestServer::new().await;
    let base = server.spawn().await;
    let mut adm = admin(&base).await;

    let mut s1 = TestClient::connect(&base).await;
    s1.send_bare("userRequestAdd").await;
    s1.recv_type("timestart").await;

    s1.send("timeleft", json!({ "message": 42 })).await;
    let row = adm.recv_type("adminResponseRow").await;
    assert_eq!(row["data"]["sid"], s1.session_id.as_str());
    assert_eq!(row["data"]["timeRemaining"], 42);
    assert_eq!(row["data"]["timeAllowed"], 60);
}

#[tokio::test]
async fn test_ws_admin_controls() {
    let server = TestServer::new().await;
    let base = server.spawn().await;
    let mut adm = admin(&base).await;
    let mut pi = agent(&base, &mut adm).await;

    let mut s1 = TestClient::connect(&base).await;
    s1.send_bare("userRequestAdd").await;
    s1.recv_type("timestart").await;
    let mut s2 = TestClient::connect(&base).await;
    s2.send_bare("userRequestAdd").await;
    snapshot_with(&mut adm, 2).await;

    // invalid default time leaves the queue alone
    adm.send("adminSetDefaultTime", json!({ "time": 5 })).await;
    let notice = adm.recv_type("adminNotification").await;
    assert!(notice["data"]["message"].as_str().unwrap().contains("not changed"));

    adm.send("adminSetDefaultTime", json!({ "time": 30 })).await;
    assert_eq!(s1.recv_type("timestart").await["data"], 30);
    let snapshot = adm.recv_type("adminResponseQueue").await;
    assert_eq!(snapshot["data"]["queue"][1]["timeAllowed"], 30);

    adm.send(
        "adminUpdateUser",
        json!({ "sid": s2.session_id, "timeAllowed": 120 }),
    )
    .await;
    let row = adm.recv_type("adminResponseRow").await;
    assert_eq!(row["data"]["timeAllowed"], 120);

    adm.send_bare("adminForceNext").await;
    assert_eq!(pi.recv_type("pi_command").await["data"]["emergency"], true);
    assert_eq!(s1.recv_type("controlOff").await["data"], "ack");
    assert_eq!(s2.recv_type("timestart").await["data"], 120);

    adm.send("adminRemoveUser", json!({ "sid": s2.session_id })).await;
    assert_eq!(pi.recv_type("pi_command").await["data"]["emergency"], true);
    assert_eq!(s2.recv_type("controlOff").await["data"], "ack");
    assert_eq!(s1.recv_type("timestart").await["data"], 30);

    adm.send_bare("adminEmergencyStop").await;
    assert_eq!(pi.recv_type("pi_command").await["data"]["throttle"], "stop");
}

#[tokio::test]
async fn test_ws_admin_requests_from_non_admin_ignored() {
    let server = TestServer::new().await;
    let base = server.spawn().await;

    let mut s1 = TestClient::connect(&base).await;
    s1.send_bare("userRequestAdd").await;
    s1.recv_type("timestart").await;

    s1.send("adminRemoveUser", json!({ "sid": s1.session_id })).await;
    s1.send_bare("adminForceNext").await;
    settle().await;

    let snapshot = server.state.arbiter.snapshot().await.unwrap();
    assert_eq!(snapshot.queue.len(), 1);
    assert_eq!(snapshot.current_index, Some(0));
    s1.expect_silence(QUIET).await;
}

#[tokio::test]
async fn test_ws_admin_passphrase() {
    let server = TestServer::with_passphrase(Some("hunter2")).await;
    let base = server.spawn().await;
    let mut adm = TestClient::connect(&base).await;

    adm.send("adminRequestQueue", json!({})).await;
    adm.send("adminRequestQueue", json!({ "passphrase": "guess" })).await;
    adm.expect_silence(QUIET).await;

    adm.send("adminRequestQueue", json!({ "passphrase": "hunter2" }))
        .await;
    let snapshot = adm.recv().await;
    assert_eq!(snapshot["type"], "adminResponseQueue");
    let status = adm.recv().await;
    assert_eq!(status["type"], "piStatus");
    assert_eq!(status["data"]["connected"], false);
}

#[tokio::test]
async fn test_ws_close() {
    let server = TestServer::new().await;
    let base = server.spawn().await;
    let mut s1 = TestClient::connect(&base).await;
    s1.send_bare("userRequestAdd").await;
    s1.recv_type("timestart").await;
    s1.close().await;
    settle().await;

    assert!(server.state.arbiter.snapshot().await.unwrap().queue.is_empty());
    assert_eq!(server.state.dispatcher.session_count(), 0);
}
