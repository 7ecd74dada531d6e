pub mod dispatcher;
pub mod events;
pub mod heartbeat;
pub mod session;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::state::AppState;
use events::{ClientMessage, GatewayMessage, ServerEvent};
use heartbeat::{HEARTBEAT_INTERVAL, HEARTBEAT_TIMEOUT};
use session::GatewaySession;

pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let session_id = uuid::Uuid::new_v4().to_string();

    let hello = ServerEvent::Hello {
        session_id: session_id.clone(),
        heartbeat_interval: HEARTBEAT_INTERVAL.as_millis() as u64,
    };
    if ws_sink
        .send(Message::Text(hello.to_frame().into()))
        .await
        .is_err()
    {
        return;
    }

    // Channel for frames addressed to this client
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    state
        .dispatcher
        .register_session(GatewaySession::new(&session_id, tx));
    state.arbiter.connected(&session_id);
    tracing::info!("gateway session opened: {session_id}");

    let mut last_seen = tokio::time::Instant::now();
    let mut heartbeat_interval = tokio::time::interval(HEARTBEAT_INTERVAL);
    // The first tick completes immediately
    heartbeat_interval.tick().await;

    loop {
        tokio::select! {
            Some(frame) = rx.recv() => {
                if ws_sink.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            _ = heartbeat_interval.tick() => {
                if last_seen.elapsed() > HEARTBEAT_TIMEOUT {
                    tracing::info!("gateway session {session_id} timed out");
                    break;
                }
                if ws_sink.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }
            }
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        last_seen = tokio::time::Instant::now();
                        let gw_msg = match serde_json::from_str::<GatewayMessage>(&text) {
                            Ok(m) => m,
                            Err(e) => {
                                tracing::debug!("unparseable frame from {session_id}: {e}");
                                continue;
                            }
                        };

                        if gw_msg.event_type == events::event::HEARTBEAT {
                            let ack = ServerEvent::HeartbeatAck.to_frame();
                            if ws_sink.send(Message::Text(ack.into())).await.is_err() {
                                break;
                            }
                            continue;
                        }

                        match ClientMessage::decode(gw_msg) {
                            Ok(message) => state.arbiter.received(&session_id, message),
                            Err(e) => tracing::debug!("ignored frame from {session_id}: {e}"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // pong, ping or binary; all count as liveness
                        last_seen = tokio::time::Instant::now();
                    }
                    Some(Err(e)) => {
                        tracing::debug!("gateway session {session_id} read error: {e}");
                        break;
                    }
                }
            }
        }
    }

    state.arbiter.disconnected(&session_id);
    match state.dispatcher.remove_session(&session_id) {
        Some(session) => {
            let lasted = chrono::Utc::now() - session.connected_at;
            tracing::info!(
                "gateway session closed: {session_id} after {}s",
                lasted.num_seconds()
            );
        }
        None => tracing::info!("gateway session closed: {session_id}"),
    }
}
