use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

/// One live WebSocket connection.
#[derive(Debug)]
pub struct GatewaySession {
    pub session_id: String,
    pub connected_at: DateTime<Utc>,
    pub tx: mpsc::UnboundedSender<String>,
}

impl GatewaySession {
    pub fn new(session_id: &str, tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            session_id: session_id.to_string(),
            connected_at: Utc::now(),
            tx,
        }
    }
}
