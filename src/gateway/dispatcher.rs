use dashmap::DashMap;

use super::events::ServerEvent;
use super::session::GatewaySession;

/// Routes outgoing frames to live gateway sessions by session id.
#[derive(Debug, Default)]
pub struct Dispatcher {
    sessions: DashMap<String, GatewaySession>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_session(&self, session: GatewaySession) {
        self.sessions.insert(session.session_id.clone(), session);
    }

    pub fn remove_session(&self, session_id: &str) -> Option<GatewaySession> {
        self.sessions.remove(session_id).map(|(_, session)| session)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Queue `event` on the session's socket. Returns false when the session
    /// is gone; the frame is dropped in that case.
    pub fn send(&self, session_id: &str, event: &ServerEvent) -> bool {
        let Some(session) = self.sessions.get(session_id) else {
            tracing::debug!("dropping {} for departed session {session_id}", event.name());
            return false;
        };
        session.tx.send(event.to_frame()).is_ok()
    }
}
