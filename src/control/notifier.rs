//! Fan-out of queue state to admin sessions.

use crate::gateway::events::ServerEvent;
use crate::models::queue::{QueueEntry, QueueSnapshot};

use super::Outbound;

fn broadcast(admins: &[String], event: ServerEvent, out: &mut Vec<Outbound>) {
    for admin in admins {
        out.push(Outbound::new(admin, event.clone()));
    }
}

pub fn queue_snapshot(admins: &[String], snapshot: &QueueSnapshot, out: &mut Vec<Outbound>) {
    broadcast(admins, ServerEvent::AdminResponseQueue(snapshot.clone()), out);
}

pub fn row(admins: &[String], entry: &QueueEntry, out: &mut Vec<Outbound>) {
    broadcast(admins, ServerEvent::AdminResponseRow(entry.clone()), out);
}

pub fn agent_status(admins: &[String], connected: bool, out: &mut Vec<Outbound>) {
    broadcast(admins, ServerEvent::PiStatus { connected }, out);
}

pub fn notify(admins: &[String], message: impl Into<String>, out: &mut Vec<Outbound>) {
    let message = message.into();
    tracing::info!("admin notice: {message}");
    broadcast(admins, ServerEvent::notification(message), out);
}
