pub mod notifier;
pub mod queue;
pub mod registry;
pub mod router;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::error::ControlError;
use crate::gateway::dispatcher::Dispatcher;
use crate::gateway::events::{ClientMessage, ServerEvent};
use crate::models::command::ControlCommand;
use crate::models::queue::QueueSnapshot;
use queue::{validate_turn_secs, ControlQueue, QueueNotice};
use registry::{AdminPassphrase, SessionRegistry};
use router::{CommandRouter, RouteDecision};

pub const DEFAULT_AGENT_TAG: &str = "Pi";

/// A frame the arbiter wants delivered to one session.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub sid: String,
    pub event: ServerEvent,
}

impl Outbound {
    pub fn new(sid: &str, event: ServerEvent) -> Self {
        Self {
            sid: sid.to_string(),
            event,
        }
    }
}

/// Input to the arbiter event loop.
#[derive(Debug)]
pub enum ArbiterEvent {
    Connected { sid: String },
    Disconnected { sid: String },
    Received { sid: String, message: ClientMessage },
    Snapshot { reply: oneshot::Sender<QueueSnapshot> },
}

#[derive(Debug, Clone)]
pub struct ArbiterSettings {
    pub default_time: u32,
    pub agent_tag: String,
    pub admin_passphrase: Option<String>,
}

impl Default for ArbiterSettings {
    fn default() -> Self {
        Self {
            default_time: queue::DEFAULT_TURN_SECS,
            agent_tag: DEFAULT_AGENT_TAG.to_string(),
            admin_passphrase: None,
        }
    }
}

/// Sole owner of the queue, agent link and admin set. Every operation runs to
/// completion and leaves its outgoing frames in the outbox.
#[derive(Debug)]
pub struct Arbiter {
    queue: ControlQueue,
    registry: SessionRegistry,
    router: CommandRouter,
    agent_tag: String,
    admin_passphrase: Option<AdminPassphrase>,
    outbox: Vec<Outbound>,
}

impl Arbiter {
    pub fn new(settings: ArbiterSettings) -> Self {
        Self {
            queue: ControlQueue::new(settings.default_time),
            registry: SessionRegistry::new(),
            router: CommandRouter::new(),
            agent_tag: settings.agent_tag,
            admin_passphrase: settings
                .admin_passphrase
                .as_deref()
                .map(AdminPassphrase::new),
            outbox: Vec::new(),
        }
    }

    pub fn queue(&self) -> &ControlQueue {
        &self.queue
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.queue.snapshot()
    }

    pub fn take_outbox(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    pub fn handle(&mut self, event: ArbiterEvent) {
        match event {
            ArbiterEvent::Connected { sid } => self.connected(&sid),
            ArbiterEvent::Disconnected { sid } => self.disconnected(&sid),
            ArbiterEvent::Received { sid, message } => self.received(&sid, message),
            ArbiterEvent::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    pub fn connected(&self, sid: &str) {
        tracing::debug!("session connected: {sid}");
    }

    /// Drop every trace of `sid`. A departing holder ends its turn exactly as
    /// if it had been removed: stop, then promote the next entry.
    pub fn disconnected(&mut self, sid: &str) {
        let departure = self.registry.disconnect(sid);
        self.remove_from_queue(sid);

        if departure.was_agent {
            self.router.agent_changed();
            tracing::warn!("agent disconnected: {sid}");
            notifier::agent_status(self.registry.admins(), false, &mut self.outbox);
            notifier::notify(
                self.registry.admins(),
                "Vehicle agent disconnected from server",
                &mut self.outbox,
            );
        }
        if departure.was_admin {
            tracing::info!("admin disconnected: {sid}");
        }
        tracing::debug!("session disconnected: {sid}");
    }

    pub fn received(&mut self, sid: &str, message: ClientMessage) {
        match message {
            ClientMessage::RequestAdd => self.request_add(sid),
            ClientMessage::Identify { user_agent } => self.identify(sid, user_agent.as_deref()),
            ClientMessage::TimeOver => self.time_over(sid),
            ClientMessage::TimeLeft { remaining } => self.time_left(sid, remaining),
            ClientMessage::Control(command) => self.route_control(sid, command),
            ClientMessage::AdminRequestQueue { passphrase } => {
                self.admin_request_queue(sid, passphrase.as_deref())
            }
            admin => {
                if !self.registry.is_admin(sid) {
                    tracing::warn!("ignored admin request from non-admin session {sid}");
                    return;
                }
                match admin {
                    ClientMessage::AdminSetDefaultTime { time } => self.set_default_time(time),
                    ClientMessage::AdminUpdateUser { sid, time_allowed } => {
                        self.update_user(&sid, time_allowed)
                    }
                    ClientMessage::AdminRemoveUser { sid } => self.admin_remove_user(&sid),
                    ClientMessage::AdminForceNext => self.force_next(),
                    ClientMessage::AdminEmergencyStop => self.admin_emergency_stop(),
                    _ => {}
                }
            }
        }
    }

    fn request_add(&mut self, sid: &str) {
        if self.registry.is_agent(sid) {
            tracing::warn!("{}", ControlError::AgentCannotQueue(sid.to_string()));
            return;
        }
        match self.queue.add_user(sid, None) {
            Ok(entry) => {
                tracing::info!("added {} to queue ({}s)", entry.sid, entry.time_allowed);
                self.flush_queue_notices();
                self.broadcast_snapshot();
            }
            Err(e) => tracing::debug!("add rejected: {e}"),
        }
    }

    fn identify(&mut self, sid: &str, user_agent: Option<&str>) {
        if user_agent != Some(self.agent_tag.as_str()) {
            tracing::debug!("ignoring identify from {sid} with tag {user_agent:?}");
            return;
        }

        if let Some(previous) = self.registry.link_agent(sid) {
            tracing::warn!("agent {sid} replaces previous agent {previous}");
        }
        if self.remove_from_queue(sid) {
            tracing::warn!("agent {sid} was queued as a controller, removed");
        }
        self.router.agent_changed();

        tracing::info!("agent connected: {sid}");
        notifier::agent_status(self.registry.admins(), true, &mut self.outbox);
        notifier::notify(
            self.registry.admins(),
            "Vehicle agent connected to server",
            &mut self.outbox,
        );
    }

    fn time_over(&mut self, sid: &str) {
        if !self.queue.is_holder(sid) {
            tracing::debug!("ignored timeover from non-holder {sid}");
            return;
        }
        tracing::info!("turn over for {sid}");
        self.advance_turn();
    }

    fn time_left(&mut self, sid: &str, remaining: u32) {
        if let Some(entry) = self.queue.update_time_remaining(sid, remaining) {
            notifier::row(self.registry.admins(), &entry, &mut self.outbox);
        }
    }

    fn route_control(&mut self, sid: &str, command: ControlCommand) {
        let decision = self
            .router
            .route(sid, self.queue.holder().map(|e| e.sid.as_str()), self.registry.agent());

        match decision {
            RouteDecision::Forward { agent } => {
                tracing::trace!("forwarding {command:?} from {sid}");
                self.outbox.push(CommandRouter::forward(&agent, command));
            }
            RouteDecision::NotHolder => {
                tracing::debug!("ignored command from non-holder {sid}");
            }
            RouteDecision::NoAgent { first_report } => {
                tracing::warn!("control command from {sid} dropped: no agent connected");
                if first_report {
                    notifier::notify(
                        self.registry.admins(),
                        "Control commands are being dropped - no vehicle agent connected",
                        &mut self.outbox,
                    );
                }
            }
        }
    }

    fn admin_request_queue(&mut self, sid: &str, passphrase: Option<&str>) {
        if let Some(expected) = &self.admin_passphrase {
            if !passphrase.is_some_and(|p| expected.verify(p)) {
                tracing::warn!("admin registration from {sid} rejected: bad passphrase");
                return;
            }
        }

        if self.registry.add_admin(sid) {
            tracing::info!("admin registered: {sid}");
        }
        self.outbox
            .push(Outbound::new(sid, ServerEvent::AdminResponseQueue(self.snapshot())));
        self.outbox.push(Outbound::new(
            sid,
            ServerEvent::PiStatus {
                connected: self.registry.agent().is_some(),
            },
        ));
    }

    fn set_default_time(&mut self, requested: i64) {
        match self.queue.set_default_time(requested) {
            Ok(secs) => {
                self.flush_queue_notices();
                self.broadcast_snapshot();
                self.notify(format!("Default time set to {secs} seconds"));
            }
            Err(e) => {
                tracing::warn!("set default time rejected: {e}");
                self.notify(format!("Default time not changed: {e}"));
            }
        }
    }

    fn update_user(&mut self, target: &str, time_allowed: i64) {
        let secs = match validate_turn_secs(time_allowed) {
            Ok(secs) => secs,
            Err(e) => {
                tracing::warn!("update for {target} rejected: {e}");
                self.notify(format!("Time allowed for user {target} not changed: {e}"));
                return;
            }
        };

        match self.queue.update_user(target, secs) {
            Ok(entry) => {
                self.flush_queue_notices();
                notifier::row(self.registry.admins(), &entry, &mut self.outbox);
                self.broadcast_snapshot();
                self.notify(format!("Updated time allowed for user {target} to {secs}s"));
            }
            Err(e) => tracing::debug!("update rejected: {e}"),
        }
    }

    fn admin_remove_user(&mut self, target: &str) {
        if self.remove_from_queue(target) {
            self.notify(format!("Removed user {target} from queue"));
        }
    }

    fn force_next(&mut self) {
        self.emergency_stop();
        if self.queue.is_empty() {
            self.notify("No users in queue");
            return;
        }
        self.hand_over();
        self.notify("Skipped to next user");
    }

    fn admin_emergency_stop(&mut self) {
        if self.emergency_stop() {
            tracing::warn!("EMERGENCY STOP triggered by admin");
            self.notify("EMERGENCY STOP command sent to vehicle agent");
        } else {
            self.notify("EMERGENCY STOP failed - no vehicle agent connected");
        }
    }

    /// Send the canonical stop to the agent. Returns false when no agent is linked.
    pub fn emergency_stop(&mut self) -> bool {
        match CommandRouter::emergency_stop(self.registry.agent()) {
            Some(stop) => {
                self.outbox.push(stop);
                true
            }
            None => false,
        }
    }

    /// Stop the vehicle, then hand control to the next entry.
    fn advance_turn(&mut self) {
        self.emergency_stop();
        self.hand_over();
    }

    fn hand_over(&mut self) {
        if let Some(next) = self.queue.next_user() {
            tracing::info!("control passes to {}", next.sid);
        }
        self.flush_queue_notices();
        self.broadcast_snapshot();
    }

    /// Returns true when `sid` was queued.
    fn remove_from_queue(&mut self, sid: &str) -> bool {
        if self.queue.is_holder(sid) {
            self.emergency_stop();
        }
        match self.queue.remove_user(sid) {
            Some(removal) => {
                tracing::info!(
                    "removed {} from queue{}",
                    removal.entry.sid,
                    if removal.was_holder { " (holder)" } else { "" }
                );
                self.flush_queue_notices();
                self.broadcast_snapshot();
                true
            }
            None => false,
        }
    }

    fn flush_queue_notices(&mut self) {
        for notice in self.queue.take_notices() {
            let out = match notice {
                QueueNotice::TurnStarted { sid, time_allowed } => {
                    Outbound::new(&sid, ServerEvent::TimeStart(time_allowed))
                }
                QueueNotice::ControlRevoked { sid } => {
                    Outbound::new(&sid, ServerEvent::control_off())
                }
            };
            self.outbox.push(out);
        }
    }

    fn broadcast_snapshot(&mut self) {
        let snapshot = self.queue.snapshot();
        notifier::queue_snapshot(self.registry.admins(), &snapshot, &mut self.outbox);
    }

    fn notify(&mut self, message: impl Into<String>) {
        notifier::notify(self.registry.admins(), message, &mut self.outbox);
    }
}

/// Cloneable front door to the arbiter task.
#[derive(Clone, Debug)]
pub struct ArbiterHandle {
    tx: mpsc::UnboundedSender<ArbiterEvent>,
}

impl ArbiterHandle {
    fn send(&self, event: ArbiterEvent) {
        if self.tx.send(event).is_err() {
            tracing::error!("arbiter task is gone, event dropped");
        }
    }

    pub fn connected(&self, sid: &str) {
        self.send(ArbiterEvent::Connected {
            sid: sid.to_string(),
        });
    }

    pub fn disconnected(&self, sid: &str) {
        self.send(ArbiterEvent::Disconnected {
            sid: sid.to_string(),
        });
    }

    pub fn received(&self, sid: &str, message: ClientMessage) {
        self.send(ArbiterEvent::Received {
            sid: sid.to_string(),
            message,
        });
    }

    /// Current queue state, or None if the arbiter task has stopped.
    pub async fn snapshot(&self) -> Option<QueueSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(ArbiterEvent::Snapshot { reply }).ok()?;
        rx.await.ok()
    }
}

/// Run the arbiter on its own task. Events are processed strictly one at a time;
/// each event's frames are delivered before the next event is read.
pub fn spawn(mut arbiter: Arbiter, dispatcher: Arc<Dispatcher>) -> ArbiterHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<ArbiterEvent>();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            arbiter.handle(event);
            for out in arbiter.take_outbox() {
                dispatcher.send(&out.sid, &out.event);
            }
        }
        tracing::debug!("arbiter event loop finished");
    });
    ArbiterHandle { tx }
}
