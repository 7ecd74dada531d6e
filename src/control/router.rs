use crate::gateway::events::ServerEvent;
use crate::models::command::ControlCommand;

use super::Outbound;

/// What to do with a control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Forward { agent: String },
    NotHolder,
    /// `first_report` is true only for the first drop since the agent link last changed.
    NoAgent { first_report: bool },
}

/// Gatekeeper between controllers and the vehicle agent.
#[derive(Debug, Default)]
pub struct CommandRouter {
    agent_missing_reported: bool,
}

impl CommandRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only the holder may drive; commands go nowhere without an agent.
    pub fn route(
        &mut self,
        sid: &str,
        holder: Option<&str>,
        agent: Option<&str>,
    ) -> RouteDecision {
        if holder != Some(sid) {
            return RouteDecision::NotHolder;
        }

        match agent {
            Some(agent) => RouteDecision::Forward {
                agent: agent.to_string(),
            },
            None => {
                let first_report = !self.agent_missing_reported;
                self.agent_missing_reported = true;
                RouteDecision::NoAgent { first_report }
            }
        }
    }

    pub fn agent_changed(&mut self) {
        self.agent_missing_reported = false;
    }

    /// Build the forward of `command` to the agent.
    pub fn forward(agent: &str, command: ControlCommand) -> Outbound {
        Outbound::new(agent, ServerEvent::PiCommand(command))
    }

    /// The canonical stop, addressed to the agent when one is linked.
    pub fn emergency_stop(agent: Option<&str>) -> Option<Outbound> {
        agent.map(|agent| Self::forward(agent, ControlCommand::emergency_stop()))
    }
}
