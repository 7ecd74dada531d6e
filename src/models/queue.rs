use serde::{Deserialize, Serialize};

/// One waiting (or active) controller in the control queue. Times are whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub sid: String,
    #[serde(rename = "timeAllowed")]
    pub time_allowed: u32,
    #[serde(rename = "timeRemaining")]
    pub time_remaining: u32,
}

impl QueueEntry {
    pub fn new(sid: &str, time_allowed: u32) -> Self {
        Self {
            sid: sid.to_string(),
            time_allowed,
            time_remaining: time_allowed,
        }
    }
}

/// Full queue state as mirrored to admin sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub queue: Vec<QueueEntry>,
    pub current_index: Option<usize>,
}

impl QueueSnapshot {
    pub fn holder(&self) -> Option<&QueueEntry> {
        self.current_index.and_then(|i| self.queue.get(i))
    }
}
