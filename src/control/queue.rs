//! The ordered waiting list and turn-advancement state machine.
//!
//! `ControlQueue` is pure state: it never talks to sockets. Anything a session
//! must be told (a turn starting, control being revoked) is recorded as a
//! `QueueNotice` and drained by the caller with `take_notices`.

use crate::error::ControlError;
use crate::models::queue::{QueueEntry, QueueSnapshot};

pub const MIN_TURN_SECS: u32 = 10;
pub const MAX_TURN_SECS: u32 = 300;
pub const DEFAULT_TURN_SECS: u32 = 90;

/// Something the queue needs delivered to one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueNotice {
    TurnStarted { sid: String, time_allowed: u32 },
    ControlRevoked { sid: String },
}

/// Result of removing a session from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub entry: QueueEntry,
    pub was_holder: bool,
}

/// Check a requested turn length against the allowed range.
pub fn validate_turn_secs(requested: i64) -> Result<u32, ControlError> {
    if (MIN_TURN_SECS as i64..=MAX_TURN_SECS as i64).contains(&requested) {
        Ok(requested as u32)
    } else {
        Err(ControlError::InvalidTime { requested })
    }
}

#[derive(Debug)]
pub struct ControlQueue {
    entries: Vec<QueueEntry>,
    current: Option<usize>,
    default_time: u32,
    notices: Vec<QueueNotice>,
}

impl Default for ControlQueue {
    fn default() -> Self {
        Self::new(DEFAULT_TURN_SECS)
    }
}

impl ControlQueue {
    pub fn new(default_time: u32) -> Self {
        Self {
            entries: Vec::new(),
            current: None,
            default_time: default_time.clamp(MIN_TURN_SECS, MAX_TURN_SECS),
            notices: Vec::new(),
        }
    }

    pub fn default_time(&self) -> u32 {
        self.default_time
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// The entry currently allowed to drive.
    pub fn holder(&self) -> Option<&QueueEntry> {
        self.current.and_then(|i| self.entries.get(i))
    }

    pub fn is_holder(&self, sid: &str) -> bool {
        self.holder().is_some_and(|e| e.sid == sid)
    }

    pub fn position(&self, sid: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.sid == sid)
    }

    pub fn contains(&self, sid: &str) -> bool {
        self.position(sid).is_some()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            queue: self.entries.clone(),
            current_index: self.current,
        }
    }

    pub fn take_notices(&mut self) -> Vec<QueueNotice> {
        std::mem::take(&mut self.notices)
    }

    /// Append a session. The first entry of an empty queue takes control immediately.
    pub fn add_user(
        &mut self,
        sid: &str,
        time_allowed: Option<u32>,
    ) -> Result<QueueEntry, ControlError> {
        if self.contains(sid) {
            return Err(ControlError::AlreadyQueued(sid.to_string()));
        }

        let entry = QueueEntry::new(sid, time_allowed.unwrap_or(self.default_time));
        self.entries.push(entry.clone());

        if self.current.is_none() {
            let index = self.entries.len() - 1;
            self.current = Some(index);
            self.activate(index);
        }

        Ok(entry)
    }

    /// Remove a session, keeping `current` on the same logical holder. When the
    /// holder itself leaves, control passes to whoever now occupies its slot,
    /// wrapping to the head if it was the tail. Absent sessions are a no-op.
    pub fn remove_user(&mut self, sid: &str) -> Option<Removal> {
        let index = self.position(sid)?;
        let was_holder = self.current == Some(index);
        let entry = self.entries.remove(index);

        if was_holder {
            self.notices.push(QueueNotice::ControlRevoked {
                sid: entry.sid.clone(),
            });
        }

        if self.entries.is_empty() {
            self.current = None;
        } else if was_holder {
            let next = if index >= self.entries.len() { 0 } else { index };
            self.current = Some(next);
            self.activate(next);
        } else if let Some(current) = self.current {
            if index < current {
                self.current = Some(current - 1);
            }
        }

        Some(Removal { entry, was_holder })
    }

    /// Hand control to the next entry, round-robin. Returns the new holder.
    pub fn next_user(&mut self) -> Option<QueueEntry> {
        let current = self.current?;
        if let Some(outgoing) = self.entries.get(current) {
            self.notices.push(QueueNotice::ControlRevoked {
                sid: outgoing.sid.clone(),
            });
        }

        let next = (current + 1) % self.entries.len();
        self.current = Some(next);
        self.activate(next);
        self.entries.get(next).cloned()
    }

    /// Grant control to the entry at `index` with a full allowance.
    fn activate(&mut self, index: usize) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.time_remaining = entry.time_allowed;
            tracing::debug!(
                "activating {} for {}s",
                entry.sid,
                entry.time_allowed
            );
            self.notices.push(QueueNotice::TurnStarted {
                sid: entry.sid.clone(),
                time_allowed: entry.time_allowed,
            });
        }
    }

    /// Record a countdown report. Only the holder's reports count; the value is
    /// clamped to its allowance. Returns the updated entry when applied.
    pub fn update_time_remaining(&mut self, sid: &str, remaining: u32) -> Option<QueueEntry> {
        let index = self.current?;
        let entry = self.entries.get_mut(index)?;
        if entry.sid != sid {
            return None;
        }
        entry.time_remaining = remaining.min(entry.time_allowed);
        Some(entry.clone())
    }

    /// Change one entry's allowance. A holder whose remaining time shrinks is
    /// re-activated so its countdown restarts from the new allowance.
    pub fn update_user(&mut self, sid: &str, time_allowed: u32) -> Result<QueueEntry, ControlError> {
        let index = self
            .position(sid)
            .ok_or_else(|| ControlError::UnknownSession(sid.to_string()))?;

        let entry = &mut self.entries[index];
        entry.time_allowed = time_allowed;
        let reduced = entry.time_remaining > time_allowed;
        if reduced {
            entry.time_remaining = time_allowed;
        }

        if reduced && self.current == Some(index) {
            self.activate(index);
        }

        Ok(self.entries[index].clone())
    }

    /// Set the default allowance for new entries and cap every existing entry at it.
    pub fn set_default_time(&mut self, requested: i64) -> Result<u32, ControlError> {
        let secs = validate_turn_secs(requested)?;
        self.default_time = secs;

        let mut holder_reduced = false;
        for (i, entry) in self.entries.iter_mut().enumerate() {
            entry.time_allowed = entry.time_allowed.min(secs);
            if entry.time_remaining > secs {
                entry.time_remaining = secs;
                if self.current == Some(i) {
                    holder_reduced = true;
                }
            }
        }

        if holder_reduced {
            if let Some(index) = self.current {
                self.activate(index);
            }
        }

        Ok(secs)
    }
}
