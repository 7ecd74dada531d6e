use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// What a disconnecting session was registered as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Departure {
    pub was_agent: bool,
    pub was_admin: bool,
}

/// Shared admin passphrase, held only as a SHA-256 digest.
#[derive(Debug, Clone)]
pub struct AdminPassphrase {
    digest: Vec<u8>,
}

impl AdminPassphrase {
    pub fn new(passphrase: &str) -> Self {
        Self {
            digest: hash_passphrase(passphrase),
        }
    }

    pub fn verify(&self, candidate: &str) -> bool {
        self.digest
            .as_slice()
            .ct_eq(hash_passphrase(candidate).as_slice())
            .into()
    }
}

fn hash_passphrase(passphrase: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(passphrase.as_bytes());
    hasher.finalize().to_vec()
}

/// The agent link and the admin set. Plain controllers need no registration.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    agent: Option<String>,
    admins: Vec<String>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every role held by `sid`. Safe to call for unknown sessions.
    pub fn disconnect(&mut self, sid: &str) -> Departure {
        let was_agent = self.agent.as_deref() == Some(sid);
        if was_agent {
            self.agent = None;
        }

        let was_admin = self.remove_admin(sid);
        Departure {
            was_agent,
            was_admin,
        }
    }

    pub fn agent(&self) -> Option<&str> {
        self.agent.as_deref()
    }

    pub fn is_agent(&self, sid: &str) -> bool {
        self.agent.as_deref() == Some(sid)
    }

    /// Mark `sid` as the vehicle agent. Returns the session it replaced, if any.
    pub fn link_agent(&mut self, sid: &str) -> Option<String> {
        let previous = self.agent.replace(sid.to_string());
        previous.filter(|p| p != sid)
    }

    pub fn admins(&self) -> &[String] {
        &self.admins
    }

    pub fn is_admin(&self, sid: &str) -> bool {
        self.admins.iter().any(|a| a == sid)
    }

    /// Returns false when the session was already an admin.
    pub fn add_admin(&mut self, sid: &str) -> bool {
        if self.is_admin(sid) {
            return false;
        }
        self.admins.push(sid.to_string());
        true
    }

    pub fn remove_admin(&mut self, sid: &str) -> bool {
        let before = self.admins.len();
        self.admins.retain(|a| a != sid);
        self.admins.len() != before
    }
}
