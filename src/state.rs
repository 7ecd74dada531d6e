use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::control::registry::AdminPassphrase;
use crate::control::{self, Arbiter, ArbiterHandle};
use crate::gateway::dispatcher::Dispatcher;

#[derive(Clone)]
pub struct AppState {
    pub arbiter: ArbiterHandle,
    pub dispatcher: Arc<Dispatcher>,
    /// Guards the admin HTTP endpoints the same way `adminRequestQueue` is guarded.
    pub admin_passphrase: Option<AdminPassphrase>,
    pub static_path: PathBuf,
}

impl AppState {
    /// Start the arbiter task and wire it to a fresh dispatcher.
    /// Must be called from within a tokio runtime.
    pub fn from_config(config: &Config) -> Self {
        let dispatcher = Arc::new(Dispatcher::new());
        let arbiter = control::spawn(
            Arbiter::new(config.arbiter_settings()),
            Arc::clone(&dispatcher),
        );
        Self {
            arbiter,
            dispatcher,
            admin_passphrase: config.admin_passphrase.as_deref().map(AdminPassphrase::new),
            static_path: config.static_path.clone(),
        }
    }
}
