use std::path::PathBuf;

use crate::control::queue::{DEFAULT_TURN_SECS, MAX_TURN_SECS, MIN_TURN_SECS};
use crate::control::{ArbiterSettings, DEFAULT_AGENT_TAG};

pub const DEFAULT_PORT: u16 = 4000;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub default_time: u32,
    pub admin_passphrase: Option<String>,
    pub agent_tag: String,
    pub static_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        let default_time = std::env::var("ARBITER_DEFAULT_TIME")
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .map(|secs| secs.clamp(MIN_TURN_SECS as i64, MAX_TURN_SECS as i64) as u32)
            .unwrap_or(DEFAULT_TURN_SECS);

        let admin_passphrase = std::env::var("ARBITER_ADMIN_PASSPHRASE")
            .ok()
            .filter(|p| !p.is_empty());

        let agent_tag = std::env::var("ARBITER_AGENT_TAG")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_AGENT_TAG.to_string());

        let static_path = std::env::var("ARBITER_STATIC_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./static"));

        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            default_time,
            admin_passphrase,
            agent_tag,
            static_path,
        }
    }

    pub fn arbiter_settings(&self) -> ArbiterSettings {
        ArbiterSettings {
            default_time: self.default_time,
            agent_tag: self.agent_tag.clone(),
            admin_passphrase: self.admin_passphrase.clone(),
        }
    }
}
