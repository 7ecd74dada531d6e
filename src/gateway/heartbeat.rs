use std::time::Duration;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);
