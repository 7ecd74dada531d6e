use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use arbiter::config::Config;
use arbiter::state::AppState;

/// Turn-based remote-control arbiter.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Listen port (overrides PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Default turn length in seconds (overrides ARBITER_DEFAULT_TIME)
    #[arg(long)]
    default_time: Option<i64>,

    /// Directory served at / (overrides ARBITER_STATIC_PATH)
    #[arg(long)]
    static_path: Option<PathBuf>,

    /// identify.user_agent value that marks the vehicle agent (overrides ARBITER_AGENT_TAG)
    #[arg(long)]
    agent_tag: Option<String>,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(secs) = self.default_time {
            match arbiter::control::queue::validate_turn_secs(secs) {
                Ok(secs) => config.default_time = secs,
                Err(e) => tracing::warn!("--default-time ignored: {e}"),
            }
        }
        if let Some(path) = self.static_path {
            config.static_path = path;
        }
        if let Some(tag) = self.agent_tag {
            config.agent_tag = tag;
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arbiter=debug,tower_http=debug".into()),
        )
        .init();

    let mut config = Config::from_env();
    Cli::parse().apply(&mut config);
    print_banner(&config);

    if !config.static_path.is_dir() {
        tracing::warn!(
            "static directory {:?} does not exist, only the API will be served",
            config.static_path
        );
    }

    let state = AppState::from_config(&config);
    let app = arbiter::routes::router(state);

    let listener = match TcpListener::bind(("0.0.0.0", config.port)).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("failed to bind port {}: {e}", config.port);
            std::process::exit(1);
        }
    };

    if let Ok(addr) = listener.local_addr() {
        eprintln!("  \x1b[32m→ listening on {addr}\x1b[0m");
        eprintln!();
    }

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {e}");
        std::process::exit(1);
    }
}

fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");
    let admin = if config.admin_passphrase.is_some() {
        "passphrase"
    } else {
        "open"
    };

    eprintln!();
    eprintln!("  \x1b[1;36marbiter\x1b[0m \x1b[2mv{version}\x1b[0m");
    eprintln!();
    eprintln!("  \x1b[2mport\x1b[0m         {}", config.port);
    eprintln!("  \x1b[2mturn\x1b[0m         {}s", config.default_time);
    eprintln!("  \x1b[2magent tag\x1b[0m    {}", config.agent_tag);
    eprintln!("  \x1b[2madmin\x1b[0m        {admin}");
    eprintln!("  \x1b[2mstatic\x1b[0m       {}", config.static_path.display());
    eprintln!();
}
