//! kasflows-server: standalone presence relay.
//!
//! Serves the relay over HTTP and logs client connects and disconnects.
//! Applications that need event handlers embed `RelayServer` instead.

use clap::{Parser, ValueEnum};
use kasflows_core::events;
use kasflows_server::{shutdown_signal, ConfigOverrides, RelayServer, ServerConfig};
use serde_json::Value;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// kasflows-server: presence-tracking message relay
#[derive(Parser, Debug)]
#[command(name = "kasflows-server", version, about = "Presence-tracking message relay over HTTP")]
struct Cli {
    /// Listen host
    #[arg(long)]
    host: Option<String>,

    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Config file path
    #[arg(long, default_value = "~/.kasflows/config.toml")]
    config: String,

    /// Seconds between idle-session sweeps
    #[arg(long)]
    sweep_interval: Option<u64>,

    /// Seconds of silence before a client is disconnected
    #[arg(long)]
    idle_timeout: Option<u64>,

    /// Reject re-announce/disconnect/poll/send calls without a valid token
    #[arg(long)]
    require_token: bool,

    /// Log level (debug, info, warn, error)
    #[arg(long, value_enum, default_value = "info", ignore_case = true)]
    log_level: LogLevel,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    use tracing_subscriber::EnvFilter;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting kasflows-server");

    let config_path = PathBuf::from(&cli.config);
    let server_config = match ServerConfig::load(
        Some(&config_path),
        ConfigOverrides {
            host: cli.host,
            port: cli.port,
            sweep_interval_secs: cli.sweep_interval,
            idle_timeout_secs: cli.idle_timeout,
            require_token: cli.require_token,
        },
    ) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let server = match RelayServer::new(server_config) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to create server");
            std::process::exit(1);
        }
    };

    let bus = server.relay().bus();
    bus.on(events::CONNECT, |data: &Value| {
        info!(payload = %data, "connect event");
        Ok(())
    });
    bus.on(events::DISCONNECT, |data: &Value| {
        info!(payload = %data, "disconnect event");
        Ok(())
    });

    if let Err(e) = server.run(shutdown_signal()).await {
        error!(error = %e, "server error");
        std::process::exit(1);
    }

    info!("kasflows-server stopped");
}
