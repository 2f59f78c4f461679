//! Server configuration: TOML file + CLI overrides.

use kasflows_core::{RelayConfig, RelayError, RelayResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub relay: RelaySection,
    #[serde(default)]
    pub auth: AuthSection,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// `[relay]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct RelaySection {
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    #[serde(default)]
    pub purge_mailbox_on_disconnect: bool,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            idle_timeout_secs: default_idle_timeout(),
            purge_mailbox_on_disconnect: false,
        }
    }
}

/// `[auth]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSection {
    #[serde(default)]
    pub require_token: bool,
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            require_token: false,
            token_ttl_secs: default_token_ttl(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_sweep_interval() -> u64 {
    5
}
fn default_idle_timeout() -> u64 {
    10
}
fn default_token_ttl() -> u64 {
    86400
}

/// Values given on the command line. `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub sweep_interval_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
    pub require_token: bool,
}

/// Resolved server configuration (CLI overrides applied).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub relay: RelayConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            relay: RelayConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load config from TOML file, then apply CLI overrides.
    pub fn load(config_path: Option<&Path>, overrides: ConfigOverrides) -> RelayResult<Self> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    let content = std::fs::read_to_string(&expanded)?;
                    toml::from_str::<ConfigFile>(&content)
                        .map_err(|e| RelayError::Config(format!("config parse error: {e}")))?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };

        Self::resolve(file_config, overrides)
    }

    /// Merge a parsed config file with CLI overrides and validate the result.
    pub fn resolve(file_config: ConfigFile, overrides: ConfigOverrides) -> RelayResult<Self> {
        let sweep_interval_secs = overrides
            .sweep_interval_secs
            .unwrap_or(file_config.relay.sweep_interval_secs);
        let idle_timeout_secs = overrides
            .idle_timeout_secs
            .unwrap_or(file_config.relay.idle_timeout_secs);

        if sweep_interval_secs == 0 {
            return Err(RelayError::Config("sweep_interval_secs must be > 0".into()));
        }
        if idle_timeout_secs == 0 {
            return Err(RelayError::Config("idle_timeout_secs must be > 0".into()));
        }
        if sweep_interval_secs >= idle_timeout_secs {
            warn!(
                sweep_interval_secs,
                idle_timeout_secs, "sweep interval is not shorter than the idle timeout"
            );
        }

        Ok(Self {
            host: overrides.host.unwrap_or(file_config.server.host),
            port: overrides.port.unwrap_or(file_config.server.port),
            relay: RelayConfig {
                sweep_interval: Duration::from_secs(sweep_interval_secs),
                idle_timeout: Duration::from_secs(idle_timeout_secs),
                purge_mailbox_on_disconnect: file_config.relay.purge_mailbox_on_disconnect,
                require_token: overrides.require_token || file_config.auth.require_token,
                token_ttl_secs: file_config.auth.token_ttl_secs,
            },
        })
    }

    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
