//! Service configuration
//!
//! Sources are layered, later ones winning:
//! 1. Built-in defaults
//! 2. Optional TOML file (`--config`)
//! 3. `ZEPPELIN_*` environment variables (e.g. `ZEPPELIN_PORT=8080`)
//! 4. Command-line overrides

use crate::api::broker::DEFAULT_SUBSCRIBER_CAPACITY;
use crate::error::{Result, ZeppelinError};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const ENV_PREFIX: &str = "ZEPPELIN";

/// Runtime configuration for the Zeppelin service
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ZeppelinConfig {
    /// Bind address for the HTTP server
    pub bind: String,
    /// HTTP server port
    pub port: u16,
    /// Gas Town root directory; `gt`/`bd` run with this as working directory
    pub root: PathBuf,
    /// Seconds between collector polls
    pub poll_interval_secs: u64,
    /// Seconds before an external command is abandoned
    pub command_timeout_secs: u64,
    /// Queue depth per connected observer
    pub subscriber_capacity: usize,
    /// Directory of frontend assets to serve at `/`
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

impl Default for ZeppelinConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 7331,
            root: default_root(),
            poll_interval_secs: 5,
            command_timeout_secs: 10,
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            static_dir: None,
        }
    }
}

/// Command-line values that take precedence over every other source
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub root: Option<PathBuf>,
    pub static_dir: Option<PathBuf>,
}

/// `$HOME/gt`, falling back to `./gt` when there is no home directory
pub fn default_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gt")
}

impl ZeppelinConfig {
    /// Load configuration from defaults, an optional file, the environment
    /// and command-line overrides
    pub fn load(file: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        let defaults = Self::default();

        let mut builder = Config::builder()
            .set_default("bind", defaults.bind.as_str())?
            .set_default("port", i64::from(defaults.port))?
            .set_default("root", path_value(&defaults.root))?
            .set_default("poll_interval_secs", defaults.poll_interval_secs as i64)?
            .set_default("command_timeout_secs", defaults.command_timeout_secs as i64)?
            .set_default("subscriber_capacity", defaults.subscriber_capacity as i64)?;

        if let Some(path) = file {
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        if let Some(bind) = overrides.bind {
            builder = builder.set_override("bind", bind)?;
        }
        if let Some(port) = overrides.port {
            builder = builder.set_override("port", i64::from(port))?;
        }
        if let Some(root) = overrides.root {
            builder = builder.set_override("root", path_value(&root))?;
        }
        if let Some(dir) = overrides.static_dir {
            builder = builder.set_override("static_dir", path_value(&dir))?;
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(ZeppelinError::Config(config::ConfigError::Message(
                "poll_interval_secs must be at least 1".to_string(),
            )));
        }
        if self.command_timeout_secs == 0 {
            return Err(ZeppelinError::Config(config::ConfigError::Message(
                "command_timeout_secs must be at least 1".to_string(),
            )));
        }
        Ok(())
    }

    /// Parsed `bind:port` listen address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let addr = format!("{}:{}", self.bind, self.port);
        addr.parse()
            .map_err(|e| ZeppelinError::InvalidAddress(format!("'{}': {}", addr, e)))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

fn path_value(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
