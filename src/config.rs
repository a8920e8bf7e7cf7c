use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::monitor::{DEFAULT_SHUTDOWN_GRACE, MonitorConfig};
use crate::sink::OutputFormat;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub monitoring: MonitoringConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Start sampling as soon as the process is up.
    pub autostart: bool,
    /// How long shutdown waits for an in-flight tick before aborting it.
    pub shutdown_grace_ms: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            autostart: true,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE.as_millis() as u64,
        }
    }
}

impl MonitoringConfig {
    /// Sampling cadence and bounds are fixed; only the shutdown grace comes from the file.
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
            ..MonitorConfig::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub format: OutputFormat,
    /// Remote IPs listed before the rest are collapsed into "... and N more".
    pub max_remote_hosts: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            max_remote_hosts: 10,
        }
    }
}

impl AppConfig {
    /// Loads `$CONFIG_FILE` if set (must exist), else `config.toml` if present,
    /// else the built-in defaults.
    pub fn load() -> anyhow::Result<Self> {
        match std::env::var("CONFIG_FILE") {
            Ok(path) => Self::load_from_path(&path),
            Err(_) if Path::new("config.toml").exists() => Self::load_from_path("config.toml"),
            Err(_) => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    fn load_from_path(path: &str) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config {}: {}", path, e))?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.monitoring.shutdown_grace_ms > 0,
            "monitoring.shutdown_grace_ms must be > 0, got {}",
            self.monitoring.shutdown_grace_ms
        );
        anyhow::ensure!(
            self.display.max_remote_hosts > 0,
            "display.max_remote_hosts must be > 0, got {}",
            self.display.max_remote_hosts
        );
        Ok(())
    }
}
