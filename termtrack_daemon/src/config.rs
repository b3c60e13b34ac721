//! Configuration management for termtrackd
//!
//! Values come from `config.toml` (optional) with `TERMTRACK_*` environment
//! overrides. Nested registry settings use a double underscore:
//! `TERMTRACK_TRACKER__TTL_SECS=30`.

use config::{Config, Environment, File};
use serde::Deserialize;
use termtrack_core::config::TrackerConfig;
use termtrack_core::constants::CMD_MAX_LEN;

/// Hard ceiling for `max_command_length`; a session buffers one line at most.
const MAX_LINE_LEN: usize = 4096;

/// Complete daemon configuration; read once at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct DaemonConfig {
    /// IP address to bind the control socket
    pub bind_address: String,

    /// Port of the control socket
    pub control_port: u16,

    /// Longest accepted control line; longer lines are cut, as the registry does
    pub max_command_length: usize,

    #[serde(default)]
    pub tracker: TrackerConfig,
}

impl DaemonConfig {
    /// Load `config.toml` from the working directory, if there is one.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from("config")
    }

    pub fn load_from(path: &str) -> Result<Self, config::ConfigError> {
        let settings = Config::builder()
            .set_default("bind_address", "127.0.0.1")?
            .set_default("control_port", 7070)?
            .set_default("max_command_length", CMD_MAX_LEN as i64)?
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("TERMTRACK")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: DaemonConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validation for all configuration values
    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.control_port == 0 {
            return Err(config::ConfigError::Message(
                "Control port cannot be 0".into(),
            ));
        }

        if self.bind_address.is_empty() {
            return Err(config::ConfigError::Message(
                "bind_address cannot be empty".into(),
            ));
        }

        if self.max_command_length == 0 || self.max_command_length > MAX_LINE_LEN {
            return Err(config::ConfigError::Message(format!(
                "max_command_length must be in 1..={MAX_LINE_LEN}"
            )));
        }

        self.tracker
            .validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))
    }

    /// Bind address and control port as a socket address string
    pub fn control_socket(&self) -> String {
        format!("{}:{}", self.bind_address, self.control_port)
    }
}
