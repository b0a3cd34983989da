use std::{
    env, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

use crate::cmd::{cancel::DEFAULT_KILL_GRACE, Cancellation, CommandOption};

pub const CONFIG_ENV: &str = "PIPEKIT_CONFIG";
pub const TIMEOUT_ENV: &str = "PIPEKIT_TIMEOUT_SECS";
pub const LOG_DIR_ENV: &str = "PIPEKIT_LOG_DIR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid value {value:?} for {var}")]
    Env { var: &'static str, value: String },
}

/// Defaults for how commands are built and run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecConfig {
    pub echo_commands: bool,
    pub stream_output: bool,
    pub timeout_secs: Option<u64>,
    pub kill_grace_ms: u64,
    pub log_dir: PathBuf,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            echo_commands: false,
            stream_output: false,
            timeout_secs: None,
            kill_grace_ms: DEFAULT_KILL_GRACE.as_millis() as u64,
            log_dir: PathBuf::from("."),
        }
    }
}

impl ExecConfig {
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Reads `path`, or the file named by `PIPEKIT_CONFIG`. With neither, the
    /// defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match env::var_os(CONFIG_ENV) {
                Some(path) => PathBuf::from(path),
                None => return Ok(Self::default()),
            },
        };

        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;

        Self::from_toml(&contents)
    }

    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_vars(|var| env::var(var).ok())
    }

    fn apply_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(value) = lookup(TIMEOUT_ENV) {
            let secs = value.trim().parse().map_err(|_| ConfigError::Env {
                var: TIMEOUT_ENV,
                value,
            })?;
            self.timeout_secs = Some(secs);
        }

        if let Some(dir) = lookup(LOG_DIR_ENV) {
            self.log_dir = PathBuf::from(dir);
        }

        Ok(self)
    }

    pub fn options(&self) -> Vec<CommandOption> {
        let mut options = Vec::new();
        if self.echo_commands {
            options.push(CommandOption::EchoCommand);
        }
        if self.stream_output {
            options.push(CommandOption::StreamOutput);
        }
        options
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    /// Applies the configured deadline and grace period to `cancel`.
    pub fn bound(&self, cancel: Cancellation) -> Cancellation {
        let cancel = cancel.with_grace(self.kill_grace());
        match self.timeout() {
            Some(timeout) => cancel.with_timeout(timeout),
            None => cancel,
        }
    }
}
