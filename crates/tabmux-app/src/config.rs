//! Host configuration: `config.toml` in the data directory, overridden by
//! command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tabmux_pty::ManagerConfig;

pub const CONFIG_FILE: &str = "config.toml";
pub const DB_FILE: &str = "tabmux.db";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Shell for new sessions. Unset means the platform default.
    pub shell: Option<String>,
    /// Typed into every new tab once its shell is up. Empty disables it.
    pub assistant_command: Option<String>,
    /// Appended to the assistant command for tabs reopened from history.
    pub resume_flag: String,
    pub launch_delay_ms: u64,
    /// Time between launch and the start of title capture.
    pub ready_delay_ms: u64,
    pub grace_period_ms: u64,
    pub cols: u16,
    pub rows: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            shell: None,
            assistant_command: Some("claude".to_string()),
            resume_flag: "--continue".to_string(),
            launch_delay_ms: 500,
            ready_delay_ms: 2000,
            grace_period_ms: 1000,
            cols: tabmux_pty::pty::DEFAULT_COLS,
            rows: tabmux_pty::pty::DEFAULT_ROWS,
        }
    }
}

impl AppConfig {
    /// Load `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// The line typed into a new tab, if any.
    pub fn launch_line(&self, resume: bool) -> Option<String> {
        let command = self
            .assistant_command
            .as_deref()
            .map(str::trim)
            .filter(|command| !command.is_empty())?;
        if resume && !self.resume_flag.is_empty() {
            Some(format!("{command} {}\n", self.resume_flag))
        } else {
            Some(format!("{command}\n"))
        }
    }

    pub fn launch_delay(&self) -> Duration {
        Duration::from_millis(self.launch_delay_ms)
    }

    pub fn ready_delay(&self) -> Duration {
        Duration::from_millis(self.ready_delay_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            shell: self.shell.clone(),
            cols: self.cols,
            rows: self.rows,
            grace_period: self.grace_period(),
            ..ManagerConfig::default()
        }
    }
}

/// `~/.tabmux`, or `.tabmux` in the working directory when there is no home.
pub fn default_data_dir() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(".tabmux"),
        None => {
            log::warn!("could not determine home directory, using ./.tabmux");
            PathBuf::from(".tabmux")
        }
    }
}
