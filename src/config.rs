//! Service settings from a TOML file plus `OBS_SCHEDULER_*` environment
//! overrides.

use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::runtime::handle::RuntimeConfig;

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "OBS_SCHEDULER_";
/// Config file looked up in the working directory when none is named.
pub const DEFAULT_CONFIG_FILE: &str = "obs-scheduler.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_path: PathBuf,
    pub bind_addr: SocketAddr,
    pub runtime: RuntimeSettings,
    pub control: ControlSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data.db"),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            runtime: RuntimeSettings::default(),
            control: ControlSettings::default(),
        }
    }
}

/// Persistence batching knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub flush_every_op: bool,
    pub batch_max_ops: usize,
    pub batch_max_latency_ms: u64,
    pub persist_queue_bound: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        let rc = RuntimeConfig::default();
        Self {
            flush_every_op: rc.flush_every_op,
            batch_max_ops: rc.batch_max_ops,
            batch_max_latency_ms: rc.batch_max_latency_ms,
            persist_queue_bound: rc.persist_queue_bound,
        }
    }
}

impl From<&RuntimeSettings> for RuntimeConfig {
    fn from(s: &RuntimeSettings) -> Self {
        Self {
            flush_every_op: s.flush_every_op,
            batch_max_ops: s.batch_max_ops.max(1),
            batch_max_latency_ms: s.batch_max_latency_ms,
            persist_queue_bound: s.persist_queue_bound.max(1),
        }
    }
}

/// Streaming-control endpoint, reported at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 4455,
        }
    }
}

impl Settings {
    /// Reads settings from a TOML file. Missing keys take defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// File named by `OBS_SCHEDULER_CONFIG`, else [`DEFAULT_CONFIG_FILE`] if
    /// present, else defaults; then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = match std::env::var_os(format!("{ENV_PREFIX}CONFIG")) {
            Some(path) => Self::from_file(PathBuf::from(path))?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            None => Self::default(),
        };
        settings.apply_overrides(std::env::vars())?;
        Ok(settings)
    }

    /// Applies `OBS_SCHEDULER_*` pairs from `vars`; other keys are ignored.
    pub fn apply_overrides<I, K, V>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value: String = value.into();
            match name {
                "DATABASE_PATH" => self.database_path = PathBuf::from(value),
                "BIND_ADDR" => self.bind_addr = parse_value(key.as_ref(), &value)?,
                "OBS_HOST" => self.control.host = value,
                "OBS_PORT" => self.control.port = parse_value(key.as_ref(), &value)?,
                _ => {}
            }
        }
        Ok(())
    }

    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig::from(&self.runtime)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
