use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::errors::ShError;
use crate::runtime::{self, RuntimeSettings};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "SHPP_CONFIG";

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShellConfig {
    pub interpreter: InterpreterConfig,
    pub exec: ExecConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InterpreterConfig {
    /// Deepest allowed chain of user function calls.
    pub max_recursion: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            max_recursion: runtime::DEFAULT_MAX_RECURSION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecConfig {
    /// Bytes per read when draining captured output.
    pub read_chunk: usize,
    /// Sleep between polls while children are alive but quiet.
    pub poll_interval_ms: u64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            read_chunk: runtime::DEFAULT_READ_CHUNK,
            poll_interval_ms: runtime::DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

impl ShellConfig {
    pub fn from_toml_str(text: &str, origin: &str) -> Result<Self, ShError> {
        let config: ShellConfig = toml::from_str(text).map_err(|source| ShError::Config {
            path: origin.to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ShError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text, &path.to_string_lossy())
    }

    /// `$SHPP_CONFIG`, else `<config dir>/shpp/config.toml`.
    pub fn config_path() -> Option<PathBuf> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) if !path.is_empty() => Some(PathBuf::from(path)),
            _ => dirs::config_dir().map(|dir| dir.join("shpp").join("config.toml")),
        }
    }

    /// Load from the default location; a missing file means defaults.
    pub fn discover() -> Result<Self, ShError> {
        match Self::config_path() {
            Some(path) if path.exists() => {
                debug!(path = %path.display(), "loading config");
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<(), ShError> {
        if self.interpreter.max_recursion == 0 {
            return Err(ShError::InvalidConfig {
                key: "interpreter.max_recursion",
                reason: "must be at least 1".into(),
            });
        }
        if self.exec.read_chunk == 0 {
            return Err(ShError::InvalidConfig {
                key: "exec.read_chunk",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub fn settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            max_recursion: self.interpreter.max_recursion,
            read_chunk: self.exec.read_chunk,
            poll_interval: Duration::from_millis(self.exec.poll_interval_ms),
        }
    }

    /// Install these values for the evaluator and command executor on
    /// the current thread.
    pub fn apply(&self) {
        runtime::install(self.settings());
    }
}
