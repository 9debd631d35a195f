pub mod error_runtime;
use crate::Int;
pub use error_runtime::{RtResult, RuntimeError, RuntimeErrorKind};
use thiserror::Error;

// ============== top level error ==============

#[derive(Debug, Error)]
pub enum ShError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("failed to parse config `{path}`: {source}")]
    Config {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config value `{key}`: {reason}")]
    InvalidConfig { key: &'static str, reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ShError {
    pub const ERROR_CODE_RUNTIME_ERROR: Int = 100;
    pub const ERROR_CODE_CONFIG_ERROR: Int = 101;
    pub const ERROR_CODE_IO_ERROR: Int = 102;

    pub fn code(&self) -> Int {
        match self {
            Self::Runtime(err) => err.code(),
            Self::Config { .. } | Self::InvalidConfig { .. } => Self::ERROR_CODE_CONFIG_ERROR,
            Self::Io(_) => Self::ERROR_CODE_IO_ERROR,
        }
    }
}
