use std::fs;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tempfile::tempdir;

use crate::config::{ExecConfig, InterpreterConfig, ShellConfig};
use crate::errors::ShError;
use crate::runtime::{self, RuntimeSettings};

#[test]
fn test_defaults_match_runtime() {
    let config = ShellConfig::default();
    assert_eq!(config.settings(), RuntimeSettings::default());
    assert_eq!(config.exec.poll_interval_ms, 2);
}

#[test]
fn test_partial_file_keeps_defaults() {
    let config = ShellConfig::from_toml_str("[exec]\nread_chunk = 64\n", "inline").unwrap();
    assert_eq!(
        config,
        ShellConfig {
            interpreter: InterpreterConfig::default(),
            exec: ExecConfig {
                read_chunk: 64,
                ..ExecConfig::default()
            },
        }
    );
    let empty = ShellConfig::from_toml_str("", "inline").unwrap();
    assert_eq!(empty, ShellConfig::default());
}

#[test]
fn test_unknown_keys_are_rejected() {
    let err = ShellConfig::from_toml_str("[exec]\nchunk = 1\n", "inline").unwrap_err();
    assert!(matches!(err, ShError::Config { ref path, .. } if path == "inline"));
    assert_eq!(err.code(), ShError::ERROR_CODE_CONFIG_ERROR);

    let err = ShellConfig::from_toml_str("[prompt]\n", "inline").unwrap_err();
    assert!(matches!(err, ShError::Config { .. }));
}

#[test]
fn test_zero_values_are_invalid() {
    let err = ShellConfig::from_toml_str("[interpreter]\nmax_recursion = 0\n", "inline").unwrap_err();
    assert!(matches!(err, ShError::InvalidConfig { key: "interpreter.max_recursion", .. }));
    let err = ShellConfig::from_toml_str("[exec]\nread_chunk = 0\n", "inline").unwrap_err();
    assert!(matches!(err, ShError::InvalidConfig { key: "exec.read_chunk", .. }));
}

#[test]
fn test_load_from_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[interpreter]\nmax_recursion = 100\n\n[exec]\npoll_interval_ms = 5\n").unwrap();
    let config = ShellConfig::load(&path).unwrap();
    assert_eq!(config.interpreter.max_recursion, 100);
    assert_eq!(config.settings().poll_interval, Duration::from_millis(5));

    let err = ShellConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ShError::Io(_)));
    assert_eq!(err.code(), ShError::ERROR_CODE_IO_ERROR);
}

#[test]
fn test_apply_installs_settings() {
    let config = ShellConfig::from_toml_str("[exec]\nread_chunk = 7\n", "inline").unwrap();
    config.apply();
    assert_eq!(runtime::settings().read_chunk, 7);
    runtime::install(RuntimeSettings::default());
    assert_eq!(runtime::settings(), RuntimeSettings::default());
}
