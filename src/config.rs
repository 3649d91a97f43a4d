//! Server configuration from environment variables.
//!
//! - `HOST`: bind address (default `0.0.0.0`)
//! - `PORT`: bind port (default `3333`)
//! - `TASKS_DB_PATH`: backing JSON file (default `db.json`)
//! - `PERSIST_MODE`: `immediate` | `background` (default `background`)
//! - `MERGE_POLICY`: `existing` | `add` (default `existing`)

use crate::persist::PersistMode;
use crate::store::StoreConfig;
use crate::types::MergePolicy;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3333;
pub const DEFAULT_DB_PATH: &str = "db.json";

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid HOST: {0}")]
    InvalidHost(String),

    #[error("Invalid PORT: {0}")]
    InvalidPort(String),

    #[error("Invalid PERSIST_MODE: {0} (expected `immediate` or `background`)")]
    InvalidPersistMode(String),

    #[error("Invalid MERGE_POLICY: {0} (expected `existing` or `add`)")]
    InvalidMergePolicy(String),
}

/// Everything the server binary needs.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub store: StoreConfig,
}

impl ServerConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let host = match value("HOST") {
            Some(host) => host
                .parse()
                .map_err(|_| ConfigError::InvalidHost(host))?,
            None => DEFAULT_HOST
                .parse()
                .map_err(|_| ConfigError::InvalidHost(DEFAULT_HOST.to_string()))?,
        };

        let port = match value("PORT") {
            Some(port) => port
                .parse()
                .map_err(|_| ConfigError::InvalidPort(port))?,
            None => DEFAULT_PORT,
        };

        let persist_mode = match value("PERSIST_MODE") {
            Some(mode) => parse_persist_mode(&mode)?,
            None => PersistMode::default(),
        };

        let merge_policy = match value("MERGE_POLICY") {
            Some(policy) => parse_merge_policy(&policy)?,
            None => MergePolicy::default(),
        };

        let path = value("TASKS_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string());

        Ok(Self {
            host,
            port,
            store: StoreConfig {
                path: PathBuf::from(path),
                persist_mode,
                merge_policy,
                create_if_missing: true,
            },
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_persist_mode(value: &str) -> Result<PersistMode, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "immediate" => Ok(PersistMode::Immediate),
        "background" => Ok(PersistMode::Background),
        _ => Err(ConfigError::InvalidPersistMode(value.to_string())),
    }
}

fn parse_merge_policy(value: &str) -> Result<MergePolicy, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "existing" => Ok(MergePolicy::ExistingFields),
        "add" => Ok(MergePolicy::AddNewFields),
        _ => Err(ConfigError::InvalidMergePolicy(value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:3333");
        assert_eq!(config.store.path, PathBuf::from("db.json"));
        assert_eq!(config.store.persist_mode, PersistMode::Background);
        assert_eq!(config.store.merge_policy, MergePolicy::ExistingFields);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("TASKS_DB_PATH", "/tmp/tasks.json"),
            ("PERSIST_MODE", "Immediate"),
            ("MERGE_POLICY", "add"),
        ])
        .unwrap();

        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:8080");
        assert_eq!(config.store.path, PathBuf::from("/tmp/tasks.json"));
        assert_eq!(config.store.persist_mode, PersistMode::Immediate);
        assert_eq!(config.store.merge_policy, MergePolicy::AddNewFields);
    }

    #[test]
    fn test_blank_values_use_defaults() {
        let config = config(&[("PORT", "  "), ("TASKS_DB_PATH", "")]).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.store.path, PathBuf::from(DEFAULT_DB_PATH));
    }

    #[test]
    fn test_invalid_values() {
        assert_eq!(
            config(&[("PORT", "eighty")]).unwrap_err(),
            ConfigError::InvalidPort("eighty".to_string())
        );
        assert_eq!(
            config(&[("HOST", "not a host")]).unwrap_err(),
            ConfigError::InvalidHost("not a host".to_string())
        );
        assert!(matches!(
            config(&[("PERSIST_MODE", "lazy")]),
            Err(ConfigError::InvalidPersistMode(_))
        ));
        assert!(matches!(
            config(&[("MERGE_POLICY", "replace")]),
            Err(ConfigError::InvalidMergePolicy(_))
        ));
    }
}
