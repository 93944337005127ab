use std::env;
use std::path::PathBuf;

use thiserror::Error;

const DATA_DIR_ENV: &str = "HEARTH_DATA_DIR";
const BIND_ADDRESS_ENV: &str = "HEARTH_BIND_ADDRESS";
const SHARD_POOL_SIZE_ENV: &str = "HEARTH_SHARD_POOL_SIZE";
const MAX_BODY_BYTES_ENV: &str = "HEARTH_MAX_BODY_BYTES";
const LOG_LEVEL_ENV: &str = "HEARTH_LOG_LEVEL";
const LOG_FORMAT_ENV: &str = "HEARTH_LOG_FORMAT";

const SHARDS_DIR_NAME: &str = "shards";
const REGISTRY_DB_NAME: &str = "registry.db";

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8000";
const DEFAULT_SHARD_POOL_SIZE: usize = 64;
const DEFAULT_MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to create data directory {path}: {source}")]
    DataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}

/// Server-wide configuration, read from the environment with local-friendly
/// defaults so the server boots with zero required configuration in dev.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    pub data_dir: PathBuf,
    pub shard_pool_size: usize,
    pub max_body_bytes: usize,
    pub log_level: String,
    pub log_format: String,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_dir = match env::var(DATA_DIR_ENV) {
            Ok(value) => PathBuf::from(value),
            Err(_) => default_data_dir(),
        };
        std::fs::create_dir_all(&data_dir).map_err(|source| ConfigError::DataDir {
            path: data_dir.clone(),
            source,
        })?;
        std::fs::create_dir_all(data_dir.join(SHARDS_DIR_NAME)).map_err(|source| {
            ConfigError::DataDir {
                path: data_dir.join(SHARDS_DIR_NAME),
                source,
            }
        })?;

        let bind_address =
            env::var(BIND_ADDRESS_ENV).unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string());

        let shard_pool_size = match env::var(SHARD_POOL_SIZE_ENV) {
            Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                var: SHARD_POOL_SIZE_ENV,
                value: value.clone(),
            })?,
            Err(_) => DEFAULT_SHARD_POOL_SIZE,
        };

        let max_body_bytes = match env::var(MAX_BODY_BYTES_ENV) {
            Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                var: MAX_BODY_BYTES_ENV,
                value: value.clone(),
            })?,
            Err(_) => DEFAULT_MAX_BODY_BYTES,
        };

        let log_level = env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| "info".to_string());
        let log_format = env::var(LOG_FORMAT_ENV).unwrap_or_else(|_| "compact".to_string());

        Ok(Self {
            bind_address,
            data_dir,
            shard_pool_size,
            max_body_bytes,
            log_level,
            log_format,
        })
    }

    pub fn registry_database_url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.registry_db_path().display())
    }

    pub fn registry_db_path(&self) -> PathBuf {
        self.data_dir.join(REGISTRY_DB_NAME)
    }

    pub fn shard_dir(&self) -> PathBuf {
        self.data_dir.join(SHARDS_DIR_NAME)
    }

    pub fn shard_db_path(&self, project_id: &str) -> PathBuf {
        self.shard_dir().join(format!("{project_id}.db"))
    }

    pub fn shard_database_url(&self, project_id: &str) -> String {
        format!("sqlite://{}?mode=rwc", self.shard_db_path(project_id).display())
    }
}

fn default_data_dir() -> PathBuf {
    env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".hearth")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_data_and_shards_directory() {
        let tmp = tempfile::tempdir().unwrap();
        std::env::set_var(DATA_DIR_ENV, tmp.path());
        let config = ServerConfig::from_env().unwrap();
        assert!(config.shard_dir().is_dir());
        std::env::remove_var(DATA_DIR_ENV);
    }

    #[test]
    fn shard_database_url_is_scoped_per_project() {
        let tmp = tempfile::tempdir().unwrap();
        std::env::set_var(DATA_DIR_ENV, tmp.path());
        let config = ServerConfig::from_env().unwrap();
        let a = config.shard_database_url("proj-a");
        let b = config.shard_database_url("proj-b");
        assert_ne!(a, b);
        std::env::remove_var(DATA_DIR_ENV);
    }
}
