use crate::errors::RecorderError;
use crate::runtime::FileSystem;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub interval_seconds: Option<u64>,
    pub max_retries: Option<u32>,
    pub remote_command: Option<String>,
    pub offline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub sync: SyncConfig,
    pub remote: RemoteConfig,
    pub storage: StorageConfig,
    pub connectivity: ConnectivityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncConfig {
    pub interval_seconds: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteConfig {
    pub command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    pub db_path: PathBuf,
    pub run_log_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectivityConfig {
    pub assume_online: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sync: SyncConfig {
                interval_seconds: 30,
                max_retries: 3,
            },
            remote: RemoteConfig {
                command: "true".to_string(),
            },
            storage: StorageConfig {
                db_path: PathBuf::from(".cache/attendance/records.sqlite"),
                run_log_dir: PathBuf::from(".cache/attendance/logs"),
            },
            connectivity: ConnectivityConfig {
                assume_online: true,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialAppConfig {
    sync: Option<PartialSyncConfig>,
    remote: Option<PartialRemoteConfig>,
    storage: Option<PartialStorageConfig>,
    connectivity: Option<PartialConnectivityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialSyncConfig {
    interval_seconds: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialRemoteConfig {
    command: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialStorageConfig {
    db_path: Option<PathBuf>,
    run_log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialConnectivityConfig {
    assume_online: Option<bool>,
}

pub fn load_config(
    overrides: &CliOverrides,
    fs: &dyn FileSystem,
) -> Result<AppConfig, RecorderError> {
    let mut cfg = AppConfig::default();

    if let Some(path) = &overrides.config_path {
        let file_contents = fs.read_to_string(path)?;
        let partial: PartialAppConfig = toml::from_str(&file_contents)
            .map_err(|e| RecorderError::ConfigParse(e.to_string()))?;
        merge_partial_config(&mut cfg, partial);
    }

    apply_cli_overrides(&mut cfg, overrides);
    validate_config(&cfg)?;
    Ok(cfg)
}

fn merge_partial_config(cfg: &mut AppConfig, partial: PartialAppConfig) {
    if let Some(sync) = partial.sync {
        if let Some(value) = sync.interval_seconds {
            cfg.sync.interval_seconds = value;
        }
        if let Some(value) = sync.max_retries {
            cfg.sync.max_retries = value;
        }
    }

    if let Some(remote) = partial.remote {
        if let Some(value) = remote.command {
            cfg.remote.command = value;
        }
    }

    if let Some(storage) = partial.storage {
        if let Some(value) = storage.db_path {
            cfg.storage.db_path = value;
        }
        if let Some(value) = storage.run_log_dir {
            cfg.storage.run_log_dir = value;
        }
    }

    if let Some(connectivity) = partial.connectivity {
        if let Some(value) = connectivity.assume_online {
            cfg.connectivity.assume_online = value;
        }
    }
}

fn apply_cli_overrides(cfg: &mut AppConfig, overrides: &CliOverrides) {
    if let Some(db_path) = &overrides.db_path {
        cfg.storage.db_path = db_path.clone();
    }
    if let Some(interval_seconds) = overrides.interval_seconds {
        cfg.sync.interval_seconds = interval_seconds;
    }
    if let Some(max_retries) = overrides.max_retries {
        cfg.sync.max_retries = max_retries;
    }
    if let Some(remote_command) = &overrides.remote_command {
        cfg.remote.command = remote_command.clone();
    }
    if overrides.offline {
        cfg.connectivity.assume_online = false;
    }
}

fn validate_config(cfg: &AppConfig) -> Result<(), RecorderError> {
    if cfg.sync.interval_seconds == 0 {
        return Err(RecorderError::InvalidConfig(
            "sync.interval_seconds must be greater than zero".to_string(),
        ));
    }

    if cfg.remote.command.trim().is_empty() {
        return Err(RecorderError::InvalidConfig(
            "remote.command must not be empty".to_string(),
        ));
    }

    if cfg.storage.db_path.as_os_str().is_empty() {
        return Err(RecorderError::InvalidConfig(
            "storage.db_path must not be empty".to_string(),
        ));
    }

    Ok(())
}
