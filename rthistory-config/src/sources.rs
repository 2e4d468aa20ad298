use std::path::PathBuf;
use std::time::Duration;

use rthistory_core::retrieval::RetrievalConfig;
use serde::{Deserialize, Serialize};

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub storage: FileStorageConfig,
    #[serde(default)]
    pub archive: FileArchiveConfig,
    #[serde(default)]
    pub endpoint: FileEndpointConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub logging: FileLoggingConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileStorageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileArchiveConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirror_root: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileEndpointConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_capacity: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileLoggingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// Values picked up from the process environment. Unparseable values are
/// kept as `None` here and reported by the loader.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub storage_root: Option<PathBuf>,
    pub archive_mirror: Option<PathBuf>,
    pub channel_capacity: Option<usize>,
    pub max_attempts: Option<u16>,
    pub run_timeout: Option<Duration>,
    pub log_filter: Option<String>,
    pub log_file: Option<PathBuf>,
    pub rejected: Vec<RejectedVar>,
}

/// An environment variable that was set but could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedVar {
    pub name: &'static str,
    pub value: String,
}

impl EnvConfig {
    pub fn gather() -> Self {
        let mut env_config = Self::default();

        env_config.config_path = path_var("RTHISTORY_CONFIG");
        env_config.storage_root = path_var("RTHISTORY_STORAGE_ROOT");
        env_config.archive_mirror = path_var("RTHISTORY_ARCHIVE_MIRROR");
        env_config.log_filter = string_var("RTHISTORY_LOG");
        env_config.log_file = path_var("RTHISTORY_LOG_FILE");

        env_config.channel_capacity = env_config
            .parsed("RTHISTORY_CHANNEL_CAPACITY", |raw| raw.parse().ok());
        env_config.max_attempts = env_config
            .parsed("RTHISTORY_MAX_ATTEMPTS", |raw| raw.parse().ok());
        env_config.run_timeout = env_config.parsed("RTHISTORY_RUN_TIMEOUT", |raw| {
            humantime::parse_duration(raw).ok()
        });

        env_config
    }

    fn parsed<T>(
        &mut self,
        name: &'static str,
        parse: impl FnOnce(&str) -> Option<T>,
    ) -> Option<T> {
        let raw = string_var(name)?;
        let value = parse(&raw);
        if value.is_none() {
            self.rejected.push(RejectedVar { name, value: raw });
        }
        value
    }
}

fn string_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn path_var(name: &str) -> Option<PathBuf> {
    string_var(name).map(PathBuf::from)
}
