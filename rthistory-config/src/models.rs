use std::path::{Path, PathBuf};

use rthistory_core::retrieval::RetrievalConfig;

pub const DEFAULT_STORAGE_ROOT: &str = "TEMP";
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Fully resolved configuration: file values with environment overrides
/// and defaults applied.
#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    pub archive: ArchiveConfig,
    pub endpoint: EndpointConfig,
    pub retrieval: RetrievalConfig,
    pub logging: LoggingConfig,
    pub metadata: ConfigMetadata,
}

impl Config {
    pub fn storage_root(&self) -> &Path {
        &self.storage.root
    }

    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.storage.root)?;
        if let Some(parent) = self
            .logging
            .file
            .as_deref()
            .and_then(Path::parent)
            .filter(|parent| !parent.as_os_str().is_empty())
        {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub root: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct ArchiveConfig {
    /// Directory of exported records served by the mirror transport.
    pub mirror_root: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub channel_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub filter: String,
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}
