//! `config init`: scaffolds a configuration file, prompting for the values
//! that differ between sites.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use dialoguer::{Input, Select};
use rthistory_core::retrieval::{ContourSelection, RetrievalConfig};

use super::{
    loader::DEFAULT_CONFIG_LOCATIONS,
    models::{
        DEFAULT_CHANNEL_CAPACITY, DEFAULT_LOG_FILTER, DEFAULT_STORAGE_ROOT,
    },
    sources::{
        FileArchiveConfig, FileConfig, FileEndpointConfig, FileLoggingConfig,
        FileStorageConfig,
    },
};

const HEADER: &str = "\
# rthistory configuration
#
# Environment variables (RTHISTORY_STORAGE_ROOT, RTHISTORY_ARCHIVE_MIRROR,
# RTHISTORY_MAX_ATTEMPTS, RTHISTORY_RUN_TIMEOUT, ...) override these values.

";

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub path: PathBuf,
    pub force: bool,
    pub non_interactive: bool,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            path: DEFAULT_CONFIG_LOCATIONS
                .first()
                .cloned()
                .unwrap_or_else(|| PathBuf::from("rthistory.toml")),
            force: false,
            non_interactive: false,
        }
    }
}

/// The file `config init --non-interactive` writes.
pub fn default_file_config() -> FileConfig {
    FileConfig {
        storage: FileStorageConfig {
            root: Some(PathBuf::from(DEFAULT_STORAGE_ROOT)),
        },
        archive: FileArchiveConfig::default(),
        endpoint: FileEndpointConfig {
            channel_capacity: Some(DEFAULT_CHANNEL_CAPACITY),
        },
        retrieval: RetrievalConfig::default(),
        logging: FileLoggingConfig {
            filter: Some(DEFAULT_LOG_FILTER.to_string()),
            file: None,
        },
    }
}

pub fn render_config(config: &FileConfig) -> Result<String> {
    let body = toml::to_string_pretty(config)
        .context("failed to render configuration")?;
    Ok(format!("{HEADER}{body}"))
}

/// Writes the configuration file and returns its path.
pub fn run_config_init(opts: &InitOptions) -> Result<PathBuf> {
    ensure_writable(&opts.path, opts.force)?;

    let config = if opts.non_interactive {
        default_file_config()
    } else {
        prompt_file_config(default_file_config())?
    };

    if let Some(dir) = opts.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| {
            format!("failed to create directory {}", dir.display())
        })?;
    }

    let rendered = render_config(&config)?;
    fs::write(&opts.path, rendered).with_context(|| {
        format!("failed to write {}", opts.path.display())
    })?;

    Ok(opts.path.clone())
}

fn prompt_file_config(mut config: FileConfig) -> Result<FileConfig> {
    let storage_default = config
        .storage
        .root
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let storage_root: String = Input::new()
        .with_prompt("Local record store root")
        .default(storage_default)
        .interact_text()
        .context("prompt failed")?;
    config.storage.root = Some(PathBuf::from(storage_root.trim()));

    let mirror: String = Input::new()
        .with_prompt("Archive mirror directory (leave blank to configure later)")
        .allow_empty(true)
        .interact_text()
        .context("prompt failed")?;
    config.archive.mirror_root = Some(mirror.trim())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from);

    let attempts_default = config.retrieval.retry.max_attempts;
    config.retrieval.retry.max_attempts = Input::new()
        .with_prompt("Attempts per task before it is abandoned")
        .default(attempts_default.to_string())
        .validate_with(|input: &String| match input.trim().parse::<u16>() {
            Ok(value) if value > 0 => Ok(()),
            _ => Err("enter a whole number of at least 1"),
        })
        .interact_text()
        .context("prompt failed")?
        .trim()
        .parse()
        .unwrap_or(attempts_default);

    let selections = ["first region with geometry", "every contoured region"];
    let choice = Select::new()
        .with_prompt("Which structure set regions select imaging")
        .items(&selections)
        .default(0)
        .interact()
        .context("prompt failed")?;
    config.retrieval.expansion.contour_selection = match choice {
        1 => ContourSelection::EveryRegion,
        _ => ContourSelection::FirstWithGeometry,
    };

    let timeout: String = Input::new()
        .with_prompt("Run timeout, e.g. `2h` (leave blank for none)")
        .allow_empty(true)
        .validate_with(|input: &String| {
            let trimmed = input.trim();
            if trimmed.is_empty() || humantime::parse_duration(trimmed).is_ok() {
                Ok(())
            } else {
                Err("enter a duration such as 90m or 2h")
            }
        })
        .interact_text()
        .context("prompt failed")?;
    config.retrieval.run_timeout = humantime::parse_duration(timeout.trim()).ok();

    Ok(config)
}

fn ensure_writable(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    Ok(())
}
