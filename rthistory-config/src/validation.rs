use thiserror::Error;

use super::models::Config;

#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("retrieval.retry.max_attempts must be at least 1")]
    ZeroAttempts,
    #[error("endpoint.channel_capacity must be at least 1")]
    ZeroChannelCapacity,
    #[error("retrieval.run_timeout must be longer than zero")]
    ZeroRunTimeout,
}

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }
}

pub fn apply_guard_rails(
    config: &Config,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    if config.retrieval.retry.max_attempts == 0 {
        return Err(ConfigGuardRailError::ZeroAttempts);
    }
    if config.endpoint.channel_capacity == 0 {
        return Err(ConfigGuardRailError::ZeroChannelCapacity);
    }
    if config.retrieval.run_timeout.is_some_and(|t| t.is_zero()) {
        return Err(ConfigGuardRailError::ZeroRunTimeout);
    }

    if config.archive.mirror_root.is_none() {
        warnings.push_with_hint(
            "No archive mirror configured; retrieval runs will fail to open a transport",
            "Set archive.mirror_root or RTHISTORY_ARCHIVE_MIRROR",
        );
    }

    if config.retrieval.retry.max_attempts == 1 {
        warnings.push(
            "retrieval.retry.max_attempts is 1; a single dropped move abandons the task",
        );
    }

    Ok(warnings)
}
