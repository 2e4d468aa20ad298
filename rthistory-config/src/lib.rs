//! Configuration for the rthistory tools.
//!
//! Values resolve in order: environment, then the TOML file (explicit path,
//! `$RTHISTORY_CONFIG`, or a default location), then built-in defaults.

pub mod cli;
pub mod loader;
pub mod models;
pub mod sources;
pub mod validation;

pub use cli::{InitOptions, render_config, run_config_init};
pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions};
pub use models::{
    ArchiveConfig, Config, ConfigMetadata, EndpointConfig, LoggingConfig,
    StorageConfig,
};
pub use sources::{EnvConfig, FileConfig};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
