//! Process-level plumbing shared by the binaries: layered configuration,
//! home directory resolution and logging setup.

pub mod config;
pub mod logging;
pub mod paths;

pub use config::{
    default_logging_config, AppConfig, CliArgs, DatabaseConfig, FeaturesConfig, InstallerConfig,
    LoggingConfig, Section,
};
