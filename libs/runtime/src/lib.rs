//! Process bootstrap shared by the engine's binaries: layered configuration
//! and tracing setup.

pub mod config;
pub mod logging;
pub mod paths;

pub use config::{default_logging_config, AppConfig, CliArgs, DatabaseConfig, LoggingConfig, Section};
pub use logging::init_logging_from_config;
pub use paths::resolve_home_dir;
