//! # larix-core
//!
//! Foundation of the larix framework: the configuration repository, typed
//! application config, environment detection, feature flags, environment
//! validation, the service container and the application lifecycle.

pub mod application;
pub mod config;
pub mod container;
pub mod environment;
pub mod errors;

pub use application::{Application, ServiceProvider, CONFIG_CACHE_PATH, MAINTENANCE_FILE};
pub use config::validation::ConfigError;
pub use config::{AppConfig, AppConfigTrait, Config, ConfigSource, Environment};
pub use container::Container;
pub use environment::{
    EnvValidator, EnvironmentDetector, FeatureContext, FeatureFlag, FeatureFlagManager, FlagCondition,
    FlagState,
};
pub use errors::{CoreError, CoreResult};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Framework information
pub const FRAMEWORK_NAME: &str = "larix";

/// Get framework version
pub fn version() -> &'static str {
    VERSION
}

/// Get framework name
pub fn name() -> &'static str {
    FRAMEWORK_NAME
}
