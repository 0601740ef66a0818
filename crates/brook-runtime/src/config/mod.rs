//! Configuration for the Brook runtime.
//!
//! Figment-based loading of broker client, consumer group and logging
//! settings, plus the validation `listen` runs before connecting.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BrookConfig, ClientConfig, ConsumerConfig, LogFormat, LogLevel, LogOutput, LoggingConfig,
    SpanEventConfig,
};
pub use validation::{validate_client, validate_config, validate_consumer, validate_listen};
