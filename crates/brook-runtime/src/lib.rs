//! # Brook Runtime
//!
//! Runs a `brook-core` routing tree against a message broker.
//!
//! This layer provides:
//! - [`Application`], the root router bound to a broker, with the consume loop
//! - The [`Broker`]/[`Consumer`] seam and the in-process [`MemoryBroker`]
//! - Figment-based configuration loading and validation
//! - `tracing-subscriber` logging setup
//!
//! ```rust,ignore
//! use brook_runtime::{Application, MemoryBroker, config::ConfigLoader, logging};
//!
//! let config = ConfigLoader::new().load()?;
//! logging::init_from_config(&config.logging);
//!
//! let mut app = Application::new().bind(MemoryBroker::new());
//! app.route("orders.:id", handle_order)?;
//! app.run(&config.client, &config.consumer).await?;
//! ```

pub mod application;
pub mod broker;
pub mod config;
pub mod error;
pub mod logging;
pub mod service;

pub use application::Application;
pub use broker::{Broker, Completion, Consumer, MemoryBroker};
pub use config::{BrookConfig, ClientConfig, ConfigError, ConfigLoader, ConsumerConfig};
pub use error::{ApplicationError, ApplicationResult, BrokerError, BrokerResult};
pub use logging::{LoggingBuilder, SpanEvents, init_from_config};
pub use service::MessageService;
