//! # Brook
//!
//! Topic-routed message consumers for Rust.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐     ┌─────────────┐     ┌──────────────────────────────────────┐
//! │  Broker  │────▶│ Application │────▶│ Router "orders"  ─▶ Layer ─▶ Layer   │
//! │(Consumer)│◀────│ (root)      │     │ Router "audit.*" ─▶ Layer            │
//! └──────────┘     └─────────────┘     │ Layer (error handler)                │
//!   complete                           └──────────────────────────────────────┘
//! ```
//!
//! - **Application**: the root router, bound to a broker; runs the consume loop
//! - **Router**: a topic pattern plus an ordered list of layers and routers
//! - **Layer**: one async handler function, picked by its arguments
//! - **Next**: what a handler tells the pipeline to do afterwards
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use brook::prelude::*;
//!
//! async fn created(req: Request) -> Result<(), HandlerError> {
//!     let id = req.param("id").unwrap_or_default();
//!     tracing::info!(%id, "order created");
//!     Ok(())
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::new().load()?;
//!     init_from_config(&config.logging);
//!
//!     let mut app = Application::new().bind(MemoryBroker::new());
//!     app.route("orders.:id.created", created)?;
//!     app.run(&config.client, &config.consumer).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: load `brook.toml` (default)
//! - `yaml-config`: load `brook.yaml`
//! - `json-log`: JSON log output

pub use brook_core as core;
pub use brook_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use brook::prelude::*;
/// ```
pub mod prelude {
    // Application root and broker seam
    pub use brook_runtime::{
        Application, ApplicationError, Broker, Completion, Consumer, MemoryBroker, MessageService,
    };

    // Configuration and logging
    pub use brook_runtime::config::{BrookConfig, ClientConfig, ConfigLoader, ConsumerConfig};
    pub use brook_runtime::logging::{LoggingBuilder, SpanEvents, init_from_config};

    // Routing tree
    pub use brook_core::{Layer, Pattern, PatternOptions, Router};

    // Handler signatures
    pub use brook_core::{HandlerError, InboundMessage, Next, Request, Response};
}
