//! # Brook Core
//!
//! Topic routing and dispatch for message-broker consumers.
//!
//! This crate provides:
//! - Topic patterns with `:param` and trailing `*` segments
//! - Layers wrapping Axum-style async handler functions
//! - Routers that nest under topic prefixes
//! - The dispatch engine driving a message through the routing tree
//!
//! Broker connections and process lifecycle live in `brook-runtime`.

pub mod dispatch;
pub mod error;
pub mod handler;
pub mod layer;
pub mod message;
pub mod pattern;
pub mod request;
pub mod response;
pub mod router;

pub use dispatch::{Mode, PipelineRun, RunResult, Step, dispatch};
pub use error::{HandlerError, PanicError, PatternError, RegistrationError, UsageError};
pub use handler::{
    BoxFuture, ErasedErrorHandler, ErasedHandler, ErrorHandler, Handler, HandlerFn, IntoLayerFn,
    IntoNext, LayerFn, Next,
};
pub use layer::Layer;
pub use message::{Headers, InboundMessage, MessageMeta, Partition};
pub use pattern::{Params, PathMatch, Pattern, PatternOptions, Subscription};
pub use request::Request;
pub use response::{EndSignal, Response};
pub use router::{Node, Router};
