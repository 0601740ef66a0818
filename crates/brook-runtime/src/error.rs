//! Runtime error types.

use brook_core::{HandlerError, UsageError};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised by a broker client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// Could not reach or authenticate with the brokers.
    #[error("Broker connection failed: {0}")]
    Connection(String),

    /// The subscription request was rejected.
    #[error("Subscription failed: {0}")]
    Subscribe(String),

    /// The consumer was used after it was disconnected.
    #[error("Consumer is closed")]
    Closed,

    #[error("Broker error: {0}")]
    Other(String),
}

/// Result type for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Errors that can occur while running an application.
#[derive(Error, Debug)]
pub enum ApplicationError {
    /// Configuration is incomplete or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Usage(#[from] UsageError),

    /// An error reached the end of the routing tree without being handled.
    #[error("Unhandled error: {0}")]
    Unhandled(HandlerError),

    /// `listen` was called without a bound broker.
    #[error("No broker bound to the application")]
    NoBroker,

    /// `listen` was called while a consume loop is already running.
    #[error("Application is already listening")]
    AlreadyListening,
}

impl ApplicationError {
    /// The handler error, if this is an unhandled-error failure.
    pub fn handler_error(&self) -> Option<&HandlerError> {
        match self {
            Self::Unhandled(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type for application operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
