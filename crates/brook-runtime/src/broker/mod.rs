//! The broker client seam.
//!
//! The application talks to a message broker only through these two traits.
//! A [`Broker`] opens a [`Consumer`] for a client and group configuration;
//! the consumer delivers messages one at a time and is told how each one
//! ended. [`MemoryBroker`] is an in-process implementation.

mod memory;

pub use memory::MemoryBroker;

use std::sync::Arc;

use async_trait::async_trait;
use brook_core::{HandlerError, InboundMessage, MessageMeta, Subscription};

use crate::config::{ClientConfig, ConsumerConfig};
use crate::error::BrokerResult;

/// The outcome of dispatching one message.
#[derive(Debug, Clone)]
pub enum Completion {
    /// The pipeline finished without an unhandled error.
    Success,
    /// An error reached the end of the pipeline.
    Failed(HandlerError),
}

impl Completion {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Factory for consumers.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Connects a consumer that joins `consumer.group_id`.
    async fn connect(
        &self,
        client: &ClientConfig,
        consumer: &ConsumerConfig,
    ) -> BrokerResult<Arc<dyn Consumer>>;
}

/// A connected consumer.
#[async_trait]
pub trait Consumer: Send + Sync {
    async fn subscribe(&self, subscriptions: &[Subscription]) -> BrokerResult<()>;

    /// The next message, or `None` once the stream has ended.
    async fn next_message(&self) -> BrokerResult<Option<InboundMessage>>;

    /// Reports how a message ended. Called once per delivered message,
    /// before the next one is requested.
    async fn complete(&self, meta: &MessageMeta, completion: &Completion) -> BrokerResult<()>;

    async fn disconnect(&self) -> BrokerResult<()>;
}
