//! The application root.
//!
//! An [`Application`] owns the root [`Router`] and a bound [`Broker`]. Once
//! the tree is registered it is shared behind an `Arc` and [`listen`]
//! runs the consume loop:
//!
//! ```text
//! next_message ──▶ on_message ──▶ Router::dispatch ──▶ complete ──▶ next_message
//! ```
//!
//! Only one message is in flight at a time; the next one is fetched after
//! the consumer has been told how the previous one ended.
//!
//! [`listen`]: Application::listen

use std::future::Future;
use std::sync::Arc;

use brook_core::{
    HandlerError, InboundMessage, IntoLayerFn, Layer, Node, Pattern, RegistrationError, Request,
    Response, Router, RunResult, Subscription,
};
use parking_lot::Mutex;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Level, debug, error, info, span, warn};

use crate::broker::{Broker, Completion, Consumer};
use crate::config::{ClientConfig, ConsumerConfig, validate_listen};
use crate::error::{ApplicationError, ApplicationResult};
use crate::service::MessageService;

/// A message-consuming application.
pub struct Application {
    router: Router,
    broker: Option<Arc<dyn Broker>>,
    consumer: Mutex<Option<Arc<dyn Consumer>>>,
    shutdown: Mutex<CancellationToken>,
    running: tokio::sync::Mutex<()>,
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

impl Application {
    pub fn new() -> Self {
        Self {
            router: Router::root(),
            broker: None,
            consumer: Mutex::new(None),
            shutdown: Mutex::new(CancellationToken::new()),
            running: tokio::sync::Mutex::new(()),
        }
    }

    /// Attaches the broker `listen` connects through.
    pub fn bind(mut self, broker: impl Broker + 'static) -> Self {
        self.broker = Some(Arc::new(broker));
        self
    }

    pub fn bind_shared(mut self, broker: Arc<dyn Broker>) -> Self {
        self.broker = Some(broker);
        self
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Appends a handler that sees every message.
    pub fn use_handler<M>(&mut self, handler: impl IntoLayerFn<M>) -> &mut Self {
        self.router.add_handler(handler);
        self
    }

    pub fn use_layer(&mut self, layer: Layer) -> &mut Self {
        self.router.add_layer(layer);
        self
    }

    /// Registers `handler` under `pattern`.
    pub fn route<M>(
        &mut self,
        pattern: &str,
        handler: impl IntoLayerFn<M>,
    ) -> Result<&mut Self, RegistrationError> {
        self.router.route(pattern, handler)?;
        Ok(self)
    }

    /// Registers several layers under one `pattern`, run in order.
    pub fn route_layers<I>(
        &mut self,
        pattern: &str,
        layers: I,
    ) -> Result<&mut Self, RegistrationError>
    where
        I: IntoIterator<Item = Layer>,
    {
        self.router.route_layers(pattern, layers)?;
        Ok(self)
    }

    pub fn mount(&mut self, router: Router) -> Result<&mut Self, RegistrationError> {
        self.router.mount(router)?;
        Ok(self)
    }

    pub fn extend<I>(&mut self, nodes: I) -> Result<&mut Self, RegistrationError>
    where
        I: IntoIterator,
        I::Item: Into<Node>,
    {
        self.router.extend(nodes)?;
        Ok(self)
    }

    /// The root router.
    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn paths(&self) -> Vec<String> {
        self.router.paths()
    }

    pub fn topics(&self) -> Vec<Pattern> {
        self.router.topics()
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.router.subscriptions()
    }

    /// Wraps the application in a `tower::Service`.
    pub fn into_service(self: Arc<Self>) -> MessageService {
        MessageService::new(self)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Checks the configuration and the routing tree without connecting.
    pub fn validate(
        &self,
        client: &ClientConfig,
        consumer: &ConsumerConfig,
    ) -> ApplicationResult<()> {
        validate_listen(client, consumer, &self.subscriptions())?;
        Ok(())
    }

    /// Connects, subscribes, and consumes until [`stop`](Self::stop) is
    /// called or the stream ends.
    pub async fn listen(
        &self,
        client: &ClientConfig,
        consumer: &ConsumerConfig,
    ) -> ApplicationResult<()> {
        self.validate(client, consumer)?;
        let broker = self.broker.clone().ok_or(ApplicationError::NoBroker)?;
        let _running = self
            .running
            .try_lock()
            .map_err(|_| ApplicationError::AlreadyListening)?;

        // Only `stop` and `run_until` replace the token, and only once the
        // loop has released `running`, so a cancellation issued from here on
        // is never lost.
        let token = self.shutdown.lock().clone();

        let subscriptions = self.subscriptions();
        info!(
            client_id = %client.client_id,
            group_id = %consumer.group_id,
            brokers = ?client.brokers,
            "Connecting consumer"
        );
        let conn = broker.connect(client, consumer).await?;
        *self.consumer.lock() = Some(conn.clone());

        if let Err(e) = conn.subscribe(&subscriptions).await {
            self.disconnect().await;
            return Err(e.into());
        }
        info!(topics = ?self.paths(), "Consumer subscribed");

        let result = self.consume(conn.as_ref(), &token).await;
        self.disconnect().await;
        result
    }

    async fn consume(
        &self,
        consumer: &dyn Consumer,
        token: &CancellationToken,
    ) -> ApplicationResult<()> {
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("Consume loop cancelled");
                    return Ok(());
                }
                next = consumer.next_message() => next,
            };

            let message = match next? {
                Some(message) => message,
                None => {
                    info!("Message stream ended");
                    return Ok(());
                }
            };

            let meta = message.meta();
            let completion = match self.on_message(message).await {
                Ok(()) => Completion::Success,
                Err(ApplicationError::Unhandled(err)) => {
                    warn!(meta = %meta, error = %err, "Unhandled error in routing tree");
                    Completion::Failed(err)
                }
                Err(other) => {
                    error!(meta = %meta, error = %other, "Message dispatch failed");
                    Completion::Failed(HandlerError::new(other))
                }
            };

            consumer.complete(&meta, &completion).await?;
        }
    }

    /// Dispatches one message through the routing tree.
    ///
    /// Resolves once the response has ended. A handler that ends the response
    /// itself makes the completion successful even if an error follows.
    pub async fn on_message(&self, message: InboundMessage) -> ApplicationResult<()> {
        let span = span!(
            Level::DEBUG,
            "dispatch",
            topic = %message.topic,
            partition = %message.partition,
            offset = ?message.offset,
        );

        async move {
            let req = Request::new(message);
            let (res, ended) = Response::new(&req);

            let result = self.router.dispatch(&req, &res).await;
            let exited = matches!(result, RunResult::Exited);
            match result {
                RunResult::Completed(Some(err)) if res.is_ended() => {
                    warn!(error = %err, "Error raised after the response ended");
                    Ok(())
                }
                RunResult::Completed(Some(err)) => Err(ApplicationError::Unhandled(err)),
                RunResult::Completed(None) | RunResult::Exited => {
                    if !res.is_ended() {
                        res.end()?;
                    }
                    // The sender lives in `res`, so the signal always resolves here.
                    let _ = ended.await;
                    debug!(exited, "Message handled");
                    Ok(())
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Stops the consume loop and disconnects. Safe to call repeatedly.
    pub async fn stop(&self) {
        self.shutdown.lock().cancel();
        // Wait for an in-progress message and the loop to wind down.
        let _running = self.running.lock().await;
        self.disconnect().await;
        self.reset_shutdown();
    }

    fn reset_shutdown(&self) {
        let mut token = self.shutdown.lock();
        if token.is_cancelled() {
            *token = CancellationToken::new();
        }
    }

    /// Listens until Ctrl+C or SIGTERM, then stops gracefully.
    pub async fn run(
        &self,
        client: &ClientConfig,
        consumer: &ConsumerConfig,
    ) -> ApplicationResult<()> {
        self.run_until(client, consumer, wait_for_shutdown()).await
    }

    /// Listens until `shutdown` resolves, then stops gracefully.
    pub async fn run_until<F>(
        &self,
        client: &ClientConfig,
        consumer: &ConsumerConfig,
        shutdown: F,
    ) -> ApplicationResult<()>
    where
        F: Future<Output = ()>,
    {
        let listen = self.listen(client, consumer);
        tokio::pin!(listen);

        tokio::select! {
            result = &mut listen => return result,
            _ = shutdown => info!("Shutting down"),
        }

        self.shutdown.lock().cancel();
        let result = listen.await;
        self.reset_shutdown();
        result
    }

    async fn disconnect(&self) {
        let consumer = self.consumer.lock().take();
        if let Some(consumer) = consumer {
            match consumer.disconnect().await {
                Ok(()) => info!("Consumer disconnected"),
                Err(e) => error!(error = %e, "Error while disconnecting consumer"),
            }
        }
    }
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "Cannot listen for SIGTERM, waiting for Ctrl+C only"),
        }
    }

    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Cannot listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C");
}
