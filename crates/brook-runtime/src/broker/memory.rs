use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use brook_core::{InboundMessage, MessageMeta, Subscription};
use parking_lot::Mutex;
use regex::Regex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

use super::{Broker, Completion, Consumer};
use crate::config::{ClientConfig, ConsumerConfig};
use crate::error::{BrokerError, BrokerResult};

struct Shared {
    tx: Mutex<Option<mpsc::UnboundedSender<InboundMessage>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<InboundMessage>>,
    subscriptions: Mutex<Vec<Subscription>>,
    filters: Mutex<Vec<Filter>>,
    completions: Mutex<Vec<(MessageMeta, Completion)>>,
    completed: watch::Sender<usize>,
    next_offset: AtomicI64,
    connected: AtomicBool,
    connects: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

enum Filter {
    Exact(String),
    Regex(Regex),
}

impl Filter {
    fn matches(&self, topic: &str) -> bool {
        match self {
            Self::Exact(name) => name == topic,
            Self::Regex(re) => re.is_match(topic),
        }
    }
}

/// An in-process broker.
///
/// Messages published before or after `listen` are queued and delivered in
/// order; those matching no subscription are dropped on delivery. Every
/// completion is recorded, and the broker tracks how many messages were in
/// flight at once.
#[derive(Clone)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (completed, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                tx: Mutex::new(Some(tx)),
                rx: tokio::sync::Mutex::new(rx),
                subscriptions: Mutex::new(Vec::new()),
                filters: Mutex::new(Vec::new()),
                completions: Mutex::new(Vec::new()),
                completed,
                next_offset: AtomicI64::new(0),
                connected: AtomicBool::new(false),
                connects: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }),
        }
    }

    /// Queues a message. Messages without an offset get the next one.
    pub fn publish(&self, mut message: InboundMessage) -> BrokerResult<()> {
        if message.offset.is_none() {
            message.offset = Some(self.shared.next_offset.fetch_add(1, Ordering::Relaxed));
        }
        let tx = self.shared.tx.lock();
        let tx = tx.as_ref().ok_or(BrokerError::Closed)?;
        tx.send(message).map_err(|_| BrokerError::Closed)
    }

    /// Ends the stream once queued messages have been delivered.
    pub fn close(&self) {
        self.shared.tx.lock().take();
    }

    /// Subscriptions received from the last consumer.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.shared.subscriptions.lock().clone()
    }

    /// Every completion reported so far, in order.
    pub fn completions(&self) -> Vec<(MessageMeta, Completion)> {
        self.shared.completions.lock().clone()
    }

    /// Waits until at least `count` completions have been reported.
    pub async fn wait_for_completions(&self, count: usize) {
        let mut rx = self.shared.completed.subscribe();
        let _ = rx.wait_for(|done| *done >= count).await;
    }

    /// The largest number of messages handed out but not yet completed.
    pub fn max_in_flight(&self) -> usize {
        self.shared.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// How many times a consumer connected.
    pub fn connect_count(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn connect(
        &self,
        client: &ClientConfig,
        consumer: &ConsumerConfig,
    ) -> BrokerResult<Arc<dyn Consumer>> {
        debug!(
            client_id = %client.client_id,
            group_id = %consumer.group_id,
            "memory consumer connected"
        );
        self.shared.connected.store(true, Ordering::SeqCst);
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryConsumer {
            shared: self.shared.clone(),
        }))
    }
}

struct MemoryConsumer {
    shared: Arc<Shared>,
}

impl MemoryConsumer {
    fn ensure_connected(&self) -> BrokerResult<()> {
        if self.shared.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrokerError::Closed)
        }
    }

    fn accepts(&self, topic: &str) -> bool {
        self.shared.filters.lock().iter().any(|f| f.matches(topic))
    }
}

#[async_trait]
impl Consumer for MemoryConsumer {
    async fn subscribe(&self, subscriptions: &[Subscription]) -> BrokerResult<()> {
        self.ensure_connected()?;

        let filters = subscriptions
            .iter()
            .map(|s| match s {
                Subscription::Exact(topic) => Ok(Filter::Exact(topic.clone())),
                Subscription::Regex(source) => Regex::new(source)
                    .map(Filter::Regex)
                    .map_err(|e| BrokerError::Subscribe(e.to_string())),
            })
            .collect::<BrokerResult<Vec<_>>>()?;

        *self.shared.filters.lock() = filters;
        *self.shared.subscriptions.lock() = subscriptions.to_vec();
        Ok(())
    }

    async fn next_message(&self) -> BrokerResult<Option<InboundMessage>> {
        let mut rx = self.shared.rx.lock().await;
        loop {
            self.ensure_connected()?;
            let Some(message) = rx.recv().await else {
                return Ok(None);
            };
            if !self.accepts(&message.topic) {
                trace!(topic = %message.topic, "no subscription for topic, dropping");
                continue;
            }

            let in_flight = self.shared.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.shared
                .max_in_flight
                .fetch_max(in_flight, Ordering::SeqCst);
            return Ok(Some(message));
        }
    }

    async fn complete(&self, meta: &MessageMeta, completion: &Completion) -> BrokerResult<()> {
        self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
        let count = {
            let mut completions = self.shared.completions.lock();
            completions.push((meta.clone(), completion.clone()));
            completions.len()
        };
        self.shared.completed.send_replace(count);
        Ok(())
    }

    async fn disconnect(&self) -> BrokerResult<()> {
        self.shared.connected.store(false, Ordering::SeqCst);
        debug!("memory consumer disconnected");
        Ok(())
    }
}
