//! The per-message request handle passed to every handler.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::trace;

use crate::message::{Headers, InboundMessage, Partition};
use crate::pattern::Params;

#[derive(Debug, Clone)]
struct RouteState {
    path: String,
    params: Params,
    full: bool,
}

struct RequestInner {
    message: InboundMessage,
    body: Option<Value>,
    route: Mutex<RouteState>,
    closed: AtomicBool,
}

/// A handle to the message being dispatched.
///
/// Cloning is cheap; every clone observes the same state. The routing
/// position (`path` and `params`) is updated as the message descends into
/// routers and restored when it leaves them.
#[derive(Clone)]
pub struct Request {
    inner: Arc<RequestInner>,
}

impl Request {
    /// Wraps an inbound message. The value is parsed as JSON when possible.
    pub fn new(message: InboundMessage) -> Self {
        let body = message.value.as_deref().and_then(|raw| {
            serde_json::from_slice(raw)
                .inspect_err(|e| trace!(topic = %message.topic, error = %e, "payload is not JSON"))
                .ok()
        });
        let route = RouteState {
            path: message.topic.clone(),
            params: Params::new(),
            full: true,
        };

        Self {
            inner: Arc::new(RequestInner {
                message,
                body,
                route: Mutex::new(route),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn topic(&self) -> &str {
        &self.inner.message.topic
    }

    pub fn partition(&self) -> &Partition {
        &self.inner.message.partition
    }

    pub fn offset(&self) -> Option<i64> {
        self.inner.message.offset
    }

    pub fn key(&self) -> Option<&Bytes> {
        self.inner.message.key.as_ref()
    }

    /// The key as UTF-8, if it is valid UTF-8.
    pub fn key_str(&self) -> Option<&str> {
        self.key().and_then(|k| std::str::from_utf8(k).ok())
    }

    pub fn value(&self) -> Option<&Bytes> {
        self.inner.message.value.as_ref()
    }

    /// The value as UTF-8, if it is valid UTF-8.
    pub fn value_str(&self) -> Option<&str> {
        self.value().and_then(|v| std::str::from_utf8(v).ok())
    }

    /// The value parsed as JSON. `None` if absent or not valid JSON.
    pub fn body(&self) -> Option<&Value> {
        self.inner.body.as_ref()
    }

    /// Deserializes the JSON payload into `T`.
    pub fn body_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        let raw = self.value().map(|v| v.as_ref()).unwrap_or(b"null".as_slice());
        serde_json::from_slice(raw)
    }

    pub fn headers(&self) -> &Headers {
        &self.inner.message.headers
    }

    pub fn header(&self, name: &str) -> Option<&Bytes> {
        self.inner.message.headers.get(name)
    }

    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.header(name).and_then(|v| std::str::from_utf8(v).ok())
    }

    /// The underlying broker message.
    pub fn message(&self) -> &InboundMessage {
        &self.inner.message
    }

    /// The part of the topic not yet consumed by enclosing routers. Empty
    /// inside a router whose pattern consumed the whole topic.
    pub fn path(&self) -> String {
        self.inner.route.lock().path.clone()
    }

    /// Parameters bound by the current route.
    pub fn params(&self) -> Params {
        self.inner.route.lock().params.clone()
    }

    pub fn param(&self, name: &str) -> Option<String> {
        self.inner.route.lock().params.get(name).cloned()
    }

    /// Returns `true` once the response for this request has ended.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub(crate) fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    /// Narrows the routing position to `rest` and replaces the parameters.
    /// The previous position is restored when the returned guard drops.
    pub(crate) fn enter_scope(&self, rest: &str, params: Params, full: bool) -> RouteScope {
        let mut route = self.inner.route.lock();
        let saved = std::mem::replace(
            &mut *route,
            RouteState {
                path: rest.to_string(),
                params,
                full,
            },
        );
        drop(route);

        RouteScope {
            request: self.clone(),
            saved: Some(saved),
            full,
        }
    }

    /// A scope for a router without a pattern: position unchanged, and the
    /// enclosing router's full-match state carries over.
    pub(crate) fn enter_unscoped(&self) -> RouteScope {
        let full = self.inner.route.lock().full;
        RouteScope {
            request: self.clone(),
            saved: None,
            full,
        }
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let route = self.inner.route.lock();
        f.debug_struct("Request")
            .field("topic", &self.inner.message.topic)
            .field("path", &route.path)
            .field("params", &route.params)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Restores the routing position of a [`Request`] on drop.
pub(crate) struct RouteScope {
    request: Request,
    saved: Option<RouteState>,
    full: bool,
}

impl RouteScope {
    /// Whether the enclosing router consumed the whole remaining path.
    pub(crate) fn is_full(&self) -> bool {
        self.full
    }
}

impl Drop for RouteScope {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            *self.request.inner.route.lock() = saved;
        }
    }
}
