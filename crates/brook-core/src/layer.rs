//! Leaf nodes wrapping a single handler.

use std::panic::{AssertUnwindSafe, catch_unwind};

use futures::FutureExt;
use tracing::warn;

use crate::error::HandlerError;
use crate::handler::{BoxFuture, IntoLayerFn, LayerFn, LayerKind, Next};
use crate::request::Request;
use crate::response::Response;

/// A pipeline node that runs exactly one handler.
///
/// Normal handlers run while the pipeline is clean and are skipped in error
/// mode; error handlers are the opposite. A panic in either kind is caught
/// and turned into a [`HandlerError`].
#[derive(Debug, Clone)]
pub struct Layer {
    name: String,
    handler: LayerFn,
}

impl Layer {
    /// Creates a layer named after the handler's function.
    pub fn new<M>(handler: impl IntoLayerFn<M>) -> Self {
        let handler = handler.into_layer_fn();
        Self {
            name: handler.name.clone(),
            handler,
        }
    }

    /// Creates a layer with an explicit name.
    pub fn named<M>(name: impl Into<String>, handler: impl IntoLayerFn<M>) -> Self {
        Self {
            name: name.into(),
            handler: handler.into_layer_fn(),
        }
    }

    /// Replaces the handler. The layer takes the new handler's name.
    pub fn set<M>(&mut self, handler: impl IntoLayerFn<M>) {
        self.handler = handler.into_layer_fn();
        self.name = self.handler.name.clone();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_error_handler(&self) -> bool {
        self.handler.is_error_handler()
    }

    /// Runs the handler in normal mode. Error handlers are skipped.
    pub fn handle(&self, req: Request, res: Response) -> BoxFuture<'static, Next> {
        match &self.handler.kind {
            LayerKind::Message(handler) => {
                let handler = handler.clone();
                guarded(&self.name, move || handler.call(req, res))
            }
            LayerKind::Error(_) => Box::pin(async { Next::Continue }),
        }
    }

    /// Runs the handler in error mode. Normal handlers pass `err` through.
    pub fn handle_error(
        &self,
        err: HandlerError,
        req: Request,
        res: Response,
    ) -> BoxFuture<'static, Next> {
        match &self.handler.kind {
            LayerKind::Error(handler) => {
                let handler = handler.clone();
                guarded(&self.name, move || handler.call(err, req, res))
            }
            LayerKind::Message(_) => Box::pin(async move { Next::Error(err) }),
        }
    }
}

fn guarded<F>(name: &str, start: F) -> BoxFuture<'static, Next>
where
    F: FnOnce() -> BoxFuture<'static, Next>,
{
    let name = name.to_string();
    let fut = match catch_unwind(AssertUnwindSafe(start)) {
        Ok(fut) => fut,
        Err(payload) => return Box::pin(async move { panicked(&name, payload) }),
    };

    Box::pin(async move {
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(next) => next,
            Err(payload) => panicked(&name, payload),
        }
    })
}

fn panicked(name: &str, payload: Box<dyn std::any::Any + Send>) -> Next {
    let err = HandlerError::from_panic(payload);
    warn!(layer = name, error = %err, "handler panicked");
    Next::Error(err)
}
