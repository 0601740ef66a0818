//! Handler traits and the `Next` signal.
//!
//! Handlers are plain async functions. Which trait a function satisfies is
//! decided by its parameter list, in the same way Axum picks handler impls by
//! arity:
//!
//! - normal handlers take `()`, `(Request)` or `(Request, Response)`,
//! - error handlers take `(HandlerError, Request, Response)`.
//!
//! Both kinds return any [`IntoNext`] value, which tells the dispatch engine
//! how to proceed.
//!
//! ```rust,ignore
//! async fn audit(req: Request) {
//!     tracing::info!(topic = req.topic(), "seen");
//! }
//!
//! async fn recover(err: HandlerError, _req: Request, res: Response) -> Result<Next, UsageError> {
//!     tracing::warn!(%err, "recovered");
//!     res.end()?;
//!     Ok(Next::Handled)
//! }
//! ```

use std::any::type_name;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

pub use futures::future::BoxFuture;

use crate::error::HandlerError;
use crate::request::Request;
use crate::response::Response;

/// Name given to handlers whose type has no usable name, such as closures.
pub const ANONYMOUS: &str = "<anonymous>";

// ============================================================================
// Next
// ============================================================================

/// What a handler asks the dispatch engine to do after it returns.
#[derive(Debug, Clone, Default)]
pub enum Next {
    /// Proceed to the next node in normal mode.
    #[default]
    Continue,
    /// Proceed in error mode with this error.
    Error(HandlerError),
    /// The error was dealt with; proceed in normal mode.
    Handled,
    /// Stop the whole traversal. Treated as success.
    Exit,
}

impl Next {
    /// Shorthand for `Next::Error(HandlerError::msg(message))`.
    pub fn error(message: impl std::fmt::Display) -> Self {
        Self::Error(HandlerError::msg(message))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn as_error(&self) -> Option<&HandlerError> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }
}

impl From<HandlerError> for Next {
    fn from(err: HandlerError) -> Self {
        Self::Error(err)
    }
}

/// Conversion of a handler's return value into a [`Next`] signal.
pub trait IntoNext {
    fn into_next(self) -> Next;
}

impl IntoNext for Next {
    fn into_next(self) -> Next {
        self
    }
}

impl IntoNext for () {
    fn into_next(self) -> Next {
        Next::Continue
    }
}

impl<T, E> IntoNext for Result<T, E>
where
    T: IntoNext,
    E: Into<HandlerError>,
{
    fn into_next(self) -> Next {
        match self {
            Ok(value) => value.into_next(),
            Err(err) => Next::Error(err.into()),
        }
    }
}

impl IntoNext for Option<HandlerError> {
    fn into_next(self) -> Next {
        self.map_or(Next::Continue, Next::Error)
    }
}

// ============================================================================
// Handler traits
// ============================================================================

/// A normal handler, invoked while the pipeline is not carrying an error.
pub trait Handler<T>: Clone + Send + Sync + 'static {
    fn call(self, req: Request, res: Response) -> BoxFuture<'static, Next>;
}

/// An error handler, invoked only while the pipeline carries an error.
pub trait ErrorHandler<T>: Clone + Send + Sync + 'static {
    fn call(self, err: HandlerError, req: Request, res: Response) -> BoxFuture<'static, Next>;
}

impl<F, Fut, R> Handler<()> for F
where
    F: FnOnce() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoNext,
{
    fn call(self, _req: Request, _res: Response) -> BoxFuture<'static, Next> {
        Box::pin(async move { (self)().await.into_next() })
    }
}

impl<F, Fut, R> Handler<(Request,)> for F
where
    F: FnOnce(Request) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoNext,
{
    fn call(self, req: Request, _res: Response) -> BoxFuture<'static, Next> {
        Box::pin(async move { (self)(req).await.into_next() })
    }
}

impl<F, Fut, R> Handler<(Request, Response)> for F
where
    F: FnOnce(Request, Response) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoNext,
{
    fn call(self, req: Request, res: Response) -> BoxFuture<'static, Next> {
        Box::pin(async move { (self)(req, res).await.into_next() })
    }
}

impl<F, Fut, R> ErrorHandler<(HandlerError, Request, Response)> for F
where
    F: FnOnce(HandlerError, Request, Response) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoNext,
{
    fn call(self, err: HandlerError, req: Request, res: Response) -> BoxFuture<'static, Next> {
        Box::pin(async move { (self)(err, req, res).await.into_next() })
    }
}

// ============================================================================
// Type erasure
// ============================================================================

/// Wraps a handler function so it can be stored as a trait object.
pub struct HandlerFn<F, T> {
    f: F,
    _marker: PhantomData<fn() -> T>,
}

impl<F, T> HandlerFn<F, T> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<F: Clone, T> Clone for HandlerFn<F, T> {
    fn clone(&self) -> Self {
        Self::new(self.f.clone())
    }
}

/// Object-safe form of [`Handler`].
pub trait ErasedHandler: Send + Sync {
    fn call(&self, req: Request, res: Response) -> BoxFuture<'static, Next>;
}

/// Object-safe form of [`ErrorHandler`].
pub trait ErasedErrorHandler: Send + Sync {
    fn call(&self, err: HandlerError, req: Request, res: Response) -> BoxFuture<'static, Next>;
}

impl<F, T> ErasedHandler for HandlerFn<F, T>
where
    F: Handler<T>,
    T: 'static,
{
    fn call(&self, req: Request, res: Response) -> BoxFuture<'static, Next> {
        self.f.clone().call(req, res)
    }
}

impl<F, T> ErasedErrorHandler for HandlerFn<F, T>
where
    F: ErrorHandler<T>,
    T: 'static,
{
    fn call(&self, err: HandlerError, req: Request, res: Response) -> BoxFuture<'static, Next> {
        self.f.clone().call(err, req, res)
    }
}

/// A type-erased handler of either kind.
#[derive(Clone)]
pub(crate) enum LayerKind {
    Message(Arc<dyn ErasedHandler>),
    Error(Arc<dyn ErasedErrorHandler>),
}

/// A handler function ready to be placed in a [`Layer`](crate::Layer).
#[derive(Clone)]
pub struct LayerFn {
    pub(crate) kind: LayerKind,
    pub(crate) name: String,
}

impl LayerFn {
    /// The name derived from the handler's type.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_error_handler(&self) -> bool {
        matches!(self.kind, LayerKind::Error(_))
    }
}

impl std::fmt::Debug for LayerFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerFn")
            .field("name", &self.name)
            .field("error_handler", &self.is_error_handler())
            .finish()
    }
}

/// Selects the normal-handler conversion in [`IntoLayerFn`].
pub struct OnMessage;

/// Selects the error-handler conversion in [`IntoLayerFn`].
pub struct OnError;

/// Converts a handler function of either kind into a [`LayerFn`].
///
/// The marker parameter `M` is inferred from the function signature and
/// never needs to be written out.
pub trait IntoLayerFn<M> {
    fn into_layer_fn(self) -> LayerFn;
}

impl<F, T> IntoLayerFn<(OnMessage, T)> for F
where
    F: Handler<T>,
    T: 'static,
{
    fn into_layer_fn(self) -> LayerFn {
        LayerFn {
            kind: LayerKind::Message(Arc::new(HandlerFn::new(self))),
            name: handler_name::<F>(),
        }
    }
}

impl<F, T> IntoLayerFn<(OnError, T)> for F
where
    F: ErrorHandler<T>,
    T: 'static,
{
    fn into_layer_fn(self) -> LayerFn {
        LayerFn {
            kind: LayerKind::Error(Arc::new(HandlerFn::new(self))),
            name: handler_name::<F>(),
        }
    }
}

impl IntoLayerFn<()> for LayerFn {
    fn into_layer_fn(self) -> LayerFn {
        self
    }
}

fn handler_name<F>() -> String {
    let full = type_name::<F>();
    if full.contains("{{closure}}") {
        return ANONYMOUS.to_string();
    }
    let path = full.split('<').next().unwrap_or(full);
    path.rsplit("::").next().unwrap_or(path).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::InboundMessage;

    async fn named_handler(_req: Request) {}

    async fn failing() -> Result<(), HandlerError> {
        Err(HandlerError::msg("nope"))
    }

    async fn recover(_err: HandlerError, _req: Request, _res: Response) -> Next {
        Next::Handled
    }

    fn pair() -> (Request, Response) {
        let req = Request::new(InboundMessage::new("t"));
        let res = Response::detached(&req);
        (req, res)
    }

    #[test]
    fn test_into_next_conversions() {
        assert!(matches!(().into_next(), Next::Continue));
        assert!(matches!(Ok::<_, HandlerError>(Next::Exit).into_next(), Next::Exit));
        assert!(Err::<(), _>(HandlerError::msg("x")).into_next().is_error());
        assert!(matches!(None::<HandlerError>.into_next(), Next::Continue));
    }

    #[test]
    fn test_kind_follows_signature() {
        let normal = named_handler.into_layer_fn();
        assert!(!normal.is_error_handler());
        assert_eq!(normal.name(), "named_handler");

        let error = recover.into_layer_fn();
        assert!(error.is_error_handler());

        let closure = (|| async {}).into_layer_fn();
        assert_eq!(closure.name(), ANONYMOUS);
    }

    #[tokio::test]
    async fn test_erased_call() {
        let (req, res) = pair();
        let layer_fn = failing.into_layer_fn();
        let LayerKind::Message(handler) = layer_fn.kind else {
            panic!("expected a normal handler");
        };
        let next = handler.call(req, res).await;
        assert_eq!(next.as_error().map(ToString::to_string).as_deref(), Some("nope"));
    }
}
