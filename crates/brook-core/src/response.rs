//! The completion gate for one request.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::UsageError;
use crate::request::Request;

/// Receives the signal sent by the first [`Response::end`].
pub type EndSignal = oneshot::Receiver<()>;

struct ResponseInner {
    request: Request,
    ended: AtomicBool,
    done: Mutex<Option<oneshot::Sender<()>>>,
}

/// Completes the processing of one message.
///
/// A handler that takes ownership of the outcome calls [`end`](Self::end).
/// Handlers that never call it leave completion to the application once the
/// pipeline finishes.
#[derive(Clone)]
pub struct Response {
    inner: Arc<ResponseInner>,
}

impl Response {
    /// Creates the response for `request` together with the receiving end of
    /// its completion signal.
    pub fn new(request: &Request) -> (Self, EndSignal) {
        let (tx, rx) = oneshot::channel();
        (Self::build(request, Some(tx)), rx)
    }

    /// Creates a response whose completion nobody awaits.
    pub fn detached(request: &Request) -> Self {
        Self::build(request, None)
    }

    fn build(request: &Request, done: Option<oneshot::Sender<()>>) -> Self {
        Self {
            inner: Arc::new(ResponseInner {
                request: request.clone(),
                ended: AtomicBool::new(false),
                done: Mutex::new(done),
            }),
        }
    }

    /// Ends the response, resolving the completion successfully.
    ///
    /// Returns [`UsageError::AlreadyEnded`] on every call after the first.
    pub fn end(&self) -> Result<(), UsageError> {
        if self.inner.ended.swap(true, Ordering::AcqRel) {
            return Err(UsageError::AlreadyEnded);
        }
        self.inner.request.close();

        let done = self.inner.done.lock().take();
        if let Some(tx) = done {
            // The receiver may already be gone when nobody waits.
            let _ = tx.send(());
        }
        Ok(())
    }

    pub fn is_ended(&self) -> bool {
        self.inner.ended.load(Ordering::Acquire)
    }

    /// The request this response belongs to.
    pub fn request(&self) -> &Request {
        &self.inner.request
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("topic", &self.inner.request.topic())
            .field("ended", &self.is_ended())
            .finish()
    }
}
