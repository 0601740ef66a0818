//! `tower::Service` adapter for per-message dispatch.
//!
//! [`MessageService`] lets tower middleware wrap [`Application::on_message`]:
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use tower::{ServiceBuilder, ServiceExt};
//!
//! let svc = ServiceBuilder::new()
//!     .timeout(Duration::from_secs(5))
//!     .service(Arc::new(app).into_service());
//! svc.oneshot(message).await?;
//! ```

use std::sync::Arc;
use std::task::{Context, Poll};

use brook_core::{BoxFuture, InboundMessage};
use tower::Service;

use crate::application::Application;
use crate::error::ApplicationError;

/// Dispatches each request message through a shared [`Application`].
#[derive(Clone)]
pub struct MessageService {
    app: Arc<Application>,
}

impl MessageService {
    pub fn new(app: Arc<Application>) -> Self {
        Self { app }
    }

    pub fn application(&self) -> &Arc<Application> {
        &self.app
    }
}

impl Service<InboundMessage> for MessageService {
    type Response = ();
    type Error = ApplicationError;
    type Future = BoxFuture<'static, Result<(), ApplicationError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, message: InboundMessage) -> Self::Future {
        let app = Arc::clone(&self.app);
        Box::pin(async move { app.on_message(message).await })
    }
}
