use std::sync::Arc;
use std::time::Duration;

use brook_core::InboundMessage;
use brook_runtime::Application;
use tower::timeout::error::Elapsed;
use tower::{ServiceBuilder, ServiceExt};

#[tokio::test]
async fn test_timeout_layer_wraps_dispatch() {
    let mut app = Application::new();
    app.route("slow", || async {
        tokio::time::sleep(Duration::from_millis(200)).await;
    })
    .unwrap();
    app.route("fast", || async {}).unwrap();
    let app = Arc::new(app);

    let svc = ServiceBuilder::new()
        .timeout(Duration::from_millis(20))
        .service(app.into_service());

    assert!(svc.clone().oneshot(InboundMessage::new("fast")).await.is_ok());
    let err = svc.oneshot(InboundMessage::new("slow")).await.unwrap_err();
    assert!(err.is::<Elapsed>());
}
