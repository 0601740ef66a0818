use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use brook_core::{HandlerError, InboundMessage, Next, Request, Response, Router, Subscription};
use brook_runtime::{
    Application, ApplicationError, Broker, BrokerResult, ClientConfig, Completion, ConfigError,
    Consumer, ConsumerConfig, MemoryBroker,
};
use parking_lot::Mutex;

/// Takes a while to connect, so `listen` can be observed mid-startup.
struct SlowBroker(MemoryBroker);

#[async_trait]
impl Broker for SlowBroker {
    async fn connect(
        &self,
        client: &ClientConfig,
        consumer: &ConsumerConfig,
    ) -> BrokerResult<Arc<dyn Consumer>> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.0.connect(client, consumer).await
    }
}

fn configs() -> (ClientConfig, ConsumerConfig) {
    (
        ClientConfig::new("brook-test", ["localhost:9092"]),
        ConsumerConfig::new("brook-test-group"),
    )
}

async fn wait_connected(broker: &MemoryBroker) {
    while !broker.is_connected() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_messages_are_processed_one_at_a_time() {
    let broker = MemoryBroker::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut app = Application::new().bind(broker.clone());
    let sink = seen.clone();
    app.route("orders.:id", move |req: Request| {
        let sink = sink.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            sink.lock().push(req.param("id").unwrap_or_default());
        }
    })
    .unwrap();

    for id in ["1", "2", "3"] {
        broker.publish(InboundMessage::new(format!("orders.{id}"))).unwrap();
    }
    broker.close();

    let (client, consumer) = configs();
    app.listen(&client, &consumer).await.unwrap();

    assert_eq!(*seen.lock(), vec!["1", "2", "3"]);
    assert_eq!(broker.max_in_flight(), 1);
    let offsets: Vec<_> = broker
        .completions()
        .into_iter()
        .map(|(meta, done)| (meta.offset, done.is_success()))
        .collect();
    assert_eq!(offsets, vec![(Some(0), true), (Some(1), true), (Some(2), true)]);
    assert!(!broker.is_connected());
}

#[tokio::test]
async fn test_unhandled_error_fails_completion() {
    let broker = MemoryBroker::new();
    let mut app = Application::new().bind(broker.clone());
    app.route("orders.fail", || async { Next::error("rejected") })
        .unwrap();
    app.route("orders.ok", || async {}).unwrap();

    broker.publish(InboundMessage::new("orders.fail")).unwrap();
    broker.publish(InboundMessage::new("orders.ok")).unwrap();
    broker.close();

    let (client, consumer) = configs();
    app.listen(&client, &consumer).await.unwrap();

    let completions = broker.completions();
    assert_eq!(completions.len(), 2);
    match &completions[0].1 {
        Completion::Failed(err) => assert_eq!(err.to_string(), "rejected"),
        Completion::Success => panic!("expected failure"),
    }
    assert!(completions[1].1.is_success());
}

#[tokio::test]
async fn test_subscribes_to_registered_topics() {
    let broker = MemoryBroker::new();
    let mut app = Application::new().bind(broker.clone());
    app.route("audit", || async {}).unwrap();
    let mut orders = Router::new("orders").unwrap();
    orders.route("created", || async {}).unwrap();
    app.mount(orders).unwrap();

    // Matches nothing, so it is dropped before dispatch.
    broker.publish(InboundMessage::new("payments")).unwrap();
    broker.publish(InboundMessage::new("ORDERS.created")).unwrap();
    broker.close();

    let (client, consumer) = configs();
    app.listen(&client, &consumer).await.unwrap();

    assert_eq!(
        broker.subscriptions(),
        vec![
            Subscription::Regex(r"^(?i)audit(?:\.)?$".into()),
            Subscription::Regex(r"^(?i)orders\.created(?:\.)?$".into()),
        ]
    );
    let completions = broker.completions();
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].0.topic, "ORDERS.created");
}

#[tokio::test]
async fn test_invalid_config_fails_before_connecting() {
    let broker = MemoryBroker::new();
    let mut app = Application::new().bind(broker.clone());
    app.route("orders", || async {}).unwrap();

    let (_, consumer) = configs();
    let client = ClientConfig::new("", ["localhost:9092"]);
    let err = app.listen(&client, &consumer).await.unwrap_err();
    assert!(matches!(
        err,
        ApplicationError::Config(ConfigError::MissingField { ref field }) if field == "client.client_id"
    ));
    assert_eq!(broker.connect_count(), 0);
}

#[tokio::test]
async fn test_no_topics_fails_before_connecting() {
    let broker = MemoryBroker::new();
    let mut app = Application::new().bind(broker.clone());
    app.use_handler(|| async {});

    let (client, consumer) = configs();
    let err = app.listen(&client, &consumer).await.unwrap_err();
    assert!(matches!(err, ApplicationError::Config(ConfigError::NoTopics)));
    assert_eq!(broker.connect_count(), 0);
}

#[tokio::test]
async fn test_stop_ends_listen() {
    let broker = MemoryBroker::new();
    let mut app = Application::new().bind(broker.clone());
    app.route("orders", || async {}).unwrap();
    let app = Arc::new(app);

    let (client, consumer) = configs();
    let listener = {
        let app = app.clone();
        let (client, consumer) = (client.clone(), consumer.clone());
        tokio::spawn(async move { app.listen(&client, &consumer).await })
    };
    wait_connected(&broker).await;

    let err = app.listen(&client, &consumer).await.unwrap_err();
    assert!(matches!(err, ApplicationError::AlreadyListening));

    app.stop().await;
    app.stop().await;
    listener.await.unwrap().unwrap();
    assert!(!broker.is_connected());

    // A stopped application can listen again.
    broker.publish(InboundMessage::new("orders")).unwrap();
    broker.close();
    app.listen(&client, &consumer).await.unwrap();
    assert_eq!(broker.connect_count(), 2);
    assert_eq!(broker.completions().len(), 1);
}

#[tokio::test]
async fn test_stop_waits_for_in_flight_message() {
    let broker = MemoryBroker::new();
    let mut app = Application::new().bind(broker.clone());
    app.route("slow", |_req: Request, res: Response| async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        res.end()
    })
    .unwrap();
    let app = Arc::new(app);

    broker.publish(InboundMessage::new("slow")).unwrap();
    let (client, consumer) = configs();
    let listener = {
        let app = app.clone();
        tokio::spawn(async move { app.listen(&client, &consumer).await })
    };
    wait_connected(&broker).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    app.stop().await;
    assert_eq!(broker.completions().len(), 1);
    listener.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_run_until_shuts_down() {
    let broker = MemoryBroker::new();
    let mut app = Application::new().bind(broker.clone());
    app.route("orders", || async {}).unwrap();

    let (client, consumer) = configs();
    app.run_until(&client, &consumer, tokio::time::sleep(Duration::from_millis(20)))
        .await
        .unwrap();
    assert_eq!(broker.connect_count(), 1);
    assert!(!broker.is_connected());
}

#[tokio::test]
async fn test_error_handler_recovers_before_completion() {
    let broker = MemoryBroker::new();
    let mut app = Application::new().bind(broker.clone());
    app.route("orders", || async { Next::error("boom") }).unwrap();
    app.use_handler(|err: HandlerError, _req: Request, res: Response| async move {
        assert_eq!(err.to_string(), "boom");
        res.end()?;
        Ok::<_, brook_core::UsageError>(Next::Handled)
    });

    broker.publish(InboundMessage::new("orders")).unwrap();
    broker.close();

    let (client, consumer) = configs();
    app.listen(&client, &consumer).await.unwrap();
    assert!(broker.completions()[0].1.is_success());
}

#[tokio::test]
async fn test_stop_during_startup_is_not_lost() {
    let broker = MemoryBroker::new();
    let mut app = Application::new().bind(SlowBroker(broker.clone()));
    app.route("orders", || async {}).unwrap();
    let app = Arc::new(app);

    let (client, consumer) = configs();
    let listener = {
        let app = app.clone();
        let (client, consumer) = (client.clone(), consumer.clone());
        tokio::spawn(async move { app.listen(&client, &consumer).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(broker.connect_count(), 0);

    tokio::time::timeout(Duration::from_secs(2), app.stop())
        .await
        .expect("stop returns once the starting listener winds down");
    listener.await.unwrap().unwrap();
    assert_eq!(broker.connect_count(), 1);
    assert!(!broker.is_connected());

    // The next listen starts with a fresh token.
    broker.publish(InboundMessage::new("orders")).unwrap();
    broker.close();
    app.listen(&client, &consumer).await.unwrap();
    assert_eq!(broker.completions().len(), 1);
}
