//! Routers: pattern-gated, ordered lists of layers and nested routers.
//!
//! A router matches its pattern against the part of the topic left over by
//! its ancestors. On a match it narrows [`Request::path`] to the remainder,
//! replaces the request parameters, and runs its children through the
//! dispatch engine. Its own layers only run when the pattern consumed the
//! whole remaining path; a prefix match just gives nested routers a turn.
//!
//! ```rust,ignore
//! let mut orders = Router::new("orders")?;
//! orders.route(":region.created", on_created)?;
//!
//! let mut root = Router::root();
//! root.add_handler(audit);
//! root.mount(orders)?;
//! ```

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, trace};

use crate::dispatch::{PipelineRun, RunResult, dispatch};
use crate::error::{HandlerError, RegistrationError};
use crate::handler::{BoxFuture, IntoLayerFn, Next};
use crate::layer::Layer;
use crate::pattern::{Pattern, PatternOptions, Subscription};
use crate::request::Request;
use crate::response::Response;

/// Name reported by routers without a pattern.
pub const ROOT_NAME: &str = "<root>";

/// A child of a router.
#[derive(Debug, Clone)]
pub enum Node {
    Layer(Layer),
    Router(Router),
}

impl Node {
    /// The layer's handler name, or the router's pattern source.
    pub fn name(&self) -> &str {
        match self {
            Self::Layer(layer) => layer.name(),
            Self::Router(router) => router.name(),
        }
    }

    /// Returns `true` for a [`Layer`] child.
    pub fn is_layer(&self) -> bool {
        matches!(self, Self::Layer(_))
    }

    /// The nested router, if this child is one.
    pub fn as_router(&self) -> Option<&Router> {
        match self {
            Self::Router(router) => Some(router),
            Self::Layer(_) => None,
        }
    }

    /// Runs the node in normal mode.
    pub fn handle(&self, req: Request, res: Response) -> BoxFuture<'_, Next> {
        match self {
            Self::Layer(layer) => layer.handle(req, res),
            Self::Router(router) => router.handle(req, res),
        }
    }

    /// Runs the node in error mode.
    pub fn handle_error(
        &self,
        err: HandlerError,
        req: Request,
        res: Response,
    ) -> BoxFuture<'_, Next> {
        match self {
            Self::Layer(layer) => layer.handle_error(err, req, res),
            Self::Router(router) => router.handle_error(err, req, res),
        }
    }
}

impl From<Layer> for Node {
    fn from(layer: Layer) -> Self {
        Self::Layer(layer)
    }
}

impl From<Router> for Node {
    fn from(router: Router) -> Self {
        Self::Router(router)
    }
}

/// An ordered list of nodes behind an optional topic pattern.
#[derive(Debug, Clone)]
pub struct Router {
    pattern: Option<Pattern>,
    children: Vec<Node>,
    scope: BTreeSet<String>,
}

impl Default for Router {
    fn default() -> Self {
        Self::root()
    }
}

impl Router {
    /// A router without a pattern. It sees every message.
    pub fn root() -> Self {
        Self {
            pattern: None,
            children: Vec::new(),
            scope: BTreeSet::new(),
        }
    }

    /// A router gated by `pattern` with default options.
    pub fn new(pattern: &str) -> Result<Self, RegistrationError> {
        Self::with_options(pattern, PatternOptions::default())
    }

    /// A router gated by `pattern`. The pattern always matches in prefix mode.
    pub fn with_options(pattern: &str, options: PatternOptions) -> Result<Self, RegistrationError> {
        let pattern = Pattern::compile(pattern, options.end(false))?;
        Ok(Self {
            pattern: Some(pattern),
            children: Vec::new(),
            scope: BTreeSet::new(),
        })
    }

    /// The pattern source, or [`ROOT_NAME`] for a pattern-less router.
    pub fn name(&self) -> &str {
        self.pattern.as_ref().map_or(ROOT_NAME, Pattern::source)
    }

    /// The gate pattern, compiled in prefix mode.
    pub fn pattern(&self) -> Option<&Pattern> {
        self.pattern.as_ref()
    }

    /// Children in registration order.
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Number of direct children.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of direct layer children.
    pub fn layer_count(&self) -> usize {
        self.children.iter().filter(|n| n.is_layer()).count()
    }

    /// Number of direct router children.
    pub fn router_count(&self) -> usize {
        self.children.len() - self.layer_count()
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Appends a handler, builder style.
    pub fn handler<M>(mut self, handler: impl IntoLayerFn<M>) -> Self {
        self.add_handler(handler);
        self
    }

    /// Appends a prebuilt layer, builder style.
    pub fn layer(mut self, layer: Layer) -> Self {
        self.add_layer(layer);
        self
    }

    /// Mounts a nested router, builder style.
    pub fn nest(mut self, router: Router) -> Result<Self, RegistrationError> {
        self.mount(router)?;
        Ok(self)
    }

    /// Wraps `handler` in a new layer and appends it.
    pub fn add_handler<M>(&mut self, handler: impl IntoLayerFn<M>) -> &mut Self {
        self.add_layer(Layer::new(handler))
    }

    /// Appends a prebuilt layer.
    pub fn add_layer(&mut self, layer: Layer) -> &mut Self {
        debug!(router = %self.name(), layer = %layer.name(), "adding layer");
        self.children.push(Node::Layer(layer));
        self
    }

    /// Appends a nested router.
    ///
    /// Fails when a sibling already uses the same pattern, or when this
    /// router ends in a wildcard and so leaves nothing for a child to match.
    /// Pattern-less groups are searched for patterned routers too.
    pub fn mount(&mut self, router: Router) -> Result<&mut Self, RegistrationError> {
        if self.pattern.as_ref().is_some_and(Pattern::has_wildcard) {
            if let Some(topic) = router.first_pattern() {
                return Err(RegistrationError::WildcardParent {
                    topic: topic.to_string(),
                    scope: self.name().to_string(),
                });
            }
        }

        if let Some(child) = &router.pattern {
            let topic = child.source().to_string();
            if self.scope.contains(&topic) {
                return Err(RegistrationError::DuplicateTopic {
                    topic,
                    scope: self.name().to_string(),
                });
            }
            self.scope.insert(topic);
        }

        debug!(router = %self.name(), child = %router.name(), "mounting router");
        self.children.push(Node::Router(router));
        Ok(self)
    }

    /// The pattern of this router, or else of the first patterned router
    /// reachable through pattern-less groups.
    fn first_pattern(&self) -> Option<&str> {
        match &self.pattern {
            Some(pattern) => Some(pattern.source()),
            None => self
                .children
                .iter()
                .filter_map(Node::as_router)
                .find_map(Router::first_pattern),
        }
    }

    /// Creates a child router for `pattern` holding `handler`.
    ///
    /// The child inherits this router's pattern options.
    pub fn route<M>(
        &mut self,
        pattern: &str,
        handler: impl IntoLayerFn<M>,
    ) -> Result<&mut Self, RegistrationError> {
        self.route_layers(pattern, [Layer::new(handler)])
    }

    /// Creates a child router for `pattern` holding several layers, run in
    /// order.
    ///
    /// ```rust,ignore
    /// router.route_layers("orders.created", [Layer::new(validate), Layer::new(store)])?;
    /// ```
    pub fn route_layers<I>(
        &mut self,
        pattern: &str,
        layers: I,
    ) -> Result<&mut Self, RegistrationError>
    where
        I: IntoIterator<Item = Layer>,
    {
        let options = self
            .pattern
            .as_ref()
            .map_or_else(PatternOptions::default, Pattern::options);
        let mut child = Router::with_options(pattern, options)?;
        for layer in layers {
            child.add_layer(layer);
        }
        self.mount(child)
    }

    /// Appends every node in order. Routers go through [`mount`](Self::mount).
    pub fn extend<I>(&mut self, nodes: I) -> Result<&mut Self, RegistrationError>
    where
        I: IntoIterator,
        I::Item: Into<Node>,
    {
        for node in nodes {
            match node.into() {
                Node::Layer(layer) => {
                    self.add_layer(layer);
                }
                Node::Router(router) => {
                    self.mount(router)?;
                }
            }
        }
        Ok(self)
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Runs the router in normal mode. Resolves `Continue` on a mismatch.
    pub fn handle(&self, req: Request, res: Response) -> BoxFuture<'_, Next> {
        Box::pin(async move {
            match self.run(&req, &res, None).await {
                Some(result) => result.into_next(),
                None => Next::Continue,
            }
        })
    }

    /// Runs the router in error mode. Passes `err` through on a mismatch.
    pub fn handle_error(
        &self,
        err: HandlerError,
        req: Request,
        res: Response,
    ) -> BoxFuture<'_, Next> {
        Box::pin(async move {
            match self.run(&req, &res, Some(err.clone())).await {
                Some(result) => result.into_next(),
                None => Next::Error(err),
            }
        })
    }

    /// Runs this router as the top of a traversal.
    pub async fn dispatch(&self, req: &Request, res: &Response) -> RunResult {
        self.run(req, res, None)
            .await
            .unwrap_or(RunResult::Completed(None))
    }

    async fn run(
        &self,
        req: &Request,
        res: &Response,
        err: Option<HandlerError>,
    ) -> Option<RunResult> {
        let scope = match &self.pattern {
            None => req.enter_unscoped(),
            Some(pattern) => {
                let path = req.path();
                match pattern.matches(&path) {
                    Some(m) => {
                        let full = m.is_full();
                        req.enter_scope(m.rest, m.params, full)
                    }
                    None => {
                        trace!(router = %self.name(), path = %path, "router skipped");
                        tokio::task::yield_now().await;
                        return None;
                    }
                }
            }
        };

        debug!(
            router = %self.name(),
            full = scope.is_full(),
            error = err.is_some(),
            "entering router"
        );
        let run = PipelineRun::new(&self.children).with_layers(scope.is_full());
        let initial = err.map_or(Next::Continue, Next::Error);
        let result = dispatch(run, initial, req, res).await;
        drop(scope);

        debug!(router = %self.name(), success = result.is_success(), "leaving router");
        Some(result)
    }

    // ------------------------------------------------------------------
    // Derived views
    // ------------------------------------------------------------------

    /// Fully-qualified patterns of every router that owns a layer,
    /// depth first in registration order.
    pub fn topics(&self) -> Vec<Pattern> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        self.collect_topics(None, &mut out, &mut seen);
        out
    }

    /// Sources of [`topics`](Self::topics).
    pub fn paths(&self) -> Vec<String> {
        self.topics()
            .into_iter()
            .map(|p| p.source().to_string())
            .collect()
    }

    /// What a broker client should subscribe with to receive every topic
    /// this tree can handle.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        let mut seen = HashSet::new();
        self.topics()
            .iter()
            .map(Pattern::subscription)
            .filter(|s| seen.insert(s.clone()))
            .collect()
    }

    /// Layers that run when this router fully matches, including those of
    /// pattern-less groups below it.
    fn owns_layers(&self) -> bool {
        self.children.iter().any(|child| match child {
            Node::Layer(_) => true,
            Node::Router(router) => router.pattern.is_none() && router.owns_layers(),
        })
    }

    fn collect_topics(
        &self,
        prefix: Option<&Pattern>,
        out: &mut Vec<Pattern>,
        seen: &mut HashSet<String>,
    ) {
        let qualified = match (prefix, &self.pattern) {
            (Some(parent), Some(own)) => Some(parent.join(own)),
            (None, Some(own)) => Some(own.anchored()),
            (parent, None) => parent.cloned(),
        };

        if self.pattern.is_some() && self.owns_layers() {
            if let Some(topic) = &qualified {
                if seen.insert(topic.source().to_string()) {
                    out.push(topic.clone());
                }
            }
        }

        for child in self.children.iter().filter_map(Node::as_router) {
            child.collect_topics(qualified.as_ref(), out, seen);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::InboundMessage;
    use parking_lot::Mutex;
    use std::sync::Arc;

    type Log = Arc<Mutex<Vec<String>>>;

    fn record(
        log: &Log,
        label: &'static str,
    ) -> impl Fn(Request) -> futures::future::Ready<()> + Clone + Send + Sync + use<> {
        let log = log.clone();
        move |req: Request| {
            log.lock().push(format!("{label}:{}", req.path()));
            futures::future::ready(())
        }
    }

    async fn send(router: &Router, topic: &str) -> RunResult {
        let req = Request::new(InboundMessage::new(topic));
        let res = Response::detached(&req);
        router.dispatch(&req, &res).await
    }

    #[test]
    fn test_sibling_uniqueness() {
        let mut root = Router::root();
        root.mount(Router::new("orders").unwrap()).unwrap();
        let err = root.mount(Router::new("orders").unwrap()).unwrap_err();
        assert_eq!(
            err,
            RegistrationError::DuplicateTopic {
                topic: "orders".into(),
                scope: ROOT_NAME.into()
            }
        );

        let mut other = Router::new("billing").unwrap();
        other.mount(Router::new("orders").unwrap()).unwrap();
        root.mount(other).unwrap();
    }

    #[test]
    fn test_wildcard_parent_rejects_children() {
        let mut all = Router::new("events.*").unwrap();
        let err = all.mount(Router::new("inner").unwrap()).unwrap_err();
        assert!(matches!(err, RegistrationError::WildcardParent { .. }));
        assert!(all.mount(Router::root()).is_ok());
    }

    #[test]
    fn test_wildcard_parent_rejects_grouped_children() {
        let group = Router::root().nest(Router::new("inner").unwrap()).unwrap();
        let nested = Router::root().nest(group.clone()).unwrap();

        let mut all = Router::new("events.*").unwrap();
        let err = all.mount(group).unwrap_err();
        assert_eq!(
            err,
            RegistrationError::WildcardParent {
                topic: "inner".into(),
                scope: "events.*".into()
            }
        );
        assert!(all.mount(nested).is_err());
        assert!(all.paths().is_empty());
    }

    #[tokio::test]
    async fn test_catch_all_router_sees_every_topic() {
        let log = Log::default();
        let mut root = Router::root();
        root.route("*", record(&log, "all")).unwrap();

        for topic in ["my.topic.138", "test.test", "notatopic"] {
            assert!(send(&root, topic).await.is_success());
        }
        assert_eq!(log.lock().len(), 3);
        assert_eq!(root.paths(), vec!["*".to_string()]);
    }

    #[tokio::test]
    async fn test_route_layers_runs_all_in_order() {
        let log = Log::default();
        let mut root = Router::root();
        root.route_layers(
            "test-topic-2",
            [
                Layer::new(record(&log, "a")),
                Layer::new(record(&log, "b")),
                Layer::new(record(&log, "c")),
            ],
        )
        .unwrap();

        send(&root, "test-topic-2").await;
        assert_eq!(*log.lock(), vec!["a:", "b:", "c:"]);
        assert_eq!(root.router_count(), 1);
        assert_eq!(root.children()[0].as_router().map(Router::layer_count), Some(3));
        assert!(root.route_layers("test-topic-2", []).is_err());
    }

    #[tokio::test]
    async fn test_nested_match_narrows_path() {
        let log = Log::default();
        let mut root = Router::root();
        root.add_handler(record(&log, "root"));

        let mut topic = Router::new("topic").unwrap();
        topic.add_handler(record(&log, "topic-layer"));
        topic.route("user", record(&log, "user")).unwrap();
        root.mount(topic).unwrap();
        root.add_handler(record(&log, "after"));

        send(&root, "topic.user").await;
        assert_eq!(
            *log.lock(),
            vec!["root:topic.user", "user:", "after:topic.user"]
        );
    }

    #[tokio::test]
    async fn test_params_visible_in_scope_only() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut root = Router::root();
        root.route("orders.:id", move |req: Request| {
            let sink = sink.clone();
            async move {
                sink.lock().push(req.param("id"));
            }
        })
        .unwrap();
        let sink = seen.clone();
        root.add_handler(move |req: Request| {
            let sink = sink.clone();
            async move {
                sink.lock().push(req.param("id"));
            }
        });

        send(&root, "orders.42").await;
        assert_eq!(*seen.lock(), vec![Some("42".to_string()), None]);
    }

    #[tokio::test]
    async fn test_exit_from_depth_stops_everything() {
        let log = Log::default();
        let inner = Router::new("b")
            .unwrap()
            .handler(|| async { Next::Exit });
        let outer = Router::new("a").unwrap().nest(inner).unwrap();

        let mut root = Router::root();
        root.mount(outer).unwrap();
        root.add_handler(record(&log, "never"));

        assert!(matches!(send(&root, "a.b").await, RunResult::Exited));
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn test_error_reenters_matching_router() {
        let log = Log::default();
        let mut root = Router::root();
        root.add_handler(|| async { Next::error("boom") });

        let mut miss = Router::new("other").unwrap();
        let sink = log.clone();
        miss.add_handler(move |_e: HandlerError, _r: Request, _s: Response| {
            let sink = sink.clone();
            async move {
                sink.lock().push("miss".to_string());
                Next::Handled
            }
        });
        root.mount(miss).unwrap();

        let sink = log.clone();
        let hit = Router::new("topic").unwrap().handler(
            move |e: HandlerError, _r: Request, _s: Response| {
                let sink = sink.clone();
                async move {
                    sink.lock().push(format!("hit:{e}"));
                    Next::Error(e)
                }
            },
        );
        root.mount(hit).unwrap();

        let result = send(&root, "topic").await;
        assert_eq!(*log.lock(), vec!["hit:boom"]);
        assert_eq!(result.error().map(ToString::to_string).as_deref(), Some("boom"));
    }

    #[test]
    fn test_paths_follow_registration() {
        let test = Router::new("test").unwrap().handler(|| async {});
        let times = Router::new("times")
            .unwrap()
            .handler(|| async {})
            .nest(test)
            .unwrap();
        let effort = Router::new("effort").unwrap().nest(times).unwrap();

        let mut root = Router::root();
        root.mount(effort).unwrap();
        root.mount(Router::new("mute").unwrap()).unwrap();
        assert_eq!(root.paths(), vec!["effort.times", "effort.times.test"]);

        let mut root = Router::root();
        root.mount(Router::new("mute").unwrap().handler(|| async {}))
            .unwrap();
        assert_eq!(root.paths(), vec!["mute"]);

        let subs = root.subscriptions();
        assert_eq!(subs, vec![Subscription::Regex(r"^(?i)mute(?:\.)?$".into())]);
    }

    #[test]
    fn test_inspection() {
        let router = Router::new("a")
            .unwrap()
            .handler(|| async {})
            .nest(Router::new("b").unwrap())
            .unwrap();
        assert_eq!(router.name(), "a");
        assert_eq!(router.len(), 2);
        assert_eq!(router.layer_count(), 1);
        assert_eq!(router.router_count(), 1);
        assert_eq!(Router::root().name(), ROOT_NAME);
    }
}
