//! The dispatch engine.
//!
//! A [`PipelineRun`] is one traversal of one node's child list. It is a small
//! state machine: every call to [`advance`](PipelineRun::advance) feeds it the
//! signal returned by the previous child and gets back the next child to
//! invoke, or the final [`RunResult`]. [`dispatch`] drives a run to the end
//! with a plain loop; nested routers start their own run from inside their
//! `handle` future, so sibling traversal never grows the stack.

use tracing::trace;

use crate::error::HandlerError;
use crate::handler::Next;
use crate::request::Request;
use crate::response::Response;
use crate::router::Node;

/// How a traversal ended.
#[derive(Debug, Clone)]
pub enum RunResult {
    /// Every child was visited. Carries the error still pending at the end.
    Completed(Option<HandlerError>),
    /// A handler returned [`Next::Exit`].
    Exited,
}

impl RunResult {
    /// Maps the result to the signal a parent pipeline continues with.
    pub fn into_next(self) -> Next {
        match self {
            Self::Completed(None) => Next::Continue,
            Self::Completed(Some(err)) => Next::Error(err),
            Self::Exited => Next::Exit,
        }
    }

    /// `true` unless an error reached the end of the list.
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Completed(Some(_)))
    }

    pub fn error(&self) -> Option<&HandlerError> {
        match self {
            Self::Completed(Some(err)) => Some(err),
            _ => None,
        }
    }
}

/// The mode a child is invoked in.
#[derive(Debug, Clone)]
pub enum Mode {
    Normal,
    Error(HandlerError),
}

/// One step of a [`PipelineRun`].
#[derive(Debug)]
pub enum Step<'a> {
    /// Invoke `node` in `mode`.
    Invoke { node: &'a Node, mode: Mode },
    /// The run is over.
    Done(RunResult),
}

/// Cursor state for one traversal of a child list.
#[derive(Debug)]
pub struct PipelineRun<'a> {
    children: &'a [Node],
    index: usize,
    error: Option<HandlerError>,
    layers: bool,
    done: Option<RunResult>,
}

impl<'a> PipelineRun<'a> {
    pub fn new(children: &'a [Node]) -> Self {
        Self {
            children,
            index: 0,
            error: None,
            layers: true,
            done: None,
        }
    }

    /// Controls whether Layer children are invoked. Disabled runs only visit
    /// nested routers.
    pub fn with_layers(mut self, enabled: bool) -> Self {
        self.layers = enabled;
        self
    }

    /// Index of the next child to visit.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_done(&self) -> bool {
        self.done.is_some()
    }

    /// The error currently carried by the run.
    pub fn error(&self) -> Option<&HandlerError> {
        self.error.as_ref()
    }

    pub fn children(&self) -> &'a [Node] {
        self.children
    }

    /// Feeds the signal from the previous child and returns the next step.
    pub fn advance(&mut self, signal: Next) -> Step<'a> {
        if let Some(result) = &self.done {
            return Step::Done(result.clone());
        }

        match signal {
            Next::Exit => return self.finish(RunResult::Exited),
            Next::Handled | Next::Continue => self.error = None,
            Next::Error(err) => self.error = Some(err),
        }

        while let Some(node) = self.children.get(self.index) {
            self.index += 1;
            if !self.layers && node.is_layer() {
                continue;
            }
            let mode = match &self.error {
                Some(err) => Mode::Error(err.clone()),
                None => Mode::Normal,
            };
            return Step::Invoke { node, mode };
        }

        let result = RunResult::Completed(self.error.take());
        self.finish(result)
    }

    fn finish(&mut self, result: RunResult) -> Step<'a> {
        self.done = Some(result.clone());
        Step::Done(result)
    }
}

/// Drives `run` to completion, starting with `initial`.
pub async fn dispatch(
    mut run: PipelineRun<'_>,
    initial: Next,
    req: &Request,
    res: &Response,
) -> RunResult {
    tokio::task::yield_now().await;

    let mut signal = initial;
    loop {
        match run.advance(signal) {
            Step::Invoke { node, mode } => {
                trace!(node = %node.name(), index = run.index() - 1, mode = ?ModeTag(&mode), "invoke");
                signal = match mode {
                    Mode::Normal => node.handle(req.clone(), res.clone()).await,
                    Mode::Error(err) => node.handle_error(err, req.clone(), res.clone()).await,
                };
            }
            Step::Done(result) => {
                trace!(success = result.is_success(), "run finished");
                tokio::task::yield_now().await;
                return result;
            }
        }
    }
}

struct ModeTag<'a>(&'a Mode);

impl std::fmt::Debug for ModeTag<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Mode::Normal => f.write_str("normal"),
            Mode::Error(_) => f.write_str("error"),
        }
    }
}
