//! Protocol state machine driving one invocation.
//!
//! A [`Pipeline`] consumes the incoming frame stream and yields the outgoing
//! Result frames:
//!
//! ```text
//! AwaitingStart ──Start──► Dispatching ──groups ready──► Streaming ──end──► Completed
//!       │                       │                            │
//!       └──────── failure ──────┴────────────────────────────┴──────────► Errored
//! ```
//!
//! - The first frame must be Start; its accepted content types go to the
//!   [`Registry`] together with the function name.
//! - Remaining frames must be Data. They reach the [`Demultiplexer`] through a
//!   [`CancelSafe`] guard, so a source that already completed is never
//!   cancelled when the groups are torn down.
//! - The first failure is mapped to a [`Status`] and is the last item; the
//!   stream yields nothing afterwards.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use futures::{executor::block_on, stream, StreamExt};
//! use streaming_invoker::handler::{FunctionRegistry, MapHandle};
//! use streaming_invoker::protocol::{DataFrame, InputSignal, StartFrame};
//! use streaming_invoker::Pipeline;
//!
//! let mut registry = FunctionRegistry::new();
//! registry.register("upper", MapHandle::new("text/plain", |s: String| s.to_uppercase()));
//!
//! let request = stream::iter(vec![
//!     Ok(InputSignal::from(StartFrame::new(["text/plain"]))),
//!     Ok(InputSignal::from(DataFrame::new(0, "text/plain", "hi"))),
//! ]);
//!
//! let pipeline = Pipeline::detached(Arc::new(registry), "upper", request);
//! let frames: Vec<_> = block_on(pipeline.collect());
//! assert_eq!(frames[0].as_ref().unwrap().payload(), b"HI");
//! ```

use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, Stream, StreamExt};

use crate::demux::Demultiplexer;
use crate::dispatch::{dispatch, Tagged};
use crate::error::{InvokerError, Result};
use crate::guard::{CancelSafe, Detached, Subscription};
use crate::handler::Registry;
use crate::message::Message;
use crate::mux;
use crate::protocol::{InputSignal, ResultFrame, StartFrame};
use crate::status::{Code, Status};

/// Text of the violation raised when the first frame is not Start.
pub const EXPECTED_START: &str = "Expected first frame to be of type Start";

/// Text of the failure raised when the registry has no such function.
pub const FUNCTION_NOT_FOUND: &str = "Function could not be located";

type Request = BoxStream<'static, Result<InputSignal>>;

/// Where a pipeline is in the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Waiting for the Start frame.
    AwaitingStart,
    /// Handle resolved, argument groups being set up and the handle invoked.
    Dispatching,
    /// Forwarding Result frames.
    Streaming,
    /// All outputs finished.
    Completed,
    /// A failure was reported.
    Errored,
}

impl PipelineState {
    /// Whether no more items will be produced.
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Completed | PipelineState::Errored)
    }
}

/// One invocation: incoming frames in, Result frames out.
pub struct Pipeline {
    registry: Arc<dyn Registry>,
    function_name: String,
    state: PipelineState,
    request: Option<Request>,
    upstream: Option<Box<dyn Subscription>>,
    dispatching: Option<BoxFuture<'static, Result<BoxStream<'static, Result<Tagged>>>>>,
    output: Option<BoxStream<'static, Result<ResultFrame>>>,
}

impl Pipeline {
    /// Create a pipeline for `function_name` over `request`.
    ///
    /// `upstream` cancels whatever produces `request`; it is used when the
    /// pipeline gives up on the input before it completed.
    pub fn new<S>(
        registry: Arc<dyn Registry>,
        function_name: impl Into<String>,
        request: S,
        upstream: impl Subscription + 'static,
    ) -> Self
    where
        S: Stream<Item = Result<InputSignal>> + Send + 'static,
    {
        Self {
            registry,
            function_name: function_name.into(),
            state: PipelineState::AwaitingStart,
            request: Some(request.boxed()),
            upstream: Some(Box::new(upstream)),
            dispatching: None,
            output: None,
        }
    }

    /// Create a pipeline whose input needs no explicit cancellation.
    pub fn detached<S>(registry: Arc<dyn Registry>, function_name: impl Into<String>, request: S) -> Self
    where
        S: Stream<Item = Result<InputSignal>> + Send + 'static,
    {
        Self::new(registry, function_name, request, Detached)
    }

    /// Current protocol state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Name of the function this pipeline invokes.
    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    fn transition(&mut self, next: PipelineState) {
        tracing::trace!(function = %self.function_name, from = ?self.state, to = ?next, "Pipeline state");
        self.state = next;
    }

    /// Resolve the handle and start collecting argument groups.
    fn start(&mut self, start: StartFrame) -> Result<()> {
        let handle = self
            .registry
            .resolve(&self.function_name, &start.expected_content_types)
            .ok_or_else(|| InvokerError::HandleNotFound(FUNCTION_NOT_FOUND.to_string()))?;

        let request = self
            .request
            .take()
            .ok_or_else(|| InvokerError::Internal("request stream already consumed".into()))?;
        let upstream: Box<dyn Subscription> = match self.upstream.take() {
            Some(upstream) => upstream,
            None => Box::new(Detached),
        };

        let arity = handle.input_arity();
        tracing::debug!(
            function = %self.function_name,
            arity,
            accepted = ?start.expected_content_types,
            "Dispatching invocation"
        );

        let data = request.map(|item| match item? {
            InputSignal::Data(frame) => Ok((frame.arg_index as usize, Message::from(frame))),
            other => Err(InvokerError::ProtocolViolation(format!(
                "Expected DataFrame, got {}",
                other.kind_name()
            ))),
        });
        let demux = Demultiplexer::new(CancelSafe::new(data, upstream), arity);

        self.dispatching = Some(
            async move {
                let groups = demux.collect_sorted().await?;
                dispatch(&*handle, groups)
            }
            .boxed(),
        );
        self.transition(PipelineState::Dispatching);
        Ok(())
    }

    /// Move to `Errored`, releasing everything, and produce the final item.
    fn fail(&mut self, err: InvokerError) -> Poll<Option<std::result::Result<ResultFrame, Status>>> {
        self.output = None;
        self.dispatching = None;
        self.request = None;
        self.cancel_upstream();
        self.transition(PipelineState::Errored);

        let status = Status::from(err);
        if status.code != Code::Unknown {
            tracing::debug!(function = %self.function_name, %status, "Invocation rejected");
        }
        Poll::Ready(Some(Err(status)))
    }

    fn cancel_upstream(&mut self) {
        if let Some(mut upstream) = self.upstream.take() {
            upstream.cancel();
        }
    }
}

impl Stream for Pipeline {
    type Item = std::result::Result<ResultFrame, Status>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        loop {
            match this.state {
                PipelineState::AwaitingStart => {
                    let request = match this.request.as_mut() {
                        Some(request) => request,
                        None => {
                            return this.fail(InvokerError::Internal("request stream missing".into()))
                        }
                    };
                    match ready!(request.poll_next_unpin(cx)) {
                        Some(Ok(InputSignal::Start(start))) => {
                            if let Err(err) = this.start(start) {
                                return this.fail(err);
                            }
                        }
                        Some(Ok(InputSignal::Data(_))) | None => {
                            return this.fail(InvokerError::ProtocolViolation(EXPECTED_START.to_string()));
                        }
                        Some(Err(err)) => return this.fail(err),
                    }
                }
                PipelineState::Dispatching => {
                    let dispatching = match this.dispatching.as_mut() {
                        Some(dispatching) => dispatching,
                        None => {
                            return this.fail(InvokerError::Internal("dispatch future missing".into()))
                        }
                    };
                    match ready!(dispatching.poll_unpin(cx)) {
                        Ok(tagged) => {
                            this.dispatching = None;
                            this.output = Some(mux::multiplex(tagged));
                            this.transition(PipelineState::Streaming);
                        }
                        Err(err) => return this.fail(err),
                    }
                }
                PipelineState::Streaming => {
                    let output = match this.output.as_mut() {
                        Some(output) => output,
                        None => {
                            return this.fail(InvokerError::Internal("output stream missing".into()))
                        }
                    };
                    match ready!(output.poll_next_unpin(cx)) {
                        Some(Ok(frame)) => return Poll::Ready(Some(Ok(frame))),
                        Some(Err(err)) => return this.fail(err),
                        None => {
                            this.output = None;
                            this.transition(PipelineState::Completed);
                            return Poll::Ready(None);
                        }
                    }
                }
                PipelineState::Completed | PipelineState::Errored => return Poll::Ready(None),
            }
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        // Only set while the request has not been handed to the guard yet.
        self.cancel_upstream();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{Arguments, Invocable, Outputs, Shape};
    use crate::handler::{FnHandle, FunctionRegistry};
    use crate::protocol::DataFrame;
    use futures::stream;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct Flag(Arc<AtomicBool>);

    impl Subscription for Flag {
        fn cancel(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    struct Echo;

    impl Invocable for Echo {
        fn input_arity(&self) -> usize {
            1
        }

        fn invoke(&self, args: Arguments) -> Result<Outputs> {
            match args {
                Shape::One(input) => Ok(Shape::One(input)),
                other => Err(InvokerError::Internal(format!("{:?}", other))),
            }
        }
    }

    fn registry() -> Arc<dyn Registry> {
        let mut registry = FunctionRegistry::new();
        registry.register("echo", Echo);
        Arc::new(registry)
    }

    fn start() -> Result<InputSignal> {
        Ok(StartFrame::new(["text/plain"]).into())
    }

    fn data(index: u32, payload: &'static str) -> Result<InputSignal> {
        Ok(DataFrame::new(index, "text/plain", payload).into())
    }

    #[tokio::test]
    async fn test_echo_completes() {
        let mut pipeline = Pipeline::detached(
            registry(),
            "echo",
            stream::iter(vec![start(), data(0, "a"), data(0, "b")]),
        );
        assert_eq!(pipeline.state(), PipelineState::AwaitingStart);

        let first = pipeline.next().await.unwrap().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Streaming);
        assert_eq!(first.payload(), b"a");
        assert_eq!(first.result_index, 0);
        assert_eq!(first.content_type, "text/plain");

        let second = pipeline.next().await.unwrap().unwrap();
        assert_eq!(second.payload(), b"b");

        assert!(pipeline.next().await.is_none());
        assert_eq!(pipeline.state(), PipelineState::Completed);
    }

    #[tokio::test]
    async fn test_data_first_is_violation_and_cancels_input() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut pipeline = Pipeline::new(
            registry(),
            "echo",
            stream::iter(vec![data(0, "a"), start()]),
            Flag(cancelled.clone()),
        );

        let status = pipeline.next().await.unwrap().unwrap_err();
        assert_eq!(status.code, Code::InvalidArgument);
        assert_eq!(status.message, EXPECTED_START);
        assert!(cancelled.load(Ordering::SeqCst));
        assert_eq!(pipeline.state(), PipelineState::Errored);
        assert!(pipeline.next().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_input_is_violation() {
        let mut pipeline = Pipeline::detached(registry(), "echo", stream::empty());
        let status = pipeline.next().await.unwrap().unwrap_err();
        assert_eq!(status.message, EXPECTED_START);
    }

    #[tokio::test]
    async fn test_unknown_function() {
        let mut pipeline = Pipeline::detached(registry(), "nope", stream::iter(vec![start()]));
        let status = pipeline.next().await.unwrap().unwrap_err();
        assert_eq!(status.code, Code::NotFound);
        assert_eq!(status.message, FUNCTION_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_second_start_is_violation() {
        let frames: Vec<_> = Pipeline::detached(
            registry(),
            "echo",
            stream::iter(vec![start(), data(0, "a"), start()]),
        )
        .collect()
        .await;

        assert_eq!(frames.len(), 2);
        assert!(frames[0].is_ok());
        let status = frames[1].as_ref().unwrap_err();
        assert_eq!(status.message, "Expected DataFrame, got Start");
    }

    #[tokio::test]
    async fn test_handle_error_is_unknown() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let mut functions = FunctionRegistry::new();
        functions.register(
            "broken",
            FnHandle::new(0, move |_args| {
                counted.fetch_add(1, Ordering::SeqCst);
                Err(InvokerError::Internal("boom".into()))
            }),
        );

        let frames: Vec<_> =
            Pipeline::detached(Arc::new(functions), "broken", stream::iter(vec![start()]))
                .collect()
                .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(frames.len(), 1);
        let status = frames[0].as_ref().unwrap_err();
        assert_eq!(status.code, Code::Unknown);
        assert_eq!(status.message, "boom");
    }

    #[tokio::test]
    async fn test_completed_input_is_not_cancelled() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let frames: Vec<_> = Pipeline::new(
            registry(),
            "echo",
            stream::iter(vec![start(), data(0, "a")]),
            Flag(cancelled.clone()),
        )
        .collect()
        .await;

        assert_eq!(frames.len(), 1);
        assert!(!cancelled.load(Ordering::SeqCst));
    }
}
