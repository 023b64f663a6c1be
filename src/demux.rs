//! Demultiplexer: splits one stream of `(argument index, message)` pairs into
//! one ordered stream per argument.
//!
//! # How groups come to exist
//!
//! Groups are created the first time their index is seen. So that all `N`
//! groups exist before anything downstream needs them, `N` placeholders (one
//! per index, in index order) are chained in front of the real elements, and
//! every group drops exactly one placeholder from its front. An argument that
//! never receives a frame therefore still gets a group, which simply ends
//! empty when the source ends.
//!
//! ```text
//!  P0 P1 P2 | (1,a) (0,b) (1,c) (2,d) ...
//!    │
//!    ▼ route by index
//!  group 0: P0 b ...   ─► b ...
//!  group 1: P1 a c ... ─► a c ...
//!  group 2: P2 d ...   ─► d ...
//! ```
//!
//! # Polling
//!
//! There is one source and many consumers. Whichever consumer needs an
//! element polls the source and routes what it gets into per-index queues.
//! The source is polled with a waker that wakes every consumer waiting on it.
//!
//! # Lifecycle
//!
//! A source failure is delivered to every group after the elements already
//! queued for it, so a truncated argument never looks like a clean end.
//! Dropping a group releases its queue; later elements for that index are
//! discarded on arrival.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use futures::stream::{self, BoxStream};
use futures::task::ArcWake;
use futures::{Stream, StreamExt, TryStreamExt};

use crate::error::{InvokerError, Result};
use crate::message::Message;

/// One argument's ordered stream of messages, as handed to an invocation handle.
pub type ArgumentStream = BoxStream<'static, Result<Message>>;

enum Slot {
    Placeholder,
    Value(Message),
}

#[derive(Default)]
struct WakerSet(Mutex<Vec<Waker>>);

impl WakerSet {
    fn register(&self, waker: &Waker) {
        let mut wakers = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if !wakers.iter().any(|w| w.will_wake(waker)) {
            wakers.push(waker.clone());
        }
    }

    fn wake_all(&self) {
        let wakers = std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner));
        for waker in wakers {
            waker.wake();
        }
    }
}

impl ArcWake for WakerSet {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.wake_all();
    }
}

struct Shared {
    source: Option<BoxStream<'static, Result<(usize, Slot)>>>,
    arity: usize,
    queues: BTreeMap<usize, VecDeque<Slot>>,
    /// Groups created but not yet handed out by the outer stream.
    announced: VecDeque<usize>,
    /// Groups whose consumer is gone; their elements are dropped on arrival.
    discarded: BTreeSet<usize>,
    /// The outer stream is gone; groups seen for the first time are dropped.
    closed: bool,
    /// Source failure not yet delivered to any consumer.
    failure: Option<InvokerError>,
    /// Copy handed to every later consumer once `failure` was taken.
    replica: Option<InvokerError>,
    exhausted: bool,
    wakers: Arc<WakerSet>,
}

impl Shared {
    /// Pull one element from the source and route it.
    ///
    /// `Ready` means progress was made (an element was routed, the source
    /// ended or failed); `Pending` means the caller's waker is registered.
    fn pump(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        let source = match self.source.as_mut() {
            Some(source) => source,
            None => return Poll::Ready(()),
        };

        self.wakers.register(cx.waker());
        let waker = futures::task::waker(self.wakers.clone());
        let mut source_cx = Context::from_waker(&waker);

        match source.poll_next_unpin(&mut source_cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok((index, slot)))) => {
                if index >= self.arity {
                    self.fail(InvokerError::ProtocolViolation(format!(
                        "argument index {} out of range for arity {}",
                        index, self.arity
                    )));
                } else {
                    self.route(index, slot);
                }
                Poll::Ready(())
            }
            Poll::Ready(Some(Err(err))) => {
                self.fail(err);
                Poll::Ready(())
            }
            Poll::Ready(None) => {
                tracing::trace!(groups = self.queues.len(), "Argument source exhausted");
                self.exhausted = true;
                self.source = None;
                self.wakers.wake_all();
                Poll::Ready(())
            }
        }
    }

    fn route(&mut self, index: usize, slot: Slot) {
        if self.discarded.contains(&index) {
            return;
        }
        if !self.queues.contains_key(&index) {
            if self.closed {
                self.discarded.insert(index);
                return;
            }
            tracing::trace!(index, "New argument group");
            self.announced.push_back(index);
        }
        self.queues.entry(index).or_default().push_back(slot);
        self.wakers.wake_all();
    }

    fn fail(&mut self, err: InvokerError) {
        tracing::debug!(error = %err, "Argument source failed");
        self.replica = Some(err.duplicate());
        self.failure = Some(err);
        self.source = None;
        self.wakers.wake_all();
    }

    /// The source failure for one consumer: the original for the first, a copy after.
    fn failure_for_consumer(&mut self) -> Option<InvokerError> {
        self.failure
            .take()
            .or_else(|| self.replica.as_ref().map(InvokerError::duplicate))
    }

    /// Stop buffering for a group nobody will read.
    fn discard(&mut self, index: usize) {
        self.queues.remove(&index);
        self.discarded.insert(index);
        tracing::trace!(index, "Argument group dropped");
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Stream of argument groups, completing once `arity` distinct groups were seen.
pub struct Demultiplexer {
    shared: Arc<Mutex<Shared>>,
    emitted: usize,
    failed: bool,
}

impl Demultiplexer {
    /// Demultiplex `source` into `arity` argument groups.
    pub fn new<S>(source: S, arity: usize) -> Self
    where
        S: Stream<Item = Result<(usize, Message)>> + Send + 'static,
    {
        let placeholders = stream::iter((0..arity).map(|index| Ok((index, Slot::Placeholder))));
        let values = source.map_ok(|(index, message)| (index, Slot::Value(message)));

        let shared = Shared {
            source: Some(placeholders.chain(values).boxed()),
            arity,
            queues: BTreeMap::new(),
            announced: VecDeque::new(),
            discarded: BTreeSet::new(),
            closed: false,
            failure: None,
            replica: None,
            exhausted: false,
            wakers: Arc::new(WakerSet::default()),
        };

        Self {
            shared: Arc::new(Mutex::new(shared)),
            emitted: 0,
            failed: false,
        }
    }

    /// Number of groups this demultiplexer produces.
    pub fn arity(&self) -> usize {
        lock(&self.shared).arity
    }

    /// Collect all groups, ordered by argument index.
    pub async fn collect_sorted(self) -> Result<Vec<ArgumentGroup>> {
        let mut groups: Vec<ArgumentGroup> = self.try_collect().await?;
        groups.sort_by_key(ArgumentGroup::index);
        Ok(groups)
    }
}

impl Stream for Demultiplexer {
    type Item = Result<ArgumentGroup>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let mut shared = lock(&this.shared);

        loop {
            if this.emitted == shared.arity || this.failed {
                return Poll::Ready(None);
            }
            if let Some(index) = shared.announced.pop_front() {
                this.emitted += 1;
                return Poll::Ready(Some(Ok(ArgumentGroup {
                    index,
                    shared: this.shared.clone(),
                    stripped: false,
                    failed: false,
                })));
            }
            if let Some(err) = shared.failure_for_consumer() {
                this.failed = true;
                return Poll::Ready(Some(Err(err)));
            }
            if shared.exhausted {
                return Poll::Ready(None);
            }
            if shared.pump(cx).is_pending() {
                return Poll::Pending;
            }
        }
    }
}

impl Drop for Demultiplexer {
    fn drop(&mut self) {
        let mut shared = lock(&self.shared);
        shared.closed = true;
        while let Some(index) = shared.announced.pop_front() {
            shared.discard(index);
        }
    }
}

/// The ordered stream of one argument.
///
/// Dropping a group discards whatever is still queued for it, and later
/// elements for its index are dropped as they arrive.
pub struct ArgumentGroup {
    index: usize,
    shared: Arc<Mutex<Shared>>,
    stripped: bool,
    failed: bool,
}

impl ArgumentGroup {
    /// Argument index of this group.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Box the group for handing to an invocation handle.
    pub fn into_stream(self) -> ArgumentStream {
        self.boxed()
    }
}

impl Stream for ArgumentGroup {
    type Item = Result<Message>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.failed {
            return Poll::Ready(None);
        }
        let mut shared = lock(&this.shared);

        loop {
            // Elements routed before a failure are still delivered.
            let next = shared
                .queues
                .get_mut(&this.index)
                .and_then(VecDeque::pop_front);
            match next {
                Some(Slot::Placeholder) => {
                    debug_assert!(!this.stripped, "one placeholder per group");
                    this.stripped = true;
                    continue;
                }
                Some(Slot::Value(message)) => return Poll::Ready(Some(Ok(message))),
                None => {}
            }

            if let Some(err) = shared.failure_for_consumer() {
                this.failed = true;
                return Poll::Ready(Some(Err(err)));
            }
            if shared.exhausted {
                return Poll::Ready(None);
            }
            if shared.pump(cx).is_pending() {
                return Poll::Pending;
            }
        }
    }
}

impl Drop for ArgumentGroup {
    fn drop(&mut self) {
        lock(&self.shared).discard(self.index);
    }
}
