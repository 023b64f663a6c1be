//! Cancel-safe subscription guard.
//!
//! Wraps the incoming stream together with the handle that cancels its
//! upstream producer. Once the wrapped stream has reported completion, any
//! later cancellation (an explicit [`CancelSafe::cancel`] or the guard being
//! dropped while the demultiplexer tears down its groups) is swallowed so a
//! source that already finished cleanly is never torn down.
//!
//! ```
//! use futures::{executor::block_on, stream, StreamExt};
//! use streaming_invoker::guard::{CancelSafe, Detached};
//!
//! block_on(async {
//!     let mut guarded = CancelSafe::new(stream::iter([1, 2]), Detached);
//!     assert_eq!(guarded.next().await, Some(1));
//!     assert_eq!(guarded.next().await, Some(2));
//!     assert_eq!(guarded.next().await, None);
//!     assert!(guarded.is_completed());
//! });
//! ```

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;

/// Upstream side of a stream that can be told to stop producing.
pub trait Subscription: Send {
    /// Ask the producer to stop. Called at most once by [`CancelSafe`].
    fn cancel(&mut self);
}

/// Subscription for sources that need no explicit cancel.
#[derive(Debug, Clone, Copy, Default)]
pub struct Detached;

impl Subscription for Detached {
    fn cancel(&mut self) {}
}

impl Subscription for tokio::task::AbortHandle {
    fn cancel(&mut self) {
        self.abort();
    }
}

impl Subscription for Box<dyn Subscription> {
    fn cancel(&mut self) {
        (**self).cancel();
    }
}

/// Pass-through stream that ignores cancellation after completion.
pub struct CancelSafe<S> {
    inner: S,
    upstream: Option<Box<dyn Subscription>>,
    completed: bool,
}

impl<S> CancelSafe<S> {
    /// Guard `inner`, whose producer is cancelled through `upstream`.
    pub fn new(inner: S, upstream: impl Subscription + 'static) -> Self {
        Self {
            inner,
            upstream: Some(Box::new(upstream)),
            completed: false,
        }
    }

    /// Whether the wrapped stream has signalled completion.
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Forward a cancel upstream unless the stream already completed.
    pub fn cancel(&mut self) {
        if self.completed {
            if self.upstream.take().is_some() {
                tracing::trace!("Ignoring cancel after completion");
            }
            return;
        }
        if let Some(mut upstream) = self.upstream.take() {
            tracing::debug!("Cancelling upstream before completion");
            upstream.cancel();
        }
    }
}

impl<S: Stream + Unpin> Stream for CancelSafe<S> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.completed {
            return Poll::Ready(None);
        }
        let polled = Pin::new(&mut self.inner).poll_next(cx);
        if let Poll::Ready(None) = polled {
            self.completed = true;
        }
        polled
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.completed {
            (0, Some(0))
        } else {
            self.inner.size_hint()
        }
    }
}

impl<S> Drop for CancelSafe<S> {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{stream, StreamExt};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Counting(Arc<AtomicUsize>);

    impl Subscription for Counting {
        fn cancel(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_items_pass_through() {
        let mut guarded = CancelSafe::new(stream::iter(vec![Ok(1), Err("e"), Ok(3)]), Detached);
        assert_eq!(guarded.next().await, Some(Ok(1)));
        assert_eq!(guarded.next().await, Some(Err("e")));
        assert_eq!(guarded.next().await, Some(Ok(3)));
        assert_eq!(guarded.next().await, None);
        assert_eq!(guarded.next().await, None);
    }

    #[tokio::test]
    async fn test_cancel_after_completion_is_suppressed() {
        let cancels = Counting::default();
        let mut guarded = CancelSafe::new(stream::iter([1]), cancels.clone());

        while guarded.next().await.is_some() {}
        assert!(guarded.is_completed());

        guarded.cancel();
        drop(guarded);
        assert_eq!(cancels.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_before_completion_reaches_source() {
        let cancels = Counting::default();
        let mut guarded = CancelSafe::new(stream::iter([1, 2]), cancels.clone());

        assert_eq!(guarded.next().await, Some(1));
        guarded.cancel();
        assert_eq!(cancels.0.load(Ordering::SeqCst), 1);

        // Forwarded at most once.
        guarded.cancel();
        drop(guarded);
        assert_eq!(cancels.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_before_completion_cancels() {
        let cancels = Counting::default();
        let guarded = CancelSafe::new(stream::pending::<()>(), cancels.clone());
        drop(guarded);
        assert_eq!(cancels.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_abort_handle_subscription() {
        let task = tokio::spawn(futures::future::pending::<()>());
        let mut guarded = CancelSafe::new(stream::pending::<()>(), task.abort_handle());

        guarded.cancel();
        let err = task.await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
