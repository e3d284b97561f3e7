// Crate implementing the Engineering Principles of eager prefetching

use std::pin::Pin;

use futures::{FutureExt, Stream, StreamExt};
use tokio::task::JoinHandle;

use crate::boostable::DequeueOutcome;

type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

/// Wraps a lazy [`Stream`] so that it always has its next element already in
/// flight.
///
/// A plain `Stream` only starts computing its next item once polled; that
/// makes it unusable as the upstream of a [`crate::boostable::Boostable`],
/// which needs to ask "is a value ready right now?" without ever driving the
/// stream itself. `EagerAdapter` answers that by immediately spawning a task
/// that awaits the stream's next item, and re-spawning its successor as soon
/// as a value is taken.
///
/// This permanently ties up one unit of ambient concurrency — the in-flight
/// prefetch task — that is not accounted for by any [`crate::capacity::CapacityToken`].
/// Callers composing an `EagerAdapter` into a [`crate::executor::BoostExecutor`]
/// should budget `concurrency` with that extra unit in mind. Call
/// [`EagerAdapter::close`] to cancel the outstanding prefetch once you are
/// done with the adapter early.
pub struct EagerAdapter<T: Send + 'static> {
    pending: JoinHandle<(Option<T>, BoxStream<T>)>,
}

impl<T: Send + 'static> EagerAdapter<T> {
    pub fn new(src: impl Stream<Item = T> + Send + 'static) -> Self {
        let boxed: BoxStream<T> = Box::pin(src.fuse());
        Self {
            pending: tokio::spawn(Self::prefetch(boxed)),
        }
    }

    async fn prefetch(mut src: BoxStream<T>) -> (Option<T>, BoxStream<T>) {
        let value = src.next().await;
        (value, src)
    }

    /// Non-blocking: returns [`DequeueOutcome::NotReady`] if the current
    /// prefetch has not resolved yet, otherwise swaps in the next prefetch
    /// and returns its value (or [`DequeueOutcome::Exhausted`] at end of
    /// source).
    pub fn try_dequeue(&mut self) -> DequeueOutcome<T> {
        if !self.pending.is_finished() {
            return DequeueOutcome::NotReady;
        }
        // `is_finished` guarantees the handle resolves without actually
        // suspending, so polling it once here never blocks the caller.
        let (value, rest) = (&mut self.pending)
            .now_or_never()
            .expect("join handle reported finished but did not resolve")
            .unwrap_or_else(|err| panic!("eager prefetch task panicked: {err}"));
        self.pending = tokio::spawn(Self::prefetch(rest));
        match value {
            Some(v) => DequeueOutcome::Value(v),
            None => DequeueOutcome::Exhausted,
        }
    }

    /// Awaits the current prefetch, then swaps it, returning `None` at end
    /// of source.
    pub async fn next(&mut self) -> Option<T> {
        loop {
            // Re-check readiness after the await: a racing `try_dequeue`
            // (e.g. from a `provide_boost` call interleaved via the
            // scheduling loop) may already have consumed this prefetch and
            // replaced `self.pending` underneath us.
            if self.pending.is_finished() {
                return match self.try_dequeue() {
                    DequeueOutcome::Value(v) => Some(v),
                    DequeueOutcome::Exhausted => None,
                    DequeueOutcome::NotReady => unreachable!("just checked is_finished"),
                };
            }
            let _ = (&mut self.pending).await;
        }
    }

    /// Cancels the outstanding prefetch task, releasing the one unit of
    /// ambient concurrency it was holding.
    pub fn close(self) {
        self.pending.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn yields_every_element_in_order() {
        let mut adapter = EagerAdapter::new(stream::iter(vec![1, 2, 3]));
        assert_eq!(adapter.next().await, Some(1));
        assert_eq!(adapter.next().await, Some(2));
        assert_eq!(adapter.next().await, Some(3));
        assert_eq!(adapter.next().await, None);
        assert_eq!(adapter.next().await, None);
    }

    #[tokio::test]
    async fn try_dequeue_eventually_observes_a_ready_prefetch() {
        let mut adapter = EagerAdapter::new(stream::iter(vec!["a", "b"]));

        let mut first = None;
        for _ in 0..1000 {
            match adapter.try_dequeue() {
                DequeueOutcome::NotReady => tokio::task::yield_now().await,
                outcome => {
                    first = Some(outcome);
                    break;
                }
            }
        }
        assert!(matches!(first, Some(DequeueOutcome::Value("a"))));
    }

    #[tokio::test]
    async fn close_aborts_the_outstanding_prefetch() {
        let adapter = EagerAdapter::new(stream::pending::<i32>());
        adapter.close();
    }
}
