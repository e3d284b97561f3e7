// Crate implementing the Engineering Principles of ordered pipeline stages

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};

use ewe_async_utils::async_trait;
use tokio::task::JoinHandle;

use crate::boostable::{BoostOutcome, Boostable, DequeueOutcome, ScheduledSlot};
use crate::capacity::CapacityToken;
use crate::error::BoostError;
use crate::upstream::{Upstream, UpstreamTake};

/// A mapping stage that yields results in the same order its inputs arrived
/// in, regardless of which task happens to finish first.
///
/// Backed by a `VecDeque<JoinHandle<R>>`: task at index 0 is always the
/// oldest start, so it is always the next value handed to a consumer, even
/// if a later task in the deque has already completed.
pub struct OrderedBoostable<T, R, F, Fut>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    inner: Arc<Mutex<Inner<T, R, F, Fut>>>,
}

struct Inner<T, R, F, Fut>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    func: Arc<F>,
    upstream: Upstream<T>,
    token: CapacityToken,
    buffer: VecDeque<JoinHandle<R>>,
}

impl<T, R, F, Fut> Clone for OrderedBoostable<T, R, F, Fut>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T, R, F, Fut> OrderedBoostable<T, R, F, Fut>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    pub(crate) fn new(func: F, upstream: impl Into<Upstream<T>>, token: CapacityToken) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                func: Arc::new(func),
                upstream: upstream.into(),
                token,
                buffer: VecDeque::new(),
            })),
        }
    }

    /// A weak, boost-only view of this stage for the executor's active set.
    pub(crate) fn scheduled_slot(&self) -> impl ScheduledSlot {
        OrderedSlot { inner: Arc::downgrade(&self.inner) }
    }

    fn spawn_one(inner: &mut Inner<T, R, F, Fut>, arg: T) {
        let fut = inner.token.guarded(inner.func.clone(), arg);
        inner.buffer.push_back(tokio::spawn(fut));
    }

    async fn resolve(handle: JoinHandle<R>) -> Result<R, BoostError> {
        handle.await.map_err(BoostError::from_join_error)
    }
}

#[async_trait]
impl<T, R, F, Fut> Boostable<R> for OrderedBoostable<T, R, F, Fut>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    fn provide_boost(&mut self) -> BoostOutcome {
        let mut inner = self.inner.lock().expect("ordered boostable mutex poisoned");
        match inner.upstream.try_take() {
            UpstreamTake::Ready(arg) => {
                Self::spawn_one(&mut inner, arg);
                BoostOutcome::Started
            }
            UpstreamTake::NotReady => match inner.upstream.forward_boost() {
                Some(outcome) => outcome,
                None => BoostOutcome::NotReady,
            },
            UpstreamTake::Exhausted => BoostOutcome::Exhausted,
        }
    }

    fn try_dequeue(&mut self) -> DequeueOutcome<R> {
        let mut inner = self.inner.lock().expect("ordered boostable mutex poisoned");
        let Some(front) = inner.buffer.front() else {
            return DequeueOutcome::NotReady;
        };
        if !front.is_finished() {
            return DequeueOutcome::NotReady;
        }
        let handle = inner.buffer.pop_front().expect("front checked above");
        drop(inner);
        match handle
            .now_or_never_join()
            .expect("is_finished guaranteed this resolves without suspending")
        {
            Ok(value) => DequeueOutcome::Value(value),
            Err(err) => panic!("ordered mapping task failed: {}", BoostError::from_join_error(err)),
        }
    }

    async fn blocking_dequeue(&mut self) -> Option<R> {
        loop {
            let handle = {
                let mut inner = self.inner.lock().expect("ordered boostable mutex poisoned");
                match inner.buffer.pop_front() {
                    Some(handle) => handle,
                    None => match inner.upstream.try_take() {
                        UpstreamTake::Ready(arg) => {
                            Self::spawn_one(&mut inner, arg);
                            continue;
                        }
                        UpstreamTake::NotReady => {
                            drop(inner);
                            tokio::task::yield_now().await;
                            continue;
                        }
                        UpstreamTake::Exhausted => return None,
                    },
                }
            };
            // The slot we just took ownership of is no longer visible to any
            // other call, so nothing can race this await.
            match Self::resolve(handle).await {
                Ok(value) => return Some(value),
                Err(err) => panic!("ordered mapping task failed: {err}"),
            }
        }
    }

    async fn wait(&mut self) {
        let handles: Vec<_> = {
            let mut inner = self.inner.lock().expect("ordered boostable mutex poisoned");
            inner.buffer.drain(..).collect()
        };
        for handle in handles {
            if let Err(err) = handle.await {
                ewe_logs::error!("ordered boostable drain: task did not complete cleanly: {}", BoostError::from_join_error(err));
            }
        }
    }
}

struct OrderedSlot<T, R, F, Fut>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    inner: Weak<Mutex<Inner<T, R, F, Fut>>>,
}

#[async_trait]
impl<T, R, F, Fut> ScheduledSlot for OrderedSlot<T, R, F, Fut>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    fn try_boost(&self) -> Option<BoostOutcome> {
        let strong = self.inner.upgrade()?;
        let mut inner = strong.lock().expect("ordered boostable mutex poisoned");
        Some(match inner.upstream.try_take() {
            UpstreamTake::Ready(arg) => {
                OrderedBoostable::<T, R, F, Fut>::spawn_one(&mut inner, arg);
                BoostOutcome::Started
            }
            UpstreamTake::NotReady => inner.upstream.forward_boost().unwrap_or(BoostOutcome::NotReady),
            UpstreamTake::Exhausted => BoostOutcome::Exhausted,
        })
    }

    async fn wait_drain(&self) {
        let Some(strong) = self.inner.upgrade() else { return };
        let handles: Vec<_> = {
            let mut inner = strong.lock().expect("ordered boostable mutex poisoned");
            inner.buffer.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
    }
}

/// Small extension trait letting [`OrderedBoostable::try_dequeue`] pull an
/// already-finished `JoinHandle`'s output without an extra `now_or_never`
/// import at the call site.
trait NowOrNeverJoin<R> {
    fn now_or_never_join(self) -> Option<Result<R, tokio::task::JoinError>>;
}

impl<R> NowOrNeverJoin<R> for JoinHandle<R> {
    fn now_or_never_join(mut self) -> Option<Result<R, tokio::task::JoinError>> {
        use futures::FutureExt;
        (&mut self).now_or_never()
    }
}

impl<T, R, F, Fut> From<OrderedBoostable<T, R, F, Fut>> for Upstream<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    fn from(stage: OrderedBoostable<T, R, F, Fut>) -> Self {
        Upstream::Boost(Box::new(stage))
    }
}
