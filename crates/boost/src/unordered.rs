// Crate implementing the Engineering Principles of unordered pipeline stages

use std::future::Future;
use std::sync::{Arc, Mutex, Weak};

use ewe_async_utils::async_trait;
use tokio::task::JoinSet;

use crate::boostable::{BoostOutcome, Boostable, DequeueOutcome, ScheduledSlot};
use crate::capacity::CapacityToken;
use crate::error::BoostError;
use crate::upstream::{Upstream, UpstreamTake};

/// A mapping stage that yields results as soon as each one is ready,
/// in whichever order tasks happen to complete.
///
/// Backed by `tokio::task::JoinSet`, which already implements exactly the
/// "set of tasks plus a completion waiter" shape this stage needs:
/// `try_join_next` is the non-blocking scan, `join_next` is the waiter.
pub struct UnorderedBoostable<T, R, F, Fut>
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
    tasks: JoinSet<R>,
}

impl<T, R, F, Fut> Clone for UnorderedBoostable<T, R, F, Fut>
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

impl<T, R, F, Fut> UnorderedBoostable<T, R, F, Fut>
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
                tasks: JoinSet::new(),
            })),
        }
    }

    pub(crate) fn scheduled_slot(&self) -> impl ScheduledSlot {
        UnorderedSlot { inner: Arc::downgrade(&self.inner) }
    }

    fn spawn_one(inner: &mut Inner<T, R, F, Fut>, arg: T) {
        let fut = inner.token.guarded(inner.func.clone(), arg);
        inner.tasks.spawn(fut);
    }
}

#[async_trait]
impl<T, R, F, Fut> Boostable<R> for UnorderedBoostable<T, R, F, Fut>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    fn provide_boost(&mut self) -> BoostOutcome {
        let mut inner = self.inner.lock().expect("unordered boostable mutex poisoned");
        match inner.upstream.try_take() {
            UpstreamTake::Ready(arg) => {
                Self::spawn_one(&mut inner, arg);
                BoostOutcome::Started
            }
            UpstreamTake::NotReady => inner.upstream.forward_boost().unwrap_or(BoostOutcome::NotReady),
            UpstreamTake::Exhausted => BoostOutcome::Exhausted,
        }
    }

    fn try_dequeue(&mut self) -> DequeueOutcome<R> {
        let mut inner = self.inner.lock().expect("unordered boostable mutex poisoned");
        match inner.tasks.try_join_next() {
            Some(Ok(value)) => DequeueOutcome::Value(value),
            Some(Err(err)) => panic!("unordered mapping task failed: {}", BoostError::from_join_error(err)),
            None => DequeueOutcome::NotReady,
        }
    }

    async fn blocking_dequeue(&mut self) -> Option<R> {
        loop {
            let joined = {
                let mut inner = self.inner.lock().expect("unordered boostable mutex poisoned");
                if inner.tasks.is_empty() {
                    match inner.upstream.try_take() {
                        UpstreamTake::Ready(arg) => {
                            Self::spawn_one(&mut inner, arg);
                            None
                        }
                        UpstreamTake::NotReady => {
                            drop(inner);
                            tokio::task::yield_now().await;
                            None
                        }
                        UpstreamTake::Exhausted => return None,
                    }
                } else {
                    Some(inner.tasks.join_next())
                }
            };
            if let Some(pending) = joined {
                match pending.await {
                    Some(Ok(value)) => return Some(value),
                    Some(Err(err)) => panic!("unordered mapping task failed: {}", BoostError::from_join_error(err)),
                    None => continue,
                }
            }
        }
    }

    async fn wait(&mut self) {
        loop {
            let pending = {
                let mut inner = self.inner.lock().expect("unordered boostable mutex poisoned");
                if inner.tasks.is_empty() {
                    break;
                }
                inner.tasks.join_next()
            };
            if let Some(Err(err)) = pending.await {
                ewe_logs::error!("unordered boostable drain: task did not complete cleanly: {}", BoostError::from_join_error(err));
            }
        }
    }
}

struct UnorderedSlot<T, R, F, Fut>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    inner: Weak<Mutex<Inner<T, R, F, Fut>>>,
}

#[async_trait]
impl<T, R, F, Fut> ScheduledSlot for UnorderedSlot<T, R, F, Fut>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    fn try_boost(&self) -> Option<BoostOutcome> {
        let strong = self.inner.upgrade()?;
        let mut inner = strong.lock().expect("unordered boostable mutex poisoned");
        Some(match inner.upstream.try_take() {
            UpstreamTake::Ready(arg) => {
                UnorderedBoostable::<T, R, F, Fut>::spawn_one(&mut inner, arg);
                BoostOutcome::Started
            }
            UpstreamTake::NotReady => inner.upstream.forward_boost().unwrap_or(BoostOutcome::NotReady),
            UpstreamTake::Exhausted => BoostOutcome::Exhausted,
        })
    }

    async fn wait_drain(&self) {
        loop {
            let Some(strong) = self.inner.upgrade() else { return };
            let pending = {
                let mut inner = strong.lock().expect("unordered boostable mutex poisoned");
                if inner.tasks.is_empty() {
                    return;
                }
                inner.tasks.join_next()
            };
            drop(strong);
            if pending.await.is_none() {
                return;
            }
        }
    }
}

impl<T, R, F, Fut> From<UnorderedBoostable<T, R, F, Fut>> for Upstream<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    fn from(stage: UnorderedBoostable<T, R, F, Fut>) -> Self {
        Upstream::Boost(Box::new(stage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> CapacityToken {
        CapacityToken::new(4)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn results_come_back_in_completion_order_not_input_order() {
        let delays = [30u64, 5, 20];
        let mut stage = UnorderedBoostable::new(
            |(i, d): (usize, u64)| async move {
                tokio::time::sleep(std::time::Duration::from_millis(d)).await;
                i
            },
            delays.into_iter().enumerate(),
            token(),
        );

        for _ in 0..delays.len() {
            assert_eq!(stage.provide_boost(), BoostOutcome::Started);
        }
        assert_eq!(stage.provide_boost(), BoostOutcome::Exhausted);

        let mut order = Vec::new();
        while let Some(v) = stage.blocking_dequeue().await {
            order.push(v);
        }
        assert_eq!(order, vec![1, 2, 0]);
    }
}
