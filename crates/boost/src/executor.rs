// Crate implementing the Engineering Principles of the boosted scheduling loop

use std::collections::VecDeque;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{FutureExt, Stream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::boostable::{BoostOutcome, Boostable, ScheduledSlot};
use crate::capacity::CapacityToken;
use crate::error::{BoostError, BoostResult};
use crate::ordered::OrderedBoostable;
use crate::unordered::UnorderedBoostable;
use crate::upstream::Upstream;

const MIN_TIMEOUT: Duration = Duration::from_millis(10);
const MAX_TIMEOUT: Duration = Duration::from_millis(100);

/// Scoped owner of one executor's capacity token and its registered
/// boostables.
///
/// Construct with [`BoostExecutor::new`], register stages with
/// [`BoostExecutor::map_ordered`] / [`BoostExecutor::map_unordered`], then
/// drive everything through [`BoostExecutor::run`] — the scheduling loop
/// only exists for the duration of that call.
pub struct BoostExecutor {
    token: CapacityToken,
    active: Arc<Mutex<VecDeque<Box<dyn ScheduledSlot + Send>>>>,
    notify: Arc<Notify>,
    shutdown: Arc<AtomicBool>,
    min_timeout: Duration,
    max_timeout: Duration,
}

impl BoostExecutor {
    /// `concurrency` is the total number of tasks allowed in flight across
    /// every stage registered on this executor, including the one
    /// "foreground" slot the consumer iterating the outermost stage
    /// occupies implicitly — hence the token starts with `concurrency - 1`
    /// spare units.
    pub fn new(concurrency: NonZeroUsize) -> Self {
        Self {
            token: CapacityToken::new(concurrency.get() - 1),
            active: Arc::new(Mutex::new(VecDeque::new())),
            notify: Arc::new(Notify::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
            min_timeout: MIN_TIMEOUT,
            max_timeout: MAX_TIMEOUT,
        }
    }

    /// Fallible counterpart of [`BoostExecutor::new`] for callers holding a
    /// plain `usize` (e.g. read from configuration) rather than a
    /// `NonZeroUsize` proven at compile time. Reports
    /// [`BoostError::InvalidConcurrency`] synchronously instead of panicking.
    pub fn try_new(concurrency: usize) -> BoostResult<Self> {
        NonZeroUsize::new(concurrency)
            .map(Self::new)
            .ok_or(BoostError::InvalidConcurrency)
    }

    /// Overrides the idle backoff bounds, mainly useful for tests that
    /// would otherwise wait out the default 10-100ms range.
    pub fn with_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.min_timeout = min;
        self.max_timeout = max;
        self
    }

    /// Registers a stage that applies `f` to every element of `upstream`,
    /// yielding results in input order.
    pub fn map_ordered<T, R, F, Fut>(
        &self,
        f: F,
        upstream: impl Into<Upstream<T>>,
    ) -> OrderedBoostable<T, R, F, Fut>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let stage = OrderedBoostable::new(f, upstream, self.token.clone());
        self.register(stage.scheduled_slot());
        stage
    }

    /// Registers a stage that applies `f` to every element of `upstream`,
    /// yielding results as soon as each completes.
    pub fn map_unordered<T, R, F, Fut>(
        &self,
        f: F,
        upstream: impl Into<Upstream<T>>,
    ) -> UnorderedBoostable<T, R, F, Fut>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let stage = UnorderedBoostable::new(f, upstream, self.token.clone());
        self.register(stage.scheduled_slot());
        stage
    }

    fn register(&self, slot: impl ScheduledSlot + Send + 'static) {
        self.active.lock().expect("active deque mutex poisoned").push_front(Box::new(slot));
        self.notify.notify_one();
    }

    /// Wraps a registered stage's `blocking_dequeue` loop as a [`Stream`],
    /// donating this executor's one foreground unit of capacity for the
    /// duration of the iteration and withdrawing it again once the stage is
    /// exhausted, per the reentrancy rule in [`CapacityToken`].
    pub fn consume<R>(&self, mut stage: impl Boostable<R> + Send + 'static) -> impl Stream<Item = R>
    where
        R: Send + 'static,
    {
        let token = self.token.clone();
        async_stream::stream! {
            token.donate_foreground();
            while let Some(value) = stage.blocking_dequeue().await {
                yield value;
            }
            token.revoke_foreground().await;
        }
    }

    /// Runs `body` with the scheduling loop active in the background.
    ///
    /// On `Ok`, signals shutdown and awaits the loop's own exhausted-drain
    /// sequence before returning. On `Err` or a panic inside `body`, aborts
    /// the loop immediately without awaiting it — cancellation is
    /// best-effort in that case, matching the rest of this crate's
    /// panic-as-cancellation posture.
    pub async fn run<F, Fut, T, E>(&self, body: F) -> Result<T, E>
    where
        F: FnOnce(&BoostExecutor) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let loop_handle = self.spawn_loop();
        let outcome = std::panic::AssertUnwindSafe(body(self)).catch_unwind().await;
        match outcome {
            Ok(result) => {
                if result.is_ok() {
                    self.shutdown.store(true, Ordering::SeqCst);
                    self.notify.notify_one();
                    let _ = loop_handle.await;
                } else {
                    loop_handle.abort();
                }
                result
            }
            Err(panic) => {
                loop_handle.abort();
                std::panic::resume_unwind(panic);
            }
        }
    }

    fn spawn_loop(&self) -> JoinHandle<()> {
        tokio::spawn(scheduling_loop(
            self.token.clone(),
            self.active.clone(),
            self.notify.clone(),
            self.shutdown.clone(),
            self.min_timeout,
            self.max_timeout,
        ))
    }
}

async fn scheduling_loop(
    token: CapacityToken,
    active: Arc<Mutex<VecDeque<Box<dyn ScheduledSlot + Send>>>>,
    notify: Arc<Notify>,
    shutdown: Arc<AtomicBool>,
    min_timeout: Duration,
    max_timeout: Duration,
) {
    let mut timeout = min_timeout;
    let mut not_ready: VecDeque<Box<dyn ScheduledSlot + Send>> = VecDeque::new();
    let mut exhausted: Vec<Box<dyn ScheduledSlot + Send>> = Vec::new();

    'outer: loop {
        // 1. Gate on capacity: wait until a permit is free without consuming it.
        {
            let _permit = token.acquire().await;
        }

        // 2. Round-robin distribution across the active deque.
        let mut broke_for_capacity = false;
        loop {
            let slot = active.lock().expect("active deque mutex poisoned").pop_front();
            let Some(slot) = slot else { break };
            match slot.try_boost() {
                Some(BoostOutcome::NotReady) => not_ready.push_back(slot),
                Some(BoostOutcome::Exhausted) | None => exhausted.push(slot),
                Some(BoostOutcome::Started) => {
                    ewe_logs::debug!("boost executor: stage accepted a boost");
                    tokio::task::yield_now().await;
                    active.lock().expect("active deque mutex poisoned").push_back(slot);
                    if token.is_empty() {
                        broke_for_capacity = true;
                        break;
                    }
                }
            }
        }

        // 3. A full sweep (no early break) absorbs the not_ready list back
        // into the active deque for the next round.
        if !broke_for_capacity {
            let mut guard = active.lock().expect("active deque mutex poisoned");
            guard.extend(not_ready.drain(..));
        }

        // 4. Capacity ran out mid-sweep: go back and wait for a permit.
        if token.is_empty() {
            continue 'outer;
        }

        let active_is_empty = active.lock().expect("active deque mutex poisoned").is_empty();

        // 5. Nothing left to do and the scope is winding down.
        if shutdown.load(Ordering::SeqCst) && active_is_empty && not_ready.is_empty() {
            break 'outer;
        }

        // 6. Idle until woken or the backoff elapses.
        if active_is_empty && not_ready.is_empty() {
            notify.notified().await;
            timeout = min_timeout;
        } else {
            tokio::select! {
                () = notify.notified() => {
                    timeout = min_timeout;
                }
                () = tokio::time::sleep(timeout) => {
                    if timeout >= max_timeout {
                        ewe_logs::warn!("boost executor: scheduling loop idle at max backoff, every registered stage may be starved");
                    }
                    timeout = (timeout * 2).min(max_timeout);
                }
            }
        }
    }

    for slot in exhausted.drain(..) {
        slot.wait_drain().await;
    }
    let remaining: Vec<_> = active.lock().expect("active deque mutex poisoned").drain(..).collect();
    for slot in remaining {
        slot.wait_drain().await;
    }
    tokio::task::yield_now().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::atomic::AtomicUsize;

    fn test_executor(concurrency: usize) -> BoostExecutor {
        BoostExecutor::new(NonZeroUsize::new(concurrency).unwrap())
            .with_backoff(Duration::from_millis(1), Duration::from_millis(5))
    }

    #[test]
    fn try_new_rejects_zero_concurrency() {
        assert!(matches!(BoostExecutor::try_new(0), Err(BoostError::InvalidConcurrency)));
        assert!(BoostExecutor::try_new(4).is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn maps_every_element_in_order_with_bounded_concurrency() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let ex = test_executor(2);
        let result: Result<Vec<i32>, std::convert::Infallible> = ex
            .run(|ex| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                async move {
                    let in_flight2 = in_flight.clone();
                    let stage = ex.map_ordered(
                        move |x: i32| {
                            let in_flight = in_flight2.clone();
                            let peak = peak.clone();
                            async move {
                                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                                peak.fetch_max(now, Ordering::SeqCst);
                                tokio::time::sleep(Duration::from_millis(5)).await;
                                in_flight.fetch_sub(1, Ordering::SeqCst);
                                x * x
                            }
                        },
                        vec![1, 2, 3, 4].into_iter(),
                    );
                    let values: Vec<i32> = ex.consume(stage).collect().await;
                    Ok(values)
                }
            })
            .await;

        assert_eq!(result.unwrap(), vec![1, 4, 9, 16]);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn two_stage_pipeline_composes_through_upstream_boost() {
        let ex = test_executor(3);
        let result: Result<Vec<i32>, std::convert::Infallible> = ex
            .run(|ex| async move {
                let doubled = ex.map_ordered(|x: i32| async move { x * 2 }, vec![1, 2, 3].into_iter());
                let incremented = ex.map_ordered(|x: i32| async move { x + 1 }, doubled);
                let values: Vec<i32> = ex.consume(incremented).collect().await;
                Ok(values)
            })
            .await;

        assert_eq!(result.unwrap(), vec![3, 5, 7]);
    }
}
