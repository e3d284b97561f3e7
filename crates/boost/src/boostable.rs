// Crate implementing the Engineering Principles of boostable pipeline stages

use ewe_async_utils::async_trait;

/// Outcome of asking a stage to accept one more unit of concurrency.
///
/// Returned by [`Boostable::provide_boost`], and nothing else — the caller
/// (the scheduling loop in [`crate::executor`]) only ever needs to know
/// which of the three happened, never the spawned task itself; Rust's type
/// system already guarantees a [`BoostOutcome::Started`] came from a real
/// task, so unlike a dynamically typed original there is nothing further to
/// assert about it.
#[derive(Debug, PartialEq, Eq)]
pub enum BoostOutcome {
    /// A new task was created and entered the stage's buffer.
    Started,
    /// This stage cannot accept a boost right now; its upstream has nothing
    /// ready but has not finished either.
    NotReady,
    /// This stage's upstream has terminated; stop offering it boosts.
    Exhausted,
}

/// Outcome of a non-blocking dequeue attempt.
#[derive(Debug)]
pub enum DequeueOutcome<R> {
    /// Nothing is immediately available.
    NotReady,
    /// The upstream has terminated. Only ever produced by an
    /// [`crate::eager::EagerAdapter`]; a `Boostable`'s own task buffer has no
    /// notion of exhaustion (that lives at the upstream it pulls from).
    Exhausted,
    /// A value was ready.
    Value(R),
}

/// A mapping pipeline stage: applies an async function to each element of an
/// upstream source, buffering however many tasks are currently in flight for
/// it, and accepting "boosts" — permission from the executor's scheduling
/// loop to start one more task now, funded by spare capacity.
///
/// You will not normally hold a `Box<dyn Boostable<_>>` directly; use
/// [`crate::executor::BoostExecutor::map_ordered`] or
/// [`crate::executor::BoostExecutor::map_unordered`], which construct one of
/// the two concrete implementations ([`crate::ordered::OrderedBoostable`],
/// [`crate::unordered::UnorderedBoostable`]) and hand it back as a stream.
#[async_trait]
pub trait Boostable<R>: Send
where
    R: Send + 'static,
{
    /// Tries to start one more task. Must never suspend: a `NotReady`
    /// result lets the scheduling loop move on to the next registered
    /// stage instead of blocking behind this one.
    fn provide_boost(&mut self) -> BoostOutcome;

    /// Non-blocking: returns a completed result if one is immediately
    /// available in the buffer, without waiting on anything.
    fn try_dequeue(&mut self) -> DequeueOutcome<R>;

    /// Returns the next result per this stage's ordering discipline,
    /// pulling from upstream and starting a task if the buffer is
    /// currently empty. Returns `None` once the upstream is exhausted and
    /// every buffered task has been drained.
    async fn blocking_dequeue(&mut self) -> Option<R>;

    /// Awaits completion of every task currently in the buffer. Used by the
    /// executor's scoped exit to drain exhausted stages before returning.
    async fn wait(&mut self);
}

/// A non-generic view onto a registered [`Boostable`], held by the
/// executor's active set.
///
/// The executor's scheduling loop round-robins over every stage registered
/// on it regardless of that stage's result type `R`, so it cannot hold a
/// homogeneous collection of `Box<dyn Boostable<R>>` directly (`R` differs
/// per stage). `ScheduledSlot` erases `R` down to the two operations the
/// loop actually needs. Implementations hold only a weak reference to the
/// underlying stage: once its exclusive owner (a downstream stage, or the
/// consumer iterating it) drops it, `try_boost` starts returning `None` and
/// the loop retires the slot instead of keeping it alive.
#[async_trait]
pub(crate) trait ScheduledSlot: Send {
    /// `None` if the owning stage has already been dropped.
    fn try_boost(&self) -> Option<BoostOutcome>;

    /// Waits for every task the stage has in flight, if it still exists.
    async fn wait_drain(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boost_outcome_variants_are_distinguishable() {
        assert_ne!(BoostOutcome::Started, BoostOutcome::NotReady);
        assert_ne!(BoostOutcome::NotReady, BoostOutcome::Exhausted);
    }
}
