// Crate implementing the Engineering Principles of the underlying source abstraction

use crate::boostable::{Boostable, BoostOutcome, DequeueOutcome};
use crate::eager::EagerAdapter;

/// Outcome of a non-blocking, synchronous attempt to take the next element
/// straight from an upstream without going through a task at all.
///
/// Distinct from [`DequeueOutcome`]: this is about pulling a raw `T` out of
/// the thing a [`Boostable`] maps over, not about a completed mapped
/// result `R`.
pub(crate) enum UpstreamTake<T> {
    Ready(T),
    NotReady,
    Exhausted,
}

/// The closed set of three things a [`Boostable`] can be layered over: a
/// plain synchronous iterator, an [`EagerAdapter`] over a lazy async source,
/// or another `Boostable` (composition).
///
/// Modelled as a tagged sum rather than open polymorphism (trait objects
/// over an arbitrary "is this a valid upstream" marker trait), per the
/// closed, three-way nature of the choice: there is exactly one method to
/// call per variant, and no fourth kind is ever expected.
pub enum Upstream<T: Send + 'static> {
    Iter(Box<dyn Iterator<Item = T> + Send>),
    Eager(EagerAdapter<T>),
    Boost(Box<dyn Boostable<T> + Send>),
}

impl<T: Send + 'static> Upstream<T> {
    /// Like `next`, but abstracts over the three upstream kinds and never
    /// suspends. Used by `provide_boost` implementations to decide whether
    /// to enqueue a task or report `NotReady`/`Exhausted`.
    pub(crate) fn try_take(&mut self) -> UpstreamTake<T> {
        match self {
            Upstream::Iter(it) => match it.next() {
                Some(value) => UpstreamTake::Ready(value),
                None => UpstreamTake::Exhausted,
            },
            Upstream::Eager(eager) => match eager.try_dequeue() {
                DequeueOutcome::Value(value) => UpstreamTake::Ready(value),
                DequeueOutcome::Exhausted => UpstreamTake::Exhausted,
                DequeueOutcome::NotReady => UpstreamTake::NotReady,
            },
            Upstream::Boost(boostable) => match boostable.try_dequeue() {
                DequeueOutcome::Value(value) => UpstreamTake::Ready(value),
                DequeueOutcome::NotReady => UpstreamTake::NotReady,
                DequeueOutcome::Exhausted => {
                    unreachable!("a Boostable's own try_dequeue never reports Exhausted")
                }
            },
        }
    }

    /// Only meaningful when `self` is [`Upstream::Boost`]: forwards a boost
    /// one level deeper into the chain. Returns `None` for the other two
    /// variants, which have no notion of forwarding.
    pub(crate) fn forward_boost(&mut self) -> Option<BoostOutcome> {
        match self {
            Upstream::Boost(boostable) => Some(boostable.provide_boost()),
            Upstream::Iter(_) | Upstream::Eager(_) => None,
        }
    }

    /// Like `next`, but abstracts over a [`Upstream`]: pulls and translates
    /// end-of-sequence for a synchronous iterator, calls `next` on an eager
    /// adapter, or `blocking_dequeue` on a boostable.
    pub async fn next(&mut self) -> Option<T> {
        match self {
            Upstream::Iter(it) => it.next(),
            Upstream::Eager(eager) => eager.next().await,
            Upstream::Boost(boostable) => boostable.blocking_dequeue().await,
        }
    }
}

impl<T: Send + 'static, I> From<I> for Upstream<T>
where
    I: Iterator<Item = T> + Send + 'static,
{
    fn from(iter: I) -> Self {
        Upstream::Iter(Box::new(iter))
    }
}

impl<T: Send + 'static> From<EagerAdapter<T>> for Upstream<T> {
    fn from(eager: EagerAdapter<T>) -> Self {
        Upstream::Eager(eager)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn an_iterator_upstream_reports_exhaustion_once_drained() {
        let mut upstream: Upstream<i32> = vec![1, 2].into_iter().into();
        assert!(matches!(upstream.try_take(), UpstreamTake::Ready(1)));
        assert!(matches!(upstream.try_take(), UpstreamTake::Ready(2)));
        assert!(matches!(upstream.try_take(), UpstreamTake::Exhausted));
    }
}
