// Crate implementing the Engineering Principles of bounded concurrency

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A counting gate bounding the number of tasks in flight across one
/// [`crate::executor::BoostExecutor`].
///
/// Constructed with `C - 1` permits rather than `C`: the missing unit is
/// conceptually owned by whoever is iterating the outermost boostable and is
/// donated back to the token for the duration of that iteration (see
/// [`CapacityToken::donate_foreground`]). This is what lets a boostable
/// registered on an executor spawn further boostables on the same executor
/// without deadlocking on its own permit.
#[derive(Clone)]
pub struct CapacityToken {
    semaphore: Arc<Semaphore>,
}

/// An acquired unit of capacity. Dropping it returns the unit to the token.
pub struct CapacityPermit {
    _permit: OwnedSemaphorePermit,
}

impl CapacityToken {
    pub fn new(concurrency: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
        }
    }

    /// Suspends until a permit is available, then holds it.
    pub async fn acquire(&self) -> CapacityPermit {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("capacity semaphore is never closed");
        CapacityPermit { _permit: permit }
    }

    /// True iff zero permits are currently available. Non-suspending.
    pub fn is_empty(&self) -> bool {
        self.semaphore.available_permits() == 0
    }

    /// Donates one unit of "foreground" concurrency into the pool. Pairs
    /// with [`CapacityToken::revoke_foreground`].
    pub fn donate_foreground(&self) {
        self.semaphore.add_permits(1);
    }

    /// Withdraws the unit donated by [`CapacityToken::donate_foreground`].
    /// Suspends if every permit (including the donated one) is currently
    /// held elsewhere; this is the price of reentrancy safety.
    pub async fn revoke_foreground(&self) {
        let _ = self.acquire().await;
    }

    /// Wraps `f(arg)` so that running it always holds exactly one permit
    /// for its duration, per the task-buffer invariant in
    /// [`crate::boostable::Boostable`].
    pub fn guarded<T, R, F, Fut>(&self, f: Arc<F>, arg: T) -> impl Future<Output = R> + Send + 'static
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let token = self.clone();
        async move {
            let _permit = token.acquire().await;
            f(arg).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_token_reports_its_starting_width() {
        let token = CapacityToken::new(2);
        assert!(!token.is_empty());

        let _first = token.acquire().await;
        assert!(!token.is_empty());

        let _second = token.acquire().await;
        assert!(token.is_empty());
    }

    #[tokio::test]
    async fn dropping_a_permit_frees_it_again() {
        let token = CapacityToken::new(1);
        let permit = token.acquire().await;
        assert!(token.is_empty());

        drop(permit);
        assert!(!token.is_empty());
    }

    #[tokio::test]
    async fn foreground_donation_raises_capacity_by_one_until_revoked() {
        let token = CapacityToken::new(1);
        let _only_permit = token.acquire().await;
        assert!(token.is_empty());

        token.donate_foreground();
        assert!(!token.is_empty());

        token.revoke_foreground().await;
        assert!(token.is_empty());
    }

    #[tokio::test]
    async fn guarded_future_holds_a_permit_while_running() {
        let token = CapacityToken::new(1);
        let f = Arc::new(|x: i32| async move { x * 2 });
        let result = token.guarded(f, 21).await;
        assert_eq!(result, 42);
        assert!(!token.is_empty());
    }
}
