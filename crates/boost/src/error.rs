// Crate implementing the Engineering Principles of the boosted executor

use thiserror::Error;

pub type BoostResult<T> = anyhow::Result<T, BoostError>;

#[derive(Error, Debug)]
pub enum BoostError {
    #[error("concurrency must be at least 1")]
    InvalidConcurrency,

    #[error("mapping function panicked: {0}")]
    TaskPanicked(String),

    #[error("task was cancelled before producing a result")]
    TaskCancelled,
}

impl BoostError {
    /// Builds a [`BoostError::TaskPanicked`] from a failed `JoinHandle`,
    /// recovering the panic message where possible.
    pub(crate) fn from_join_error(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            return BoostError::TaskCancelled;
        }
        match err.try_into_panic() {
            Ok(payload) => {
                let message = if let Some(s) = payload.downcast_ref::<&str>() {
                    (*s).to_string()
                } else if let Some(s) = payload.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "non-string panic payload".to_string()
                };
                BoostError::TaskPanicked(message)
            }
            Err(_) => BoostError::TaskCancelled,
        }
    }
}
