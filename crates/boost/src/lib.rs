//! A concurrent executor that redistributes spare concurrency across
//! pipelined mapping stages.
//!
//! Chaining plain bounded-concurrency maps ("apply `f`, allow at most `C` in
//! flight") stalls whenever one stage's mapping function is slower than the
//! next: capacity sits idle on the fast stage while the slow one queues up
//! work. [`BoostExecutor`] shares one capacity token across every stage
//! registered on it and round-robins spare units to whichever stage can use
//! one right now, so the whole pipeline keeps `C` tasks in flight overall
//! rather than `C` tasks per stage.
//!
//! ```no_run
//! use std::num::NonZeroUsize;
//! use ewe_boost::BoostExecutor;
//!
//! # async fn run() -> Result<(), std::convert::Infallible> {
//! let executor = BoostExecutor::new(NonZeroUsize::new(4).unwrap());
//! executor
//!     .run(|ex| async move {
//!         let doubled = ex.map_ordered(|x: i32| async move { x * 2 }, vec![1, 2, 3].into_iter());
//!         let incremented = ex.map_ordered(|x: i32| async move { x + 1 }, doubled);
//!         let mut out = ex.consume(incremented);
//!         use futures::StreamExt;
//!         while let Some(v) = out.next().await {
//!             println!("{v}");
//!         }
//!         Ok(())
//!     })
//!     .await
//! # }
//! ```

mod boostable;
mod capacity;
mod eager;
mod error;
mod executor;
mod ordered;
mod unordered;
mod upstream;

pub use boostable::{BoostOutcome, Boostable, DequeueOutcome};
pub use capacity::{CapacityPermit, CapacityToken};
pub use eager::EagerAdapter;
pub use error::{BoostError, BoostResult};
pub use executor::BoostExecutor;
pub use ordered::OrderedBoostable;
pub use unordered::UnorderedBoostable;
pub use upstream::Upstream;
