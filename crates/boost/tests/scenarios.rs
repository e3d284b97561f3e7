//! WHY: bugs in a boosted pipeline tend to hide in cross-stage interaction —
//! a single `map_ordered` call rarely reveals whether spare capacity is
//! actually being redistributed. These tests exercise the executor as a
//! whole, the way a caller would use it.
//!
//! WHAT: each test below maps directly onto one of the scenarios this crate
//! is expected to satisfy: ordering under a tight capacity bound, unordered
//! completion, two-stage composition, and cancellation of an in-progress
//! run.
//!
//! HOW: every test builds a real `BoostExecutor` with a shortened backoff
//! range (so a starved stage doesn't add seconds to the suite) and drives it
//! through `run`.

use std::convert::Infallible;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ewe_boost::{BoostExecutor, Boostable};
use futures::StreamExt;

fn executor(concurrency: usize) -> BoostExecutor {
    BoostExecutor::new(NonZeroUsize::new(concurrency).unwrap())
        .with_backoff(Duration::from_millis(1), Duration::from_millis(5))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ordered_mapping_preserves_input_order_under_a_tight_capacity_bound() {
    let ex = executor(2);
    let result: Result<Vec<i32>, Infallible> = ex
        .run(|ex| async move {
            let stage = ex.map_ordered(
                |x: i32| async move {
                    tokio::time::sleep(Duration::from_millis(((x % 3) * 4) as u64)).await;
                    x * x
                },
                (1..=6).collect::<Vec<_>>().into_iter(),
            );
            let values: Vec<i32> = ex.consume(stage).collect().await;
            Ok(values)
        })
        .await;

    assert_eq!(result.unwrap(), vec![1, 4, 9, 16, 25, 36]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unordered_mapping_yields_shorter_tasks_first() {
    let ex = executor(3);
    let result: Result<Vec<u64>, Infallible> = ex
        .run(|ex| async move {
            let stage = ex.map_unordered(
                |delay: u64| async move {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    delay
                },
                vec![30u64, 5, 20].into_iter(),
            );
            let values: Vec<u64> = ex.consume(stage).collect().await;
            Ok(values)
        })
        .await;

    assert_eq!(result.unwrap(), vec![5, 20, 30]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn call_order_is_source_order_even_though_output_order_is_not() {
    let ex = executor(1);
    let call_order = Arc::new(std::sync::Mutex::new(Vec::new()));
    let co = call_order.clone();

    let result: Result<Vec<i32>, Infallible> = ex
        .run(|ex| async move {
            let stage = ex.map_ordered(
                move |x: i32| {
                    let co = co.clone();
                    async move {
                        co.lock().unwrap().push(x);
                        x
                    }
                },
                vec![1, 2, 3].into_iter(),
            );
            let values: Vec<i32> = ex.consume(stage).collect().await;
            Ok(values)
        })
        .await;

    assert_eq!(result.unwrap(), vec![1, 2, 3]);
    assert_eq!(*call_order.lock().unwrap(), vec![1, 2, 3]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_stage_pipeline_shares_capacity_across_both_maps() {
    let ex = executor(3);
    let result: Result<Vec<i32>, Infallible> = ex
        .run(|ex| async move {
            let doubled = ex.map_ordered(
                |x: i32| async move {
                    tokio::time::sleep(Duration::from_millis(3)).await;
                    x * 2
                },
                vec![1, 2, 3, 4].into_iter(),
            );
            let incremented = ex.map_ordered(
                |x: i32| async move {
                    tokio::time::sleep(Duration::from_millis(3)).await;
                    x + 1
                },
                doubled,
            );
            let values: Vec<i32> = ex.consume(incremented).collect().await;
            Ok(values)
        })
        .await;

    assert_eq!(result.unwrap(), vec![3, 5, 7, 9]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn an_error_returned_from_the_body_short_circuits_without_draining() {
    let ex = executor(2);
    let started = Arc::new(AtomicUsize::new(0));
    let started_clone = started.clone();

    let result: Result<(), &'static str> = ex
        .run(|ex| async move {
            let mut stage = ex.map_ordered(
                move |x: i32| {
                    let started = started_clone.clone();
                    async move {
                        started.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        x
                    }
                },
                (0..20).collect::<Vec<_>>().into_iter(),
            );
            for _ in 0..2 {
                stage.provide_boost();
            }
            Err("caller gave up early")
        })
        .await;

    assert_eq!(result, Err("caller gave up early"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn an_eager_adapter_upstream_overlaps_prefetch_with_mapping() {
    use futures::stream;

    let ex = executor(2);
    let result: Result<Vec<i32>, Infallible> = ex
        .run(|ex| async move {
            let eager = ewe_boost::EagerAdapter::new(stream::iter(1..=4).then(|x| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                x
            }));
            let stage = ex.map_ordered(
                |x: i32| async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    x * 10
                },
                eager,
            );
            let values: Vec<i32> = ex.consume(stage).collect().await;
            Ok(values)
        })
        .await;

    assert_eq!(result.unwrap(), vec![10, 20, 30, 40]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn round_robin_gives_every_continuously_ready_stage_a_boost_before_starving_any_one() {
    // Three stages, each fed from an unbounded counter and each with enough
    // shared capacity to run concurrently: if the loop favoured one stage
    // over the others instead of round-robining, the later stages would
    // never get a chance to start and this would hang instead of completing.
    let ex = executor(6);
    let touched = Arc::new([AtomicUsize::new(0), AtomicUsize::new(0), AtomicUsize::new(0)]);

    let result: Result<(), Infallible> = ex
        .run(|ex| {
            let touched = touched.clone();
            async move {
                let mut stages = Vec::new();
                for i in 0..3usize {
                    let touched = touched.clone();
                    stages.push(ex.map_ordered(
                        move |x: u64| {
                            let touched = touched.clone();
                            async move {
                                touched[i].fetch_add(1, Ordering::SeqCst);
                                x
                            }
                        },
                        0u64..,
                    ));
                }

                let mut firsts = Vec::new();
                for stage in stages {
                    firsts.push(ex.consume(stage).into_future());
                }
                for fut in firsts {
                    let (first, _) = fut.await;
                    assert_eq!(first, Some(0));
                }
                Ok(())
            }
        })
        .await;

    result.unwrap();
    for counter in touched.iter() {
        assert!(counter.load(Ordering::SeqCst) >= 1);
    }
}
