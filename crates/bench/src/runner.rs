//! One benchmark worker: prepare inputs, optionally idle, load the core, report timing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thermal_core::model::TimeInterval;
use thermal_core::now_ms;
use tokio_util::sync::CancellationToken;

use crate::kernel::{KernelKind, Workload};

/// Hook run on the worker's thread right before loading starts, given the worker index.
pub type BeforeRun = Arc<dyn Fn(usize) + Send + Sync>;

/// How long a worker keeps its core busy.
#[derive(Debug, Clone)]
pub enum WorkerTask {
    /// Idle for `idle_delay`, then run batches until `budget` has elapsed.
    /// Cannot be cancelled once started.
    Timed {
        idle_delay: Duration,
        budget: Duration,
    },
    /// Run batches until the token is cancelled, checked after every batch.
    Continuous { cancel: CancellationToken },
}

/// Runs a worker to completion on the current (blocking) thread.
pub fn run_worker(
    index: usize,
    kernel: KernelKind,
    batch_cycles: usize,
    task: WorkerTask,
    before_run: Option<&BeforeRun>,
) -> TimeInterval {
    tracing::info!(worker = index, %kernel, "benchmark worker started");
    let mut workload = Workload::prepare(kernel);

    if let WorkerTask::Timed { idle_delay, .. } = &task {
        std::thread::sleep(*idle_delay);
    }
    if let Some(hook) = before_run {
        hook(index);
    }

    let start_ms = now_ms();
    match task {
        WorkerTask::Timed { budget, .. } => {
            let started = Instant::now();
            loop {
                workload.run_batch(batch_cycles);
                if started.elapsed() >= budget {
                    break;
                }
            }
        }
        WorkerTask::Continuous { cancel } => loop {
            workload.run_batch(batch_cycles);
            if cancel.is_cancelled() {
                break;
            }
        },
    }
    let timing = TimeInterval::new(start_ms, now_ms());

    tracing::info!(
        worker = index,
        secs = timing.elapsed_secs(),
        "benchmark worker ended"
    );
    timing
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn timed_worker_runs_for_its_budget() {
        let t = run_worker(
            0,
            KernelKind::Smult,
            1,
            WorkerTask::Timed {
                idle_delay: Duration::ZERO,
                budget: Duration::from_millis(30),
            },
            None,
        );
        assert!(t.is_complete());
        assert!(t.stop_ms - t.start_ms >= 30);
    }

    #[test]
    fn cancelled_worker_still_runs_one_batch_and_calls_hook() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let seen = Arc::new(AtomicUsize::new(usize::MAX));
        let hook: BeforeRun = {
            let seen = seen.clone();
            Arc::new(move |i| seen.store(i, Ordering::SeqCst))
        };
        let t = run_worker(
            2,
            KernelKind::Lu,
            1,
            WorkerTask::Continuous { cancel },
            Some(&hook),
        );
        assert!(t.is_complete());
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
