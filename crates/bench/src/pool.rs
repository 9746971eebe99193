//! Pool of benchmark workers, at most one per core.
//!
//! Workers run on tokio's blocking pool. Each owns one slot of the shared
//! timing table; the number of running workers is published on a watch
//! channel so the daemon can switch thermal management off once the last
//! worker is done.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thermal_core::model::TimeInterval;
use thermal_core::testbed::NUM_CORES;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::kernel::KernelKind;
use crate::runner::{run_worker, BeforeRun, WorkerTask};

/// How workers decide when to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchMode {
    /// Fixed wall-clock budget after an idle delay; not cancellable.
    #[default]
    Timed,
    /// Until cancelled.
    Continuous,
}

impl FromStr for BenchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "timed" => Ok(Self::Timed),
            "continuous" => Ok(Self::Continuous),
            other => Err(format!("unknown benchmark mode {other:?} (expected timed or continuous)")),
        }
    }
}

impl fmt::Display for BenchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Timed => "timed",
            Self::Continuous => "continuous",
        })
    }
}

/// Benchmark settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub mode: BenchMode,
    pub kernel: KernelKind,
    /// Idle time before a timed run starts loading.
    pub idle_delay_ms: u64,
    /// Wall-clock budget of a timed run.
    pub budget_ms: u64,
    /// Kernel cycles per batch.
    pub batch_cycles: usize,
    /// Whether each worker pins its core to the fastest step before loading.
    pub sets_frequency: bool,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            mode: BenchMode::Timed,
            kernel: KernelKind::Sor,
            idle_delay_ms: 5_000,
            budget_ms: 8_000,
            batch_cycles: 2_048,
            sets_frequency: false,
        }
    }
}

/// Pool errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("a benchmark is already running")]
    AlreadyRunning,
}

#[derive(Debug, Default)]
struct Slots {
    running: [bool; NUM_CORES],
    timings: [TimeInterval; NUM_CORES],
}

struct Shared {
    slots: Mutex<Slots>,
    active: watch::Sender<usize>,
}

impl Shared {
    fn finish(&self, index: usize, timing: TimeInterval) {
        let mut slots = self.slots.lock();
        slots.timings[index] = timing;
        slots.running[index] = false;
        let remaining = slots.running.iter().filter(|r| **r).count();
        // published under the lock so concurrent finishers cannot reorder counts
        self.active.send_replace(remaining);
    }
}

/// Releases a worker's slot even if the kernel panics.
struct SlotRelease {
    shared: Arc<Shared>,
    index: usize,
    timing: TimeInterval,
}

impl Drop for SlotRelease {
    fn drop(&mut self) {
        self.shared.finish(self.index, self.timing);
    }
}

/// Bounded pool of benchmark workers.
pub struct BenchmarkPool {
    cfg: BenchConfig,
    shared: Arc<Shared>,
    cancel: Mutex<Option<CancellationToken>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    before_run: Option<BeforeRun>,
}

impl BenchmarkPool {
    pub fn new(cfg: BenchConfig) -> Self {
        let (active, _) = watch::channel(0);
        Self {
            cfg,
            shared: Arc::new(Shared {
                slots: Mutex::new(Slots::default()),
                active,
            }),
            cancel: Mutex::new(None),
            handles: Mutex::new(Vec::new()),
            before_run: None,
        }
    }

    /// Installs a hook each worker calls with its index before loading.
    pub fn with_before_run(mut self, hook: BeforeRun) -> Self {
        self.before_run = Some(hook);
        self
    }

    pub fn config(&self) -> &BenchConfig {
        &self.cfg
    }

    /// Starts `threads` workers, clamped to `[1, NUM_CORES]`. Must be called inside a tokio runtime.
    ///
    /// Every timing slot is reset first. Returns the number of workers started.
    pub fn start(&self, threads: usize) -> Result<usize, PoolError> {
        let n = threads.clamp(1, NUM_CORES);
        {
            let mut slots = self.shared.slots.lock();
            if slots.running.iter().any(|r| *r) {
                return Err(PoolError::AlreadyRunning);
            }
            slots.timings = [TimeInterval::UNSET; NUM_CORES];
            for r in slots.running.iter_mut().take(n) {
                *r = true;
            }
            self.shared.active.send_replace(n);
        }

        let token = CancellationToken::new();
        *self.cancel.lock() = Some(token.clone());

        let mut handles = self.handles.lock();
        handles.retain(|h| !h.is_finished());
        for index in 0..n {
            let task = match self.cfg.mode {
                BenchMode::Timed => WorkerTask::Timed {
                    idle_delay: Duration::from_millis(self.cfg.idle_delay_ms),
                    budget: Duration::from_millis(self.cfg.budget_ms),
                },
                BenchMode::Continuous => WorkerTask::Continuous {
                    cancel: token.clone(),
                },
            };
            let kernel = self.cfg.kernel;
            let cycles = self.cfg.batch_cycles;
            let hook = self.before_run.clone();
            let release = SlotRelease {
                shared: self.shared.clone(),
                index,
                timing: TimeInterval::UNSET,
            };
            handles.push(tokio::task::spawn_blocking(move || {
                let mut release = release;
                release.timing = run_worker(index, kernel, cycles, task, hook.as_ref());
            }));
        }

        tracing::info!(
            workers = n,
            mode = %self.cfg.mode,
            kernel = %self.cfg.kernel,
            "benchmark started"
        );
        Ok(n)
    }

    /// Asks continuous workers to stop after their current batch. Timed workers run on.
    pub fn cancel(&self) {
        if let Some(token) = self.cancel.lock().as_ref() {
            token.cancel();
        }
    }

    /// Number of workers still running.
    pub fn active_workers(&self) -> usize {
        *self.shared.active.borrow()
    }

    /// Watch channel carrying the running-worker count.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.shared.active.subscribe()
    }

    /// Earliest start and latest stop over every worker of the last run.
    pub fn benchmark_interval(&self) -> TimeInterval {
        TimeInterval::coalesce(&self.shared.slots.lock().timings)
    }

    /// Per-worker timings of the last run.
    pub fn worker_intervals(&self) -> [TimeInterval; NUM_CORES] {
        self.shared.slots.lock().timings
    }

    /// Waits for every spawned worker to return.
    pub async fn join(&self) {
        let handles = std::mem::take(&mut *self.handles.lock());
        for h in handles {
            if let Err(e) = h.await {
                tracing::warn!(error = %e, "benchmark worker did not finish cleanly");
            }
        }
    }
}
