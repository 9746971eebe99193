//! Wires the sampler, recorder, controller and benchmark pool together and
//! implements the operator actions on top of them.

use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use thermal_bench::{BenchmarkPool, PoolError};
use thermal_core::api::StatusResponse;
use thermal_core::testbed::FREQ_STEP_MAX;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::ambient;
use crate::config::DaemonConfig;
use crate::controller::{spawn_controller, ThermalController};
use crate::recorder::{spawn_recorder, SensorRecorder};
use crate::sampler::{SerialSampler, VoltageSource};
use crate::serial::PortOpener;
use crate::sysfs::CpuInterface;

/// Main service owning every loop of the profiler.
pub struct ProfilerService {
    cfg: DaemonConfig,
    recorder: Arc<SensorRecorder>,
    controller: Arc<ThermalController>,
    sampler: SerialSampler,
    pool: Arc<BenchmarkPool>,
    cancel: CancellationToken,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl ProfilerService {
    /// Builds every component and spawns the loops. Must be called inside a tokio runtime.
    pub fn start(
        cfg: DaemonConfig,
        cpu: Arc<dyn CpuInterface>,
        opener: Arc<dyn PortOpener>,
    ) -> Arc<Self> {
        let cancel = CancellationToken::new();
        let ambient_c = ambient::load(&cfg.ambient_path(), cfg.ambient.default_c);

        let sampler = SerialSampler::new(cfg.sampler.clone(), opener, cancel.child_token());
        let recorder = Arc::new(SensorRecorder::new(
            cfg.recorder.clone(),
            cfg.pcm,
            cfg.record_path(),
            ambient_c,
            cancel.child_token(),
        ));
        // the idle watch lives and dies with the controller
        let control_cancel = cancel.child_token();
        let controller = Arc::new(ThermalController::new(
            cfg.control.clone(),
            cfg.pcm.energy_max_j,
            cpu,
            control_cancel.clone(),
        ));

        let mut pool = BenchmarkPool::new(cfg.benchmark.clone());
        if cfg.benchmark.sets_frequency {
            let ctl = Arc::clone(&controller);
            pool = pool.with_before_run(Arc::new(move |core| {
                match ctl.set_core_frequency(core, FREQ_STEP_MAX) {
                    Ok(true) => {}
                    Ok(false) => tracing::warn!(core, "benchmark could not pin core frequency"),
                    Err(e) => tracing::warn!(core, error = %e, "benchmark core out of range"),
                }
            }));
        }
        let pool = Arc::new(pool);

        sampler.start();
        let voltage: Arc<dyn VoltageSource> = Arc::new(sampler.clone());
        let loops = vec![
            spawn_recorder(Arc::clone(&recorder), voltage),
            spawn_controller(Arc::clone(&controller), recorder.snapshots()),
            spawn_idle_watch(&pool, Arc::clone(&controller), control_cancel),
        ];

        tracing::info!(ambient_c, "profiler started");
        Arc::new(Self {
            cfg,
            recorder,
            controller,
            sampler,
            pool,
            cancel,
            loops: Mutex::new(loops),
        })
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.cfg
    }

    pub fn recorder(&self) -> &Arc<SensorRecorder> {
        &self.recorder
    }

    pub fn controller(&self) -> &Arc<ThermalController> {
        &self.controller
    }

    pub fn pool(&self) -> &Arc<BenchmarkPool> {
        &self.pool
    }

    pub fn status(&self) -> StatusResponse {
        StatusResponse {
            management_enabled: self.controller.management_enabled(),
            recording: self.recorder.record_state(),
            sampler_online: self.sampler.is_online(),
            ambient_c: self.recorder.ambient_temperature(),
            snapshot: self.recorder.current_snapshot(),
            active_cores: self.controller.active_cores(),
            core_frequencies: self.controller.core_frequencies(),
            benchmark_workers: self.pool.active_workers(),
            benchmark: self.pool.benchmark_interval(),
        }
    }

    /// Starts or stops recording. Stopping tags the record with the last benchmark interval.
    pub fn set_record_state(&self, active: bool) {
        if !active {
            self.recorder
                .set_benchmark_time(self.pool.benchmark_interval());
        }
        self.recorder.set_record_state(active);
    }

    /// Starts `threads` workers and arms thermal management if configured.
    pub fn start_benchmark(&self, threads: usize) -> Result<usize, PoolError> {
        let n = self.pool.start(threads)?;
        self.controller
            .set_management_enabled(self.cfg.control.enabled);
        Ok(n)
    }

    /// Cancels continuous workers. Timed workers run out their budget.
    pub fn stop_benchmark(&self) {
        tracing::info!("benchmark stop requested");
        self.pool.cancel();
    }

    /// Sets and persists the ambient temperature.
    pub fn set_ambient(&self, celsius: f32) -> Result<f32> {
        self.recorder.set_ambient_temperature(celsius);
        ambient::save(&self.cfg.ambient_path(), celsius)?;
        tracing::info!(ambient_c = celsius, "ambient temperature set");
        Ok(celsius)
    }

    /// Nudges the ambient temperature by `steps` tenths of a degree.
    pub fn step_ambient(&self, steps: i32) -> Result<f32> {
        let next = ambient::step(self.recorder.ambient_temperature(), steps);
        self.set_ambient(next)
    }

    /// Re-reads core online state and frequencies.
    pub fn check_cores(&self) {
        self.controller.check_active_cores();
        self.controller.check_core_frequencies();
    }

    /// Stops every loop in order and persists the ambient temperature.
    pub async fn shutdown(&self) {
        tracing::info!("profiler shutting down");
        self.pool.cancel();
        if self.pool.active_workers() > 0 {
            tracing::info!("waiting for benchmark workers");
        }
        self.pool.join().await;
        // A recording still open is flushed by the recorder on exit.
        self.recorder.set_benchmark_time(self.pool.benchmark_interval());

        self.controller.terminate();
        self.recorder.terminate();

        let loops = std::mem::take(&mut *self.loops.lock());
        for h in loops {
            if let Err(e) = h.await {
                tracing::warn!(error = %e, "loop did not finish cleanly");
            }
        }

        self.sampler.terminate();
        self.sampler.join().await;

        if let Err(e) = ambient::save(&self.cfg.ambient_path(), self.recorder.ambient_temperature()) {
            tracing::warn!(error = %e, "could not persist ambient temperature");
        }

        self.cancel.cancel();
        tracing::info!("profiler stopped");
    }
}

/// Turns thermal management off whenever the last benchmark worker finishes.
fn spawn_idle_watch(
    pool: &BenchmarkPool,
    controller: Arc<ThermalController>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut active = pool.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = active.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            if *active.borrow_and_update() == 0 {
                tracing::info!("all benchmark workers finished");
                controller.set_management_enabled(false);
            }
        }
    })
}
