//! Thermal control loop: reads the latest fused snapshot once per period and
//! steps core frequencies through the throttle policy.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thermal_core::error::TestbedError;
use thermal_core::model::TemperatureSnapshot;
use thermal_core::now_ms;
use thermal_core::policy::{Decision, ThrottlePolicy};
use thermal_core::testbed::{self, NUM_CORES};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ControlConfig;
use crate::handoff::LatestCell;
use crate::sysfs::CpuInterface;

struct ControlState {
    enabled: bool,
    policy: ThrottlePolicy,
}

/// Last observed per-core hotplug state and frequency.
#[derive(Debug, Clone, Copy, Default)]
struct CoreState {
    active: [bool; NUM_CORES],
    freq: [u32; NUM_CORES],
}

/// Owns the CPU knobs and the throttle policy.
pub struct ThermalController {
    cfg: ControlConfig,
    cpu: Arc<dyn CpuInterface>,
    control: Mutex<ControlState>,
    // held across write and read-back so actuations do not interleave
    cores: Mutex<CoreState>,
    cancel: CancellationToken,
}

impl ThermalController {
    pub fn new(
        cfg: ControlConfig,
        energy_max_j: f32,
        cpu: Arc<dyn CpuInterface>,
        cancel: CancellationToken,
    ) -> Self {
        let policy = ThrottlePolicy::new(cfg.policy, energy_max_j, now_ms());
        Self {
            cfg,
            cpu,
            control: Mutex::new(ControlState {
                enabled: false,
                policy,
            }),
            cores: Mutex::new(CoreState::default()),
            cancel,
        }
    }

    /// Switches management on or off. Either way any pending cooldown is dropped.
    pub fn set_management_enabled(&self, enable: bool) {
        let mut c = self.control.lock();
        if c.enabled != enable {
            tracing::info!(enabled = enable, "thermal management toggled");
        }
        c.enabled = enable;
        c.policy.clear_cooldown();
    }

    pub fn management_enabled(&self) -> bool {
        self.control.lock().enabled
    }

    pub fn in_cooldown(&self) -> bool {
        self.control.lock().policy.in_cooldown()
    }

    /// Re-reads every core's online state. Unreadable cores keep their last known state.
    pub fn check_active_cores(&self) {
        let mut cores = self.cores.lock();
        for core in 0..NUM_CORES {
            match self.cpu.read_online(core) {
                Ok(active) => cores.active[core] = active,
                Err(e) => tracing::warn!(core, error = %e, "cannot read core online state"),
            }
        }
    }

    /// Re-reads every core's frequency; offline cores read as 0.
    pub fn check_core_frequencies(&self) {
        let mut cores = self.cores.lock();
        for core in 0..NUM_CORES {
            self.refresh_frequency(&mut cores, core);
        }
    }

    fn refresh_frequency(&self, cores: &mut CoreState, core: usize) {
        if !cores.active[core] {
            cores.freq[core] = 0;
            return;
        }
        match self.cpu.read_frequency(core) {
            Ok(f) => cores.freq[core] = f,
            Err(e) => tracing::warn!(core, error = %e, "cannot read core frequency"),
        }
    }

    pub fn active_cores(&self) -> [bool; NUM_CORES] {
        self.cores.lock().active
    }

    pub fn core_frequencies(&self) -> [u32; NUM_CORES] {
        self.cores.lock().freq
    }

    /// Last read-back frequency of `core`, 0 when offline.
    pub fn core_frequency(&self, core: usize) -> Result<u32, TestbedError> {
        let core = testbed::check_core(core)?;
        Ok(self.cores.lock().freq[core])
    }

    /// Brings a core on- or offline and verifies the result by reading it back.
    pub fn set_core_active(&self, core: usize, enabled: bool) -> Result<bool, TestbedError> {
        let core = testbed::check_core(core)?;
        let mut cores = self.cores.lock();
        if let Err(e) = self.cpu.write_online(core, enabled) {
            tracing::warn!(core, error = %e, "cannot write core online state");
        }
        match self.cpu.read_online(core) {
            Ok(active) => cores.active[core] = active,
            Err(e) => tracing::warn!(core, error = %e, "cannot read core online state"),
        }
        let ok = cores.active[core] == enabled;
        tracing::debug!(core, enabled, ok, "set core active");
        Ok(ok)
    }

    /// Sets one core to frequency step `step` and verifies it by reading back.
    pub fn set_core_frequency(&self, core: usize, step: usize) -> Result<bool, TestbedError> {
        let core = testbed::check_core(core)?;
        let freq = testbed::frequency_for_step(step)?;
        let mut cores = self.cores.lock();
        Ok(self.apply_frequency(&mut cores, core, freq))
    }

    fn apply_frequency(&self, cores: &mut CoreState, core: usize, freq: u32) -> bool {
        if let Err(e) = self.cpu.write_frequency(core, freq) {
            tracing::warn!(core, freq, error = %e, "cannot write core frequency");
        }
        self.refresh_frequency(cores, core);
        let ok = cores.freq[core] == freq;
        tracing::debug!(core, freq, ok, read_back = cores.freq[core], "set core frequency");
        ok
    }

    /// Sets every active core to `step`. True only if every active core verified.
    pub fn set_core_frequencies(&self, step: usize) -> Result<bool, TestbedError> {
        let freq = testbed::frequency_for_step(step)?;
        let mut cores = self.cores.lock();
        let mut ok = true;
        for core in 0..NUM_CORES {
            if cores.active[core] {
                ok &= self.apply_frequency(&mut cores, core, freq);
            }
        }
        Ok(ok)
    }

    /// Frequency step of the first active core, or the slowest step if none is active.
    pub fn current_step(&self) -> usize {
        let cores = self.cores.lock();
        match (0..NUM_CORES).find(|&c| cores.active[c]) {
            Some(c) => testbed::step_or_min(cores.freq[c]),
            None => testbed::FREQ_STEP_MIN,
        }
    }

    /// Restarts the anti-chatter window.
    pub fn stamp(&self, now_ms: i64) {
        self.control.lock().policy.stamp(now_ms);
    }

    /// One control period: evaluate the policy on `snapshot` and apply its decision.
    pub fn tick(&self, snapshot: &TemperatureSnapshot, now_ms: i64) -> Option<Decision> {
        let current_step = self.current_step();
        let decision = {
            let mut c = self.control.lock();
            if !c.enabled {
                return None;
            }
            c.policy.evaluate(
                now_ms,
                snapshot.pcm_energy_j,
                snapshot.cpu_temp_c,
                current_step,
            )?
        };

        match decision {
            Decision::Throttle { to_step, trigger } => tracing::info!(
                ?trigger,
                from = current_step,
                to = to_step,
                t_cpu = snapshot.cpu_temp_c,
                e_pcm = snapshot.pcm_energy_j,
                "throttling cores"
            ),
            Decision::Restore { to_step } => tracing::info!(
                to = to_step,
                e_pcm = snapshot.pcm_energy_j,
                "pcm recovered, restoring frequency"
            ),
        }

        match self.set_core_frequencies(decision.to_step()) {
            Ok(true) => {}
            Ok(false) => tracing::warn!(step = decision.to_step(), "frequency change not verified"),
            Err(e) => tracing::warn!(error = %e, "frequency change rejected"),
        }
        Some(decision)
    }

    /// Stops the loop at its next period.
    pub fn terminate(&self) {
        self.cancel.cancel();
    }
}

/// Spawns the control loop over the recorder's snapshot slot.
pub fn spawn_controller(
    ctl: Arc<ThermalController>,
    snapshots: LatestCell<TemperatureSnapshot>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let cancel = ctl.cancel.clone();
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(Duration::from_millis(ctl.cfg.startup_delay_ms)) => {}
        }

        let first = Arc::clone(&ctl);
        let checked = tokio::task::spawn_blocking(move || {
            first.check_active_cores();
            first.check_core_frequencies();
        })
        .await;
        if let Err(e) = checked {
            tracing::error!(error = %e, "initial core check failed");
            return;
        }
        ctl.stamp(now_ms());
        tracing::info!(
            active = ?ctl.active_cores(),
            freq = ?ctl.core_frequencies(),
            "thermal controller started"
        );

        let mut tick = tokio::time::interval(Duration::from_millis(ctl.cfg.period_ms));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {}
            }
            let snapshot = snapshots.latest();
            let worker = Arc::clone(&ctl);
            let ticked =
                tokio::task::spawn_blocking(move || worker.tick(&snapshot, now_ms())).await;
            if let Err(e) = ticked {
                tracing::error!(error = %e, "control tick failed");
                break;
            }
        }
        tracing::info!("thermal controller stopped");
    })
}
