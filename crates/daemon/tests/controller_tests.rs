//! Thermal controller against an in-memory CPU.

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use thermal_core::error::TestbedError;
use thermal_core::model::TemperatureSnapshot;
use thermal_core::policy::{Decision, Trigger};
use thermal_core::testbed::{CPU_FREQUENCIES, FREQ_STEP_MAX, NUM_CORES};
use thermal_daemon::config::ControlConfig;
use thermal_daemon::controller::ThermalController;
use thermal_daemon::sysfs::CpuInterface;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct FakeState {
    online: [bool; NUM_CORES],
    freq: [u32; NUM_CORES],
    freq_writes: Vec<(usize, u32)>,
    ignore_writes: bool,
}

#[derive(Default)]
struct FakeCpu {
    state: Mutex<FakeState>,
}

impl FakeCpu {
    fn with(online: [bool; NUM_CORES], freq: u32) -> Arc<Self> {
        let cpu = Self::default();
        {
            let mut s = cpu.state.lock();
            s.online = online;
            s.freq = [freq; NUM_CORES];
        }
        Arc::new(cpu)
    }

    fn writes(&self) -> Vec<(usize, u32)> {
        self.state.lock().freq_writes.clone()
    }
}

impl CpuInterface for FakeCpu {
    fn read_online(&self, core: usize) -> io::Result<bool> {
        Ok(self.state.lock().online[core])
    }

    fn write_online(&self, core: usize, online: bool) -> io::Result<()> {
        let mut s = self.state.lock();
        if !s.ignore_writes {
            s.online[core] = online;
        }
        Ok(())
    }

    fn read_frequency(&self, core: usize) -> io::Result<u32> {
        Ok(self.state.lock().freq[core])
    }

    fn write_frequency(&self, core: usize, freq: u32) -> io::Result<()> {
        let mut s = self.state.lock();
        s.freq_writes.push((core, freq));
        if !s.ignore_writes {
            s.freq[core] = freq;
        }
        Ok(())
    }
}

const FULL_SPEED: u32 = CPU_FREQUENCIES[FREQ_STEP_MAX];

fn controller(cpu: Arc<FakeCpu>) -> ThermalController {
    let ctl = ThermalController::new(
        ControlConfig::default(),
        230.0,
        cpu,
        CancellationToken::new(),
    );
    ctl.check_active_cores();
    ctl.check_core_frequencies();
    ctl.stamp(0);
    ctl
}

fn snapshot(cpu_temp_c: f32, pcm_energy_j: f32) -> TemperatureSnapshot {
    TemperatureSnapshot {
        cpu_temp_c,
        pcm_energy_j,
        ..TemperatureSnapshot::default()
    }
}

#[test]
fn test_hot_cpu_steps_every_core_down_once() {
    let cpu = FakeCpu::with([true; NUM_CORES], FULL_SPEED);
    let ctl = controller(cpu.clone());
    ctl.set_management_enabled(true);

    let d = ctl.tick(&snapshot(85.0, 0.0), 10_000);
    assert_eq!(
        d,
        Some(Decision::Throttle {
            to_step: 7,
            trigger: Trigger::CriticalTemperature
        })
    );
    assert_eq!(cpu.writes().len(), NUM_CORES);
    assert!(cpu.writes().iter().all(|&(_, f)| f == CPU_FREQUENCIES[7]));
    assert_eq!(ctl.core_frequencies(), [CPU_FREQUENCIES[7]; NUM_CORES]);
    assert_eq!(ctl.current_step(), 7);
}

#[test]
fn test_triggers_inside_the_delay_window_do_not_actuate() {
    let cpu = FakeCpu::with([true; NUM_CORES], FULL_SPEED);
    let ctl = controller(cpu.clone());
    ctl.set_management_enabled(true);

    assert!(ctl.tick(&snapshot(85.0, 0.0), 10_000).is_some());
    // critical trigger pushed the window to 12 000 + 3 000
    assert!(ctl.tick(&snapshot(90.0, 200.0), 11_000).is_none());
    assert!(ctl.tick(&snapshot(90.0, 200.0), 14_000).is_none());
    assert!(ctl.tick(&snapshot(90.0, 200.0), 15_000).is_none());
    assert_eq!(cpu.writes().len(), NUM_CORES);

    assert!(ctl.tick(&snapshot(90.0, 200.0), 15_001).is_some());
    assert_eq!(cpu.writes().len(), 2 * NUM_CORES);
    assert_eq!(ctl.current_step(), 6);
}

#[test]
fn test_disabled_controller_never_actuates() {
    let cpu = FakeCpu::with([true; NUM_CORES], FULL_SPEED);
    let ctl = controller(cpu.clone());
    assert!(!ctl.management_enabled());
    assert!(ctl.tick(&snapshot(95.0, 229.0), 10_000).is_none());
    assert!(cpu.writes().is_empty());
}

#[test]
fn test_energy_cooldown_then_recovery_restores_full_speed() {
    let cpu = FakeCpu::with([true; NUM_CORES], FULL_SPEED);
    let ctl = controller(cpu.clone());
    ctl.set_management_enabled(true);

    let d = ctl.tick(&snapshot(60.0, 200.0), 10_000).unwrap();
    assert_eq!(
        d,
        Decision::Throttle {
            to_step: 7,
            trigger: Trigger::PcmEnergy
        }
    );
    assert!(ctl.in_cooldown());

    assert!(ctl.tick(&snapshot(60.0, 100.0), 14_000).is_none());
    assert_eq!(
        ctl.tick(&snapshot(55.0, 10.0), 18_000),
        Some(Decision::Restore { to_step: 8 })
    );
    assert!(!ctl.in_cooldown());
    assert_eq!(ctl.core_frequencies(), [FULL_SPEED; NUM_CORES]);
}

#[test]
fn test_enabling_management_clears_cooldown() {
    let cpu = FakeCpu::with([true; NUM_CORES], FULL_SPEED);
    let ctl = controller(cpu);
    ctl.set_management_enabled(true);
    ctl.tick(&snapshot(60.0, 200.0), 10_000);
    assert!(ctl.in_cooldown());
    ctl.set_management_enabled(false);
    assert!(!ctl.in_cooldown());
}

#[test]
fn test_offline_cores_are_skipped_and_read_zero() {
    let cpu = FakeCpu::with([true, false, true, true], FULL_SPEED);
    let ctl = controller(cpu.clone());
    assert_eq!(ctl.core_frequency(1), Ok(0));
    assert_eq!(ctl.core_frequency(0), Ok(FULL_SPEED));

    assert_eq!(ctl.set_core_frequencies(2), Ok(true));
    let cores: Vec<usize> = cpu.writes().iter().map(|&(c, _)| c).collect();
    assert_eq!(cores, vec![0, 2, 3]);
}

#[test]
fn test_unverified_write_reports_failure() {
    let cpu = FakeCpu::with([true; NUM_CORES], FULL_SPEED);
    cpu.state.lock().ignore_writes = true;
    let ctl = controller(cpu);
    assert_eq!(ctl.set_core_frequency(0, 3), Ok(false));
    assert_eq!(ctl.set_core_frequencies(3), Ok(false));
    assert_eq!(ctl.set_core_active(2, false), Ok(false));
    assert_eq!(ctl.core_frequency(0), Ok(FULL_SPEED));
}

#[test]
fn test_core_activation_is_verified() {
    let cpu = FakeCpu::with([true; NUM_CORES], FULL_SPEED);
    let ctl = controller(cpu);
    assert_eq!(ctl.set_core_active(3, false), Ok(true));
    assert_eq!(ctl.active_cores(), [true, true, true, false]);
    ctl.check_core_frequencies();
    assert_eq!(ctl.core_frequency(3), Ok(0));
}

#[test]
fn test_out_of_range_indices_are_rejected() {
    let cpu = FakeCpu::with([true; NUM_CORES], FULL_SPEED);
    let ctl = controller(cpu.clone());
    assert_eq!(ctl.set_core_frequency(4, 0), Err(TestbedError::InvalidCore(4)));
    assert_eq!(
        ctl.set_core_frequency(0, 9),
        Err(TestbedError::InvalidFrequencyStep(9))
    );
    assert_eq!(ctl.set_core_active(7, true), Err(TestbedError::InvalidCore(7)));
    assert_eq!(ctl.core_frequency(4), Err(TestbedError::InvalidCore(4)));
    assert!(cpu.writes().is_empty());
}

#[test]
fn test_step_floors_at_slowest() {
    let cpu = FakeCpu::with([true; NUM_CORES], CPU_FREQUENCIES[0]);
    let ctl = controller(cpu);
    ctl.set_management_enabled(true);
    assert_eq!(ctl.tick(&snapshot(85.0, 0.0), 10_000).unwrap().to_step(), 0);
}
