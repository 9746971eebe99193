//! Integration tests for the core crate.

use thermal_core::api::AmbientRequest;
use thermal_core::model::{TemperatureSnapshot, TimeInterval};
use thermal_core::pcm::{fuse, FusionInput, MeltState, PcmEnergy, PcmParams};
use thermal_core::policy::{Decision, PolicyParams, ThrottlePolicy, Trigger};
use thermal_core::thermocouple::{celsius_to_volts, volts_to_celsius};

fn params(energy_max_j: f32) -> PcmParams {
    PcmParams {
        energy_max_j,
        ..PcmParams::default()
    }
}

#[test]
fn test_melt_cycle_scenario() {
    // 50 -> 58 -> 62 -> 50 °C at constant +2 W, 1 s steps
    let mut m = PcmEnergy::new(PcmParams::default());
    let mut trace = Vec::new();
    for t in [50.0, 58.0, 62.0, 50.0] {
        m.update(t, 2.0, 1.0);
        trace.push((m.saturated(), m.unsaturated(), m.state()));
    }
    assert_eq!(trace[0], (0.0, 0.0, MeltState::Solid));
    assert_eq!(trace[1], (2.0, 2.0, MeltState::Solid));
    assert_eq!(trace[2], (4.0, 4.0, MeltState::Solid));
    assert_eq!(trace[3], (0.0, 0.0, MeltState::Solid));
}

#[test]
fn test_latch_and_release() {
    let mut m = PcmEnergy::new(params(3.0));
    m.update(58.0, 2.0, 1.0);
    assert_eq!(m.state(), MeltState::Solid);
    m.update(62.0, 2.0, 1.0);
    assert_eq!(m.state(), MeltState::Melted);
    assert_eq!(m.saturated(), 3.0);

    // above freezing: hold
    m.update(65.0, -10.0, 1.0);
    assert_eq!(m.saturated(), 3.0);
    assert_eq!(m.state(), MeltState::Melted);

    // below freezing: give heat back, dipping under melt does not reset while latched
    m.update(54.0, -1.0, 1.0);
    assert_eq!(m.saturated(), 2.0);
    assert_eq!(m.state(), MeltState::Melted);
    m.update(54.0, 4.0, 1.0);
    assert_eq!(m.saturated(), 3.0);

    m.update(54.0, -5.0, 1.0);
    assert_eq!(m.saturated(), 0.0);
    assert_eq!(m.state(), MeltState::Solid);
}

#[test]
fn test_saturated_energy_stays_bounded() {
    let mut m = PcmEnergy::new(params(50.0));
    // deterministic pseudo-random walk over temperature and power
    let mut x: u32 = 12345;
    for _ in 0..10_000 {
        x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        let t = 40.0 + (x >> 16) as f32 % 40.0;
        x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        let p = ((x >> 16) as f32 % 200.0) - 100.0;
        m.update(t, p, 0.5);
        assert!((0.0..=50.0).contains(&m.saturated()), "{}", m.saturated());
    }
}

#[test]
fn test_fused_snapshot_drives_policy() {
    let mut m = PcmEnergy::new(PcmParams::default());
    let snap: TemperatureSnapshot = fuse(
        &mut m,
        FusionInput {
            timestamp_ms: 1,
            core_temps: [85, 85, 85, 85],
            core_temp_scale: 1.0,
            thermocouple_c: 40.0,
            ambient_c: 22.0,
            dt_s: 0.5,
        },
    );
    assert_eq!(snap.pcm_energy_j, 0.0);

    let mut policy = ThrottlePolicy::new(PolicyParams::default(), 230.0, 0);
    let d = policy.evaluate(10_000, snap.pcm_energy_j, snap.cpu_temp_c, 8);
    assert_eq!(
        d,
        Some(Decision::Throttle {
            to_step: 7,
            trigger: Trigger::CriticalTemperature
        })
    );
}

#[test]
fn test_thermocouple_reference_points() {
    for c in [0.0f32, 25.0, 55.0, 60.0, 399.0] {
        let v = celsius_to_volts(c).unwrap();
        assert!((volts_to_celsius(v).unwrap() - c).abs() < 1e-3);
    }
}

#[test]
fn test_interval_serde() {
    let t = TimeInterval::new(1, 2);
    let s = serde_json::to_string(&t).unwrap();
    assert_eq!(s, r#"{"start_ms":1,"stop_ms":2}"#);
    let back: TimeInterval = serde_json::from_str(&s).unwrap();
    assert_eq!(back, t);
}

#[test]
fn test_ambient_request_forms() {
    let set: AmbientRequest = serde_json::from_str(r#"{"celsius":23.5}"#).unwrap();
    assert_eq!(set, AmbientRequest::Set { celsius: 23.5 });
    let step: AmbientRequest = serde_json::from_str(r#"{"step":-1}"#).unwrap();
    assert_eq!(step, AmbientRequest::Step { step: -1 });
}
