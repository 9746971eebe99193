//! Lumped thermal model of the phase-change material (PCM) heat sink.
//!
//! Heat flows from the silicon into the PCM through `r_si` and from the PCM
//! into the air through `r_pcm`. While the PCM sits at or above its melting
//! point, the difference between the two flows goes into latent heat, which
//! two accumulators integrate: an unbounded one, and a saturating one that
//! latches at full melt and only releases once the PCM has frozen back.

use serde::{Deserialize, Serialize};

use crate::model::TemperatureSnapshot;
use crate::testbed::NUM_CORES;

/// Smallest temperature difference fed into the resistance fits.
pub const MIN_DELTA_T: f32 = 0.3;

/// Physical constants of the PCM.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcmParams {
    /// °C at which the PCM starts to melt.
    pub melt_temp_c: f32,
    /// °C below which melted PCM starts to give its latent heat back.
    pub freeze_temp_c: f32,
    /// Latent heat capacity of the full PCM mass.
    pub energy_max_j: f32,
}

impl Default for PcmParams {
    fn default() -> Self {
        Self {
            melt_temp_c: 55.0,
            freeze_temp_c: 60.0,
            energy_max_j: 230.0,
        }
    }
}

/// Empirical silicon-to-PCM and PCM-to-air resistances, in that order.
pub fn thermal_resistances(t_cpu: f32, t_pcm: f32, t_air: f32) -> (f32, f32) {
    let dt_si = (t_cpu - t_pcm).abs().max(MIN_DELTA_T);
    let dt_pcm = (t_pcm - t_air).abs().max(MIN_DELTA_T);
    (0.35 * dt_si.ln() + 0.54, 0.0436 * dt_pcm.ln() + 12.221)
}

/// Heat flowing into the PCM minus heat flowing out of it.
pub fn net_power(t_cpu: f32, t_pcm: f32, t_air: f32, r_si: f32, r_pcm: f32) -> f32 {
    (t_cpu - t_pcm) / r_si - (t_pcm - t_air) / r_pcm
}

/// Melt state of the saturating accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeltState {
    /// Still absorbing latent heat.
    Solid,
    /// Latched at capacity until the PCM freezes back.
    Melted,
}

/// The two latent-heat accumulators.
#[derive(Debug, Clone)]
pub struct PcmEnergy {
    params: PcmParams,
    unsaturated: f32,
    saturated: f32,
    state: MeltState,
}

impl PcmEnergy {
    /// Starts with both accumulators empty and the PCM solid.
    pub fn new(params: PcmParams) -> Self {
        Self {
            params,
            unsaturated: 0.0,
            saturated: 0.0,
            state: MeltState::Solid,
        }
    }

    /// Integrates `net_power_w` over `dt_s` seconds at PCM temperature `t_pcm`.
    pub fn update(&mut self, t_pcm: f32, net_power_w: f32, dt_s: f32) {
        let mut delta = net_power_w * dt_s;
        if !delta.is_finite() {
            tracing::warn!(net_power_w, dt_s, "non-finite energy increment, skipping");
            delta = 0.0;
        }
        let p = self.params;

        self.unsaturated = if t_pcm < p.melt_temp_c {
            0.0
        } else {
            self.unsaturated + delta
        };

        match self.state {
            MeltState::Solid if t_pcm < p.melt_temp_c => self.saturated = 0.0,
            MeltState::Solid => {
                self.saturated = (self.saturated + delta).clamp(0.0, p.energy_max_j);
                if self.saturated >= p.energy_max_j {
                    self.state = MeltState::Melted;
                }
            }
            MeltState::Melted if t_pcm < p.freeze_temp_c => {
                let next = self.saturated + delta;
                if next < 0.0 {
                    self.saturated = 0.0;
                    self.state = MeltState::Solid;
                } else {
                    self.saturated = next.min(p.energy_max_j);
                }
            }
            // fully liquid above the freezing point: hold
            MeltState::Melted => {}
        }
    }

    /// Saturating accumulator, always within `[0, energy_max_j]`.
    pub fn saturated(&self) -> f32 {
        self.saturated
    }

    /// Unbounded accumulator.
    pub fn unsaturated(&self) -> f32 {
        self.unsaturated
    }

    /// Current melt state.
    pub fn state(&self) -> MeltState {
        self.state
    }

    /// Model parameters.
    pub fn params(&self) -> &PcmParams {
        &self.params
    }
}

/// Raw inputs for one fusion step.
#[derive(Debug, Clone, Copy)]
pub struct FusionInput {
    /// Epoch ms of the sample.
    pub timestamp_ms: i64,
    /// Raw core sensor readings.
    pub core_temps: [i16; NUM_CORES],
    /// Divisor turning raw core readings into °C.
    pub core_temp_scale: f32,
    /// Thermocouple temperature in °C, ambient compensated.
    pub thermocouple_c: f32,
    /// Ambient temperature in °C.
    pub ambient_c: f32,
    /// Seconds since the previous step.
    pub dt_s: f32,
}

/// Mean core temperature in °C.
pub fn mean_core_temp(core_temps: &[i16; NUM_CORES], scale: f32) -> f32 {
    let sum: f32 = core_temps.iter().map(|&t| f32::from(t)).sum();
    let scale = if scale > 0.0 { scale } else { 1.0 };
    sum / NUM_CORES as f32 / scale
}

/// Advances the PCM model by one step and returns the fused snapshot.
pub fn fuse(model: &mut PcmEnergy, input: FusionInput) -> TemperatureSnapshot {
    let t_cpu = mean_core_temp(&input.core_temps, input.core_temp_scale);
    let t_pcm = input.thermocouple_c;
    let t_air = input.ambient_c;

    let (r_si, r_pcm) = thermal_resistances(t_cpu, t_pcm, t_air);
    let power = net_power(t_cpu, t_pcm, t_air, r_si, r_pcm);
    model.update(t_pcm, power, input.dt_s);

    TemperatureSnapshot {
        timestamp_ms: input.timestamp_ms,
        core_temps: input.core_temps,
        cpu_temp_c: t_cpu,
        thermocouple_c: t_pcm,
        ambient_c: t_air,
        pcm_energy_j: model.saturated(),
        pcm_energy_raw_j: model.unsaturated(),
        pcm_melted: model.state() == MeltState::Melted,
        r_si,
        r_pcm,
    }
}
