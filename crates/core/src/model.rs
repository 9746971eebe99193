use serde::{Deserialize, Serialize};

use crate::testbed::NUM_CORES;

/// Start and stop of a benchmark run in epoch milliseconds.
///
/// A zero field means that edge was not observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInterval {
    /// Epoch ms of the start edge, 0 if unset.
    pub start_ms: i64,
    /// Epoch ms of the stop edge, 0 if unset.
    pub stop_ms: i64,
}

impl TimeInterval {
    /// Interval with neither edge observed.
    pub const UNSET: Self = Self {
        start_ms: 0,
        stop_ms: 0,
    };

    /// Builds an interval from both edges.
    pub fn new(start_ms: i64, stop_ms: i64) -> Self {
        Self { start_ms, stop_ms }
    }

    /// True when both edges were observed.
    pub fn is_complete(&self) -> bool {
        self.start_ms != 0 && self.stop_ms != 0
    }

    /// Elapsed seconds for a complete interval, 0 otherwise.
    pub fn elapsed_secs(&self) -> f64 {
        if self.is_complete() {
            (self.stop_ms - self.start_ms) as f64 / 1000.0
        } else {
            0.0
        }
    }

    /// Merges per-worker intervals into one spanning the earliest start and the latest stop.
    ///
    /// Unset fields are ignored.
    pub fn coalesce<'a>(intervals: impl IntoIterator<Item = &'a TimeInterval>) -> TimeInterval {
        intervals
            .into_iter()
            .fold(TimeInterval::UNSET, |acc, t| TimeInterval {
                start_ms: match (acc.start_ms, t.start_ms) {
                    (0, s) | (s, 0) => s,
                    (a, b) => a.min(b),
                },
                stop_ms: acc.stop_ms.max(t.stop_ms),
            })
    }
}

/// One fused sample of every temperature source plus the derived PCM state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TemperatureSnapshot {
    /// Epoch ms at which the sample was fused.
    pub timestamp_ms: i64,
    /// Raw core sensor readings in sensor-file units.
    pub core_temps: [i16; NUM_CORES],
    /// Mean of the core readings in °C.
    pub cpu_temp_c: f32,
    /// Thermocouple (PCM) temperature in °C, ambient compensated. 0 if conversion failed.
    pub thermocouple_c: f32,
    /// Ambient air temperature in °C.
    pub ambient_c: f32,
    /// Latent energy stored in the PCM, clamped to `[0, energy_max]`.
    pub pcm_energy_j: f32,
    /// Unclamped running integral of net power since the PCM last crossed the melting point.
    pub pcm_energy_raw_j: f32,
    /// Whether the saturating model considers the PCM fully melted.
    pub pcm_melted: bool,
    /// Silicon-to-PCM thermal resistance.
    pub r_si: f32,
    /// PCM-to-air thermal resistance.
    pub r_pcm: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalesce_ignores_unset_slots() {
        let slots = [
            TimeInterval::UNSET,
            TimeInterval::new(2_000, 9_000),
            TimeInterval::new(1_500, 0),
            TimeInterval::new(1_800, 9_500),
        ];
        assert_eq!(
            TimeInterval::coalesce(&slots),
            TimeInterval::new(1_500, 9_500)
        );
    }

    #[test]
    fn coalesce_of_nothing_is_unset() {
        assert_eq!(TimeInterval::coalesce(&[]), TimeInterval::UNSET);
        assert!(!TimeInterval::UNSET.is_complete());
        assert_eq!(TimeInterval::UNSET.elapsed_secs(), 0.0);
    }

    #[test]
    fn elapsed_uses_both_edges() {
        assert_eq!(TimeInterval::new(1_000, 3_500).elapsed_secs(), 2.5);
    }
}
