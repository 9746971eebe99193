//! Frequency throttling decisions driven by PCM energy and CPU temperature.

use serde::{Deserialize, Serialize};

use crate::testbed::FREQ_STEP_MAX;

/// Thresholds and delays of the throttling policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyParams {
    /// Fraction of PCM capacity above which the policy throttles and enters cooldown.
    pub energy_throttle_fraction: f32,
    /// Fraction of PCM capacity below which cooldown ends and full speed is restored.
    pub energy_recover_fraction: f32,
    /// Mean core temperature in °C above which the policy throttles regardless of cooldown.
    pub critical_temp_c: f32,
    /// Minimum ms between two actuations.
    pub control_delay_ms: i64,
    /// Extra ms added to the delay after a critical-temperature actuation.
    pub critical_extra_delay_ms: i64,
}

impl Default for PolicyParams {
    fn default() -> Self {
        Self {
            energy_throttle_fraction: 0.75,
            energy_recover_fraction: 0.10,
            critical_temp_c: 80.0,
            control_delay_ms: 3_000,
            critical_extra_delay_ms: 2_000,
        }
    }
}

/// What caused a throttle-down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// PCM nearly full.
    PcmEnergy,
    /// CPU above the critical temperature.
    CriticalTemperature,
}

/// An actuation requested by the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Step every active core down to `to_step`.
    Throttle {
        /// Target frequency step.
        to_step: usize,
        /// Condition that fired.
        trigger: Trigger,
    },
    /// PCM has recovered: run every active core at `to_step` again.
    Restore {
        /// Target frequency step.
        to_step: usize,
    },
}

impl Decision {
    /// Target frequency step of the actuation.
    pub fn to_step(&self) -> usize {
        match *self {
            Decision::Throttle { to_step, .. } | Decision::Restore { to_step } => to_step,
        }
    }
}

/// Stateful throttle policy: cooldown flag plus the anti-chatter gate.
#[derive(Debug, Clone)]
pub struct ThrottlePolicy {
    params: PolicyParams,
    energy_max_j: f32,
    cooldown: bool,
    last_actuation_ms: i64,
}

impl ThrottlePolicy {
    /// New policy outside cooldown whose delay window starts at `now_ms`.
    pub fn new(params: PolicyParams, energy_max_j: f32, now_ms: i64) -> Self {
        Self {
            params,
            energy_max_j,
            cooldown: false,
            last_actuation_ms: now_ms,
        }
    }

    /// Leaves cooldown without touching the delay window.
    pub fn clear_cooldown(&mut self) {
        self.cooldown = false;
    }

    /// Restarts the delay window at `now_ms`.
    pub fn stamp(&mut self, now_ms: i64) {
        self.last_actuation_ms = now_ms;
    }

    /// Whether an energy throttle is waiting for the PCM to recover.
    pub fn in_cooldown(&self) -> bool {
        self.cooldown
    }

    /// Epoch ms of the last actuation, including any critical-temperature extension.
    pub fn last_actuation_ms(&self) -> i64 {
        self.last_actuation_ms
    }

    /// Whether the delay since the last actuation has elapsed.
    pub fn ready(&self, now_ms: i64) -> bool {
        now_ms > self.last_actuation_ms + self.params.control_delay_ms
    }

    /// Decides on at most one actuation for this tick.
    ///
    /// `current_step` is the frequency step the cores run at now. The delay
    /// window is restarted whenever a decision is returned, whether or not
    /// the caller manages to apply it.
    pub fn evaluate(
        &mut self,
        now_ms: i64,
        pcm_energy_j: f32,
        cpu_temp_c: f32,
        current_step: usize,
    ) -> Option<Decision> {
        if !self.ready(now_ms) {
            return None;
        }

        let energy_high = !self.cooldown
            && pcm_energy_j > self.params.energy_throttle_fraction * self.energy_max_j;
        let too_hot = cpu_temp_c > self.params.critical_temp_c;

        if energy_high || too_hot {
            if energy_high {
                self.cooldown = true;
            }
            let (trigger, extra) = if too_hot {
                (Trigger::CriticalTemperature, self.params.critical_extra_delay_ms)
            } else {
                (Trigger::PcmEnergy, 0)
            };
            self.last_actuation_ms = now_ms + extra;
            return Some(Decision::Throttle {
                to_step: current_step.saturating_sub(1),
                trigger,
            });
        }

        if self.cooldown
            && pcm_energy_j < self.params.energy_recover_fraction * self.energy_max_j
        {
            self.cooldown = false;
            self.last_actuation_ms = now_ms;
            return Some(Decision::Restore {
                to_step: FREQ_STEP_MAX,
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: f32 = 230.0;

    fn policy() -> ThrottlePolicy {
        ThrottlePolicy::new(PolicyParams::default(), MAX, 0)
    }

    #[test]
    fn critical_temperature_steps_down_once() {
        let mut p = policy();
        assert_eq!(
            p.evaluate(10_000, 0.0, 85.0, 8),
            Some(Decision::Throttle {
                to_step: 7,
                trigger: Trigger::CriticalTemperature
            })
        );
        assert!(!p.in_cooldown());
        assert_eq!(p.last_actuation_ms(), 12_000);
    }

    #[test]
    fn gate_is_strict() {
        let mut p = policy();
        assert_eq!(p.evaluate(3_000, 0.0, 85.0, 8), None);
        assert!(p.evaluate(3_001, 0.0, 85.0, 8).is_some());
    }

    #[test]
    fn energy_trigger_enters_cooldown_and_recovers() {
        let mut p = policy();
        let d = p.evaluate(5_000, 0.8 * MAX, 60.0, 5).unwrap();
        assert_eq!(
            d,
            Decision::Throttle {
                to_step: 4,
                trigger: Trigger::PcmEnergy
            }
        );
        assert!(p.in_cooldown());

        // still in cooldown, energy high: nothing new
        assert_eq!(p.evaluate(9_000, 0.8 * MAX, 60.0, 4), None);
        // energy between the two thresholds: hold
        assert_eq!(p.evaluate(13_000, 0.5 * MAX, 60.0, 4), None);

        assert_eq!(
            p.evaluate(17_000, 0.05 * MAX, 50.0, 4),
            Some(Decision::Restore { to_step: 8 })
        );
        assert!(!p.in_cooldown());
    }

    #[test]
    fn both_triggers_fire_a_single_step() {
        let mut p = policy();
        let d = p.evaluate(5_000, 0.9 * MAX, 90.0, 3).unwrap();
        assert_eq!(d.to_step(), 2);
        assert!(p.in_cooldown());
        assert_eq!(p.last_actuation_ms(), 7_000);
    }

    #[test]
    fn throttle_wins_over_recovery() {
        let mut p = policy();
        p.evaluate(5_000, 0.9 * MAX, 60.0, 3);
        let d = p.evaluate(9_000, 0.0, 85.0, 2).unwrap();
        assert_eq!(d.to_step(), 1);
        assert!(p.in_cooldown());
    }

    #[test]
    fn step_floors_at_slowest() {
        let mut p = policy();
        assert_eq!(p.evaluate(5_000, 0.0, 85.0, 0).unwrap().to_step(), 0);
    }

    #[test]
    fn clearing_cooldown_allows_a_new_energy_trigger() {
        let mut p = policy();
        p.evaluate(5_000, 0.9 * MAX, 60.0, 8);
        p.clear_cooldown();
        assert!(p.evaluate(9_000, 0.9 * MAX, 60.0, 7).is_some());
    }
}
