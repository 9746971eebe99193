//! Fixed parameters of the quad-core testbed board.

use crate::error::TestbedError;

/// Number of CPU cores on the board.
pub const NUM_CORES: usize = 4;

/// Supported core frequencies in kHz, as cpufreq reports them, lowest first.
pub const CPU_FREQUENCIES: [u32; 9] = [
    384_000, 486_000, 594_000, 702_000, 810_000, 918_000, 1_026_000, 1_134_000, 1_242_000,
];

/// Index of the slowest frequency step.
pub const FREQ_STEP_MIN: usize = 0;
/// Index of the fastest frequency step.
pub const FREQ_STEP_MAX: usize = CPU_FREQUENCIES.len() - 1;

/// Validates a core index.
pub fn check_core(core: usize) -> Result<usize, TestbedError> {
    if core < NUM_CORES {
        Ok(core)
    } else {
        Err(TestbedError::InvalidCore(core))
    }
}

/// Looks up the frequency for a step index.
pub fn frequency_for_step(step: usize) -> Result<u32, TestbedError> {
    CPU_FREQUENCIES
        .get(step)
        .copied()
        .ok_or(TestbedError::InvalidFrequencyStep(step))
}

/// Maps an exact table frequency back to its step index.
pub fn freq_to_index(freq: u32) -> Option<usize> {
    CPU_FREQUENCIES.iter().position(|&f| f == freq)
}

/// Like [`freq_to_index`], falling back to the slowest step for unknown values.
pub fn step_or_min(freq: u32) -> usize {
    freq_to_index(freq).unwrap_or_else(|| {
        tracing::warn!(freq, "frequency not in table, assuming slowest step");
        FREQ_STEP_MIN
    })
}
