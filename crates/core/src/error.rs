//! Error types shared by the profiler crates.

use thiserror::Error;

/// Thermocouple conversion failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    /// Input voltage is below the calibration table.
    #[error("voltage {0} V below calibration range")]
    VoltageBelowMin(f32),
    /// Input voltage is above the calibration table.
    #[error("voltage {0} V above calibration range")]
    VoltageAboveMax(f32),
    /// Input temperature is below the calibration table.
    #[error("temperature {0} °C below calibration range")]
    TemperatureBelowMin(f32),
    /// Input temperature is above the calibration table.
    #[error("temperature {0} °C above calibration range")]
    TemperatureAboveMax(f32),
    /// NaN or infinite input.
    #[error("non-finite input")]
    NotFinite,
}

/// Out-of-range testbed indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TestbedError {
    #[error("core index {0} out of range")]
    InvalidCore(usize),
    #[error("frequency step {0} out of range")]
    InvalidFrequencyStep(usize),
}

/// Reasons a multimeter word yields no reading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("no complete frame in word")]
    NoFrame,
    #[error("frame has an empty payload")]
    EmptyPayload,
    #[error("frame payload is not text")]
    NotUtf8,
    #[error("frame payload {0:?} is not a number")]
    BadNumber(String),
}
