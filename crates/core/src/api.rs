use serde::{Deserialize, Serialize};

use crate::model::{TemperatureSnapshot, TimeInterval};
use crate::testbed::NUM_CORES;

/// Operator status view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub management_enabled: bool,
    pub recording: bool,
    pub sampler_online: bool,
    pub ambient_c: f32,
    pub snapshot: TemperatureSnapshot,
    pub active_cores: [bool; NUM_CORES],
    pub core_frequencies: [u32; NUM_CORES],
    pub benchmark_workers: usize,
    pub benchmark: TimeInterval,
}

/// Start or stop recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordRequest {
    pub active: bool,
}

/// Start a benchmark run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkStartRequest {
    pub threads: usize,
}

/// Benchmark start response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkStartResponse {
    pub workers: usize,
}

/// Set the ambient temperature outright or nudge it in 0.1 °C steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AmbientRequest {
    Set { celsius: f32 },
    Step { step: i32 },
}

/// Ambient temperature after an update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmbientResponse {
    pub celsius: f32,
}

/// Generic acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
    pub message: Option<String>,
}
