//! Daemon configuration: defaults, optional TOML overlay, CLI overrides.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use thermal_bench::BenchConfig;
use thermal_core::pcm::PcmParams;
use thermal_core::policy::PolicyParams;

/// Placeholder replaced by the core index in sysfs path templates.
pub const CORE_PLACEHOLDER: &str = "{core}";

/// Whole-daemon configuration, built once at startup.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// HTTP listen address.
    pub listen: String,
    /// Directory holding the record and ambient files.
    pub data_dir: PathBuf,
    pub sampler: SamplerConfig,
    pub recorder: RecorderConfig,
    pub pcm: PcmParams,
    pub control: ControlConfig,
    pub benchmark: BenchConfig,
    pub ambient: AmbientConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:7788".to_string(),
            data_dir: PathBuf::from(".thermal"),
            sampler: SamplerConfig::default(),
            recorder: RecorderConfig::default(),
            pcm: PcmParams::default(),
            control: ControlConfig::default(),
            benchmark: BenchConfig::default(),
            ambient: AmbientConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Reads a TOML file; missing keys keep their defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: DaemonConfig =
            toml::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
        cfg.validate()
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(cfg)
    }

    /// Rejects values the loops cannot run with.
    pub fn validate(&self) -> Result<()> {
        let periods = [
            ("sampler.period_ms", self.sampler.period_ms),
            ("recorder.period_ms", self.recorder.period_ms),
            ("control.period_ms", self.control.period_ms),
        ];
        for (key, ms) in periods {
            if ms == 0 {
                bail!("{key} must be greater than zero");
            }
        }
        if self.sampler.chunk_len == 0 {
            bail!("sampler.chunk_len must be greater than zero");
        }
        Ok(())
    }

    /// Where a finished recording is written.
    pub fn record_path(&self) -> PathBuf {
        self.data_dir.join(&self.recorder.record_file)
    }

    /// Where the ambient temperature is persisted.
    pub fn ambient_path(&self) -> PathBuf {
        self.data_dir.join(&self.ambient.file)
    }
}

/// Multimeter serial line.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Bytes per sampled word.
    pub word_len: usize,
    /// Bytes requested per read.
    pub chunk_len: usize,
    pub chunk_timeout_ms: u64,
    pub period_ms: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 19_200,
            word_len: thermal_core::frame::WORD_LEN,
            chunk_len: 8,
            chunk_timeout_ms: 100,
            period_ms: 1_000,
        }
    }
}

/// Sensor fusion loop.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub period_ms: u64,
    /// One temperature file per core, in core order.
    pub core_temp_paths: Vec<PathBuf>,
    /// Divisor turning raw core readings into °C.
    pub core_temp_scale: f32,
    /// Record file name inside the data directory.
    pub record_file: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            period_ms: 500,
            core_temp_paths: (7..=10)
                .map(|zone| PathBuf::from(format!("/sys/class/thermal/thermal_zone{zone}/temp")))
                .collect(),
            core_temp_scale: 1.0,
            record_file: "stat.csv".to_string(),
        }
    }
}

/// Thermal control loop and its sysfs knobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Whether starting a benchmark switches thermal management on.
    pub enabled: bool,
    pub period_ms: u64,
    /// Delay before the first tick, so the recorder has published a snapshot.
    pub startup_delay_ms: u64,
    pub policy: PolicyParams,
    pub online_path: String,
    pub set_frequency_path: String,
    pub get_frequency_path: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            period_ms: 1_000,
            startup_delay_ms: 1_100,
            policy: PolicyParams::default(),
            online_path: "/sys/devices/system/cpu/cpu{core}/online".to_string(),
            set_frequency_path: "/sys/devices/system/cpu/cpu{core}/cpufreq/scaling_setspeed"
                .to_string(),
            get_frequency_path: "/sys/devices/system/cpu/cpu{core}/cpufreq/scaling_cur_freq"
                .to_string(),
        }
    }
}

/// Ambient temperature persistence.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbientConfig {
    pub file: String,
    pub default_c: f32,
}

impl Default for AmbientConfig {
    fn default() -> Self {
        Self {
            file: "ambient.txt".to_string(),
            default_c: 22.0,
        }
    }
}

/// Expands a `{core}` path template.
pub fn core_path(template: &str, core: usize) -> PathBuf {
    PathBuf::from(template.replace(CORE_PLACEHOLDER, &core.to_string()))
}
