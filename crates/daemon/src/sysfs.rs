//! Linux pseudo-file access for core temperatures, hotplug and cpufreq.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thermal_core::testbed::NUM_CORES;

use crate::config::{core_path, ControlConfig};

/// Per-core CPU knobs. Implemented over sysfs in production and by fakes in tests.
pub trait CpuInterface: Send + Sync {
    /// Whether the core is online.
    fn read_online(&self, core: usize) -> io::Result<bool>;
    /// Brings the core on- or offline.
    fn write_online(&self, core: usize, online: bool) -> io::Result<()>;
    /// Current frequency in kHz.
    fn read_frequency(&self, core: usize) -> io::Result<u32>;
    /// Requests a frequency in kHz.
    fn write_frequency(&self, core: usize, freq: u32) -> io::Result<()>;
}

/// [`CpuInterface`] over sysfs path templates.
#[derive(Debug, Clone)]
pub struct SysfsCpu {
    online: String,
    set_frequency: String,
    get_frequency: String,
}

impl SysfsCpu {
    pub fn new(online: &str, set_frequency: &str, get_frequency: &str) -> Self {
        Self {
            online: online.to_string(),
            set_frequency: set_frequency.to_string(),
            get_frequency: get_frequency.to_string(),
        }
    }

    pub fn from_config(cfg: &ControlConfig) -> Self {
        Self::new(
            &cfg.online_path,
            &cfg.set_frequency_path,
            &cfg.get_frequency_path,
        )
    }
}

fn read_trimmed(path: &Path) -> io::Result<String> {
    Ok(std::fs::read_to_string(path)?.trim().to_string())
}

fn invalid_data(path: &Path, value: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("{}: unexpected value {value:?}", path.display()),
    )
}

impl CpuInterface for SysfsCpu {
    fn read_online(&self, core: usize) -> io::Result<bool> {
        let path = core_path(&self.online, core);
        let s = read_trimmed(&path)?;
        let v: i64 = s.parse().map_err(|_| invalid_data(&path, &s))?;
        Ok(v > 0)
    }

    fn write_online(&self, core: usize, online: bool) -> io::Result<()> {
        std::fs::write(core_path(&self.online, core), if online { "1" } else { "0" })
    }

    fn read_frequency(&self, core: usize) -> io::Result<u32> {
        let path = core_path(&self.get_frequency, core);
        let s = read_trimmed(&path)?;
        s.parse().map_err(|_| invalid_data(&path, &s))
    }

    fn write_frequency(&self, core: usize, freq: u32) -> io::Result<()> {
        std::fs::write(core_path(&self.set_frequency, core), freq.to_string())
    }
}

/// Open handles on the per-core temperature files, held for the recorder's lifetime.
#[derive(Debug)]
pub struct CoreTemperatureFiles {
    files: Vec<(PathBuf, File)>,
}

impl CoreTemperatureFiles {
    /// Opens every file; any failure is fatal to the caller.
    pub fn open(paths: &[PathBuf]) -> Result<Self> {
        if paths.len() != NUM_CORES {
            anyhow::bail!(
                "expected {NUM_CORES} core temperature files, got {}",
                paths.len()
            );
        }
        let files = paths
            .iter()
            .map(|p| {
                File::open(p)
                    .map(|f| (p.clone(), f))
                    .with_context(|| format!("open {}", p.display()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { files })
    }

    /// Reads one core. The handle is rewound afterwards so the next read sees fresh contents.
    pub fn read(&mut self, core: usize) -> io::Result<i16> {
        let (path, file) = self
            .files
            .get_mut(core)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no core {core}")))?;
        let mut s = String::new();
        let res = file.read_to_string(&mut s);
        file.seek(SeekFrom::Start(0))?;
        res?;
        let s = s.trim();
        s.parse().map_err(|_| invalid_data(path, s))
    }

    /// Reads every core; a failed read logs and yields 0 for that core.
    pub fn read_all(&mut self) -> [i16; NUM_CORES] {
        let mut temps = [0; NUM_CORES];
        for (core, t) in temps.iter_mut().enumerate() {
            match self.read(core) {
                Ok(v) => *t = v,
                Err(e) => tracing::warn!(core, error = %e, "core temperature read failed"),
            }
        }
        temps
    }
}
