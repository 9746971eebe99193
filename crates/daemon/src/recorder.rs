//! Sensor fusion recorder.
//!
//! Every period it reads the core temperature files and the latest
//! thermocouple voltage, advances the PCM energy model, publishes the fused
//! snapshot for the control loop, and buffers snapshots while recording is
//! on. Turning recording off writes the buffer to the record file.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use thermal_core::model::{TemperatureSnapshot, TimeInterval};
use thermal_core::now_ms;
use thermal_core::pcm::{fuse, FusionInput, PcmEnergy, PcmParams};
use thermal_core::record;
use thermal_core::thermocouple::volts_to_celsius;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::RecorderConfig;
use crate::handoff::LatestCell;
use crate::sampler::VoltageSource;
use crate::sysfs::CoreTemperatureFiles;

#[derive(Debug)]
struct Controls {
    record: bool,
    ambient_c: f32,
    benchmark: TimeInterval,
}

/// Shared side of the recorder: operator controls and the published snapshot.
pub struct SensorRecorder {
    cfg: RecorderConfig,
    pcm: PcmParams,
    record_path: PathBuf,
    controls: Mutex<Controls>,
    snapshot: LatestCell<TemperatureSnapshot>,
    cancel: CancellationToken,
}

impl SensorRecorder {
    pub fn new(
        cfg: RecorderConfig,
        pcm: PcmParams,
        record_path: PathBuf,
        ambient_c: f32,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            cfg,
            pcm,
            record_path,
            controls: Mutex::new(Controls {
                record: false,
                ambient_c,
                benchmark: TimeInterval::UNSET,
            }),
            snapshot: LatestCell::new(TemperatureSnapshot::default()),
            cancel,
        }
    }

    pub fn set_record_state(&self, record: bool) {
        self.controls.lock().record = record;
    }

    pub fn record_state(&self) -> bool {
        self.controls.lock().record
    }

    pub fn set_ambient_temperature(&self, celsius: f32) {
        self.controls.lock().ambient_c = celsius;
    }

    pub fn ambient_temperature(&self) -> f32 {
        self.controls.lock().ambient_c
    }

    /// Benchmark interval written into the header of the next flushed record.
    pub fn set_benchmark_time(&self, interval: TimeInterval) {
        self.controls.lock().benchmark = interval;
    }

    pub fn benchmark_time(&self) -> TimeInterval {
        self.controls.lock().benchmark
    }

    /// Latest completed snapshot.
    pub fn current_snapshot(&self) -> TemperatureSnapshot {
        self.snapshot.latest()
    }

    /// Handle on the snapshot slot, for the control loop.
    pub fn snapshots(&self) -> LatestCell<TemperatureSnapshot> {
        self.snapshot.clone()
    }

    pub fn record_path(&self) -> &Path {
        &self.record_path
    }

    /// Stops the loop at its next tick.
    pub fn terminate(&self) {
        self.cancel.cancel();
    }

    fn controls(&self) -> (bool, f32, TimeInterval) {
        let c = self.controls.lock();
        (c.record, c.ambient_c, c.benchmark)
    }
}

/// State owned by the running loop.
pub struct RecorderLoop {
    shared: Arc<SensorRecorder>,
    sensors: CoreTemperatureFiles,
    voltage: Arc<dyn VoltageSource>,
    model: PcmEnergy,
    buffer: Vec<TemperatureSnapshot>,
    was_recording: bool,
}

impl RecorderLoop {
    pub fn new(
        shared: Arc<SensorRecorder>,
        sensors: CoreTemperatureFiles,
        voltage: Arc<dyn VoltageSource>,
    ) -> Self {
        let model = PcmEnergy::new(shared.pcm);
        Self {
            shared,
            sensors,
            voltage,
            model,
            buffer: Vec::new(),
            was_recording: false,
        }
    }

    /// Snapshots buffered by the current recording.
    pub fn buffered(&self) -> &[TemperatureSnapshot] {
        &self.buffer
    }

    /// One fusion step, `dt_s` seconds after the previous one.
    pub fn tick(&mut self, now_ms: i64, dt_s: f32) -> TemperatureSnapshot {
        let (record, ambient_c, benchmark) = self.shared.controls();

        if record && !self.was_recording {
            tracing::info!("recording started");
            self.buffer.clear();
        } else if !record && self.was_recording {
            tracing::info!(records = self.buffer.len(), "recording stopped");
            self.flush(&benchmark);
        }
        self.was_recording = record;

        let volts = match self.voltage.voltage() {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "no thermocouple voltage");
                self.voltage.request_restart();
                0.0
            }
        };

        let core_temps = self.sensors.read_all();

        let thermocouple_c = match volts_to_celsius(volts) {
            Ok(c) => c + ambient_c,
            Err(e) => {
                tracing::warn!(volts, error = %e, "thermocouple conversion failed");
                0.0
            }
        };

        let snap = fuse(
            &mut self.model,
            FusionInput {
                timestamp_ms: now_ms,
                core_temps,
                core_temp_scale: self.shared.cfg.core_temp_scale,
                thermocouple_c,
                ambient_c,
                dt_s,
            },
        );
        tracing::debug!(
            t_cpu = snap.cpu_temp_c,
            t_pcm = snap.thermocouple_c,
            e_pcm = snap.pcm_energy_raw_j,
            e_pcm_sat = snap.pcm_energy_j,
            r_si = snap.r_si,
            r_pcm = snap.r_pcm,
            "fused sample"
        );

        if record {
            self.buffer.push(snap);
        }
        self.shared.snapshot.publish(snap);
        snap
    }

    /// Flushes a recording still in progress.
    pub fn finish(&mut self) {
        if self.was_recording {
            let benchmark = self.shared.benchmark_time();
            tracing::info!(records = self.buffer.len(), "flushing recording on exit");
            self.flush(&benchmark);
            self.was_recording = false;
        }
    }

    fn flush(&self, benchmark: &TimeInterval) {
        if let Err(e) = write_record_file(&self.shared.record_path, benchmark, &self.buffer) {
            tracing::warn!(error = %e, "record export failed");
        }
    }
}

fn write_record_file(
    path: &Path,
    benchmark: &TimeInterval,
    records: &[TemperatureSnapshot],
) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut w = BufWriter::new(file);
    record::write_records(&mut w, benchmark, records)
        .with_context(|| format!("write {}", path.display()))?;
    tracing::info!(path = %path.display(), records = records.len(), "record written");
    Ok(())
}

/// Spawns the fusion loop. Failing to open the core temperature files ends the loop at once.
pub fn spawn_recorder(
    recorder: Arc<SensorRecorder>,
    voltage: Arc<dyn VoltageSource>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let paths = recorder.cfg.core_temp_paths.clone();
        let opened =
            tokio::task::spawn_blocking(move || CoreTemperatureFiles::open(&paths)).await;
        let sensors = match opened {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "recorder cannot open core temperature files");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "recorder open task failed");
                return;
            }
        };
        let cancel = recorder.cancel.clone();
        let period = Duration::from_millis(recorder.cfg.period_ms);
        let mut state = RecorderLoop::new(recorder, sensors, voltage);

        tracing::info!(period_ms = period.as_millis() as u64, "recorder started");
        let mut tick = tokio::time::interval(period);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last = Instant::now();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {}
            }
            let now = Instant::now();
            let dt = now.duration_since(last).as_secs_f32();
            last = now;
            let stamp = now_ms();
            // Sysfs reads and the record export block, so the step runs off the runtime.
            let stepped = tokio::task::spawn_blocking(move || {
                state.tick(stamp, dt);
                state
            })
            .await;
            state = match stepped {
                Ok(returned) => returned,
                Err(e) => {
                    tracing::error!(error = %e, "recorder tick failed");
                    return;
                }
            };
        }

        if let Err(e) = tokio::task::spawn_blocking(move || state.finish()).await {
            tracing::warn!(error = %e, "recording flush on exit failed");
        }
        tracing::info!("recorder stopped");
    })
}
