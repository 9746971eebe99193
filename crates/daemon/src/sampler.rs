//! Serial frame sampler: periodically reads one word from the multimeter and
//! publishes the voltage it carries.
//!
//! The sampler owns the device exclusively. It does not retry on device
//! errors: it marks itself down and exits, and the recorder asks for a
//! restart on its next tick.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thermal_core::error::FrameError;
use thermal_core::frame;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::SamplerConfig;
use crate::handoff::LatestCell;
use crate::serial::{FrameSource, PortOpener};

/// Sampler outcomes other than a fresh reading.
#[derive(Debug, Error)]
pub enum SamplerError {
    /// The device is not open; a restart has to be requested.
    #[error("sampler is not running")]
    Unavailable,
    #[error("serial i/o: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("sampler cancelled")]
    Cancelled,
}

/// Anything that can hand the recorder a thermocouple voltage.
pub trait VoltageSource: Send + Sync {
    /// Latest published voltage, or why there is none.
    fn voltage(&self) -> Result<f32, SamplerError>;
    /// Best-effort request to bring the source back after [`SamplerError::Unavailable`].
    fn request_restart(&self);
}

/// Reads chunks until `word` is full.
pub fn read_word(
    src: &mut dyn FrameSource,
    word: &mut [u8],
    chunk_len: usize,
    cancel: &CancellationToken,
) -> Result<(), SamplerError> {
    let chunk_len = chunk_len.max(1);
    let mut filled = 0;
    while filled < word.len() {
        if cancel.is_cancelled() {
            return Err(SamplerError::Cancelled);
        }
        let end = (filled + chunk_len).min(word.len());
        filled += src.read_chunk(&mut word[filled..end])?;
    }
    Ok(())
}

/// Reads one word, purges the line, and parses the reading.
///
/// Device errors come back as [`SamplerError::Io`]; an unusable word as [`SamplerError::Frame`].
pub fn sample_once(
    src: &mut dyn FrameSource,
    cfg: &SamplerConfig,
    cancel: &CancellationToken,
) -> Result<f32, SamplerError> {
    let mut word = vec![0u8; cfg.word_len];
    read_word(src, &mut word, cfg.chunk_len, cancel)?;
    src.purge()?;
    Ok(frame::parse_word(&word)?)
}

struct Inner {
    cfg: SamplerConfig,
    opener: Arc<dyn PortOpener>,
    latest: LatestCell<f32>,
    online: Mutex<bool>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Handle on the sampling loop. Clones share the same loop.
#[derive(Clone)]
pub struct SerialSampler {
    inner: Arc<Inner>,
}

impl SerialSampler {
    pub fn new(cfg: SamplerConfig, opener: Arc<dyn PortOpener>, cancel: CancellationToken) -> Self {
        Self {
            inner: Arc::new(Inner {
                cfg,
                opener,
                latest: LatestCell::new(0.0),
                online: Mutex::new(false),
                cancel,
                task: Mutex::new(None),
            }),
        }
    }

    /// Spawns the loop unless one is already running or the sampler was terminated.
    pub fn start(&self) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        let mut task = self.inner.task.lock();
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        // mark up front so the recorder does not request a second start meanwhile
        *self.inner.online.lock() = true;
        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(run(inner)));
    }

    /// Whether the loop currently holds an open device.
    pub fn is_online(&self) -> bool {
        *self.inner.online.lock()
    }

    /// Stops the loop after its current word.
    pub fn terminate(&self) {
        self.inner.cancel.cancel();
    }

    /// Waits for the loop to exit.
    pub async fn join(&self) {
        let handle = self.inner.task.lock().take();
        if let Some(h) = handle {
            if let Err(e) = h.await {
                tracing::warn!(error = %e, "sampler task did not finish cleanly");
            }
        }
    }
}

impl VoltageSource for SerialSampler {
    fn voltage(&self) -> Result<f32, SamplerError> {
        if self.is_online() {
            Ok(self.inner.latest.latest())
        } else {
            Err(SamplerError::Unavailable)
        }
    }

    fn request_restart(&self) {
        tracing::info!("sampler restart requested");
        self.start();
    }
}

async fn run(inner: Arc<Inner>) {
    let opener = Arc::clone(&inner.opener);
    let mut source = match tokio::task::spawn_blocking(move || opener.open()).await {
        Ok(Ok(source)) => source,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "sampler could not open device");
            *inner.online.lock() = false;
            return;
        }
        Err(e) => {
            tracing::error!(error = %e, "sampler open task failed");
            *inner.online.lock() = false;
            return;
        }
    };
    tracing::info!("sampler started");

    let mut tick = tokio::time::interval(Duration::from_millis(inner.cfg.period_ms));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = inner.cancel.cancelled() => break,
            _ = tick.tick() => {}
        }

        let cfg = inner.cfg.clone();
        let cancel = inner.cancel.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let res = sample_once(source.as_mut(), &cfg, &cancel);
            (source, res)
        })
        .await;

        let (returned, res) = match joined {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "sampler read task failed");
                break;
            }
        };
        source = returned;

        match res {
            Ok(volts) => {
                inner.latest.publish(volts);
                tracing::debug!(volts, "thermocouple sample");
            }
            Err(SamplerError::Frame(e)) => {
                tracing::debug!(error = %e, "no reading in word, keeping previous sample");
            }
            Err(SamplerError::Cancelled) => break,
            Err(e) => {
                tracing::warn!(error = %e, "serial device failed, sampler stopping");
                break;
            }
        }
    }

    *inner.online.lock() = false;
    tracing::info!("sampler stopped");
}
