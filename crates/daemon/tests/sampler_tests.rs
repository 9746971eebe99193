//! Serial sampler over scripted byte sources.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thermal_core::error::FrameError;
use thermal_core::frame::WORD_LEN;
use thermal_daemon::config::SamplerConfig;
use thermal_daemon::sampler::{read_word, sample_once, SamplerError, SerialSampler, VoltageSource};
use thermal_daemon::serial::{FrameSource, PortOpener};
use tokio_util::sync::CancellationToken;

/// Hands out queued bytes; once empty, either times out forever or fails.
struct ScriptedSource {
    bytes: VecDeque<u8>,
    fail_when_empty: bool,
    reads: Arc<AtomicUsize>,
    purges: Arc<AtomicUsize>,
}

impl ScriptedSource {
    fn new(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.iter().copied().collect(),
            fail_when_empty: false,
            reads: Arc::default(),
            purges: Arc::default(),
        }
    }
}

impl FrameSource for ScriptedSource {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.bytes.is_empty() && self.fail_when_empty {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"));
        }
        let n = buf.len().min(self.bytes.len());
        for b in buf.iter_mut().take(n) {
            *b = self.bytes.pop_front().unwrap_or_default();
        }
        Ok(n)
    }

    fn purge(&mut self) -> io::Result<()> {
        self.purges.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Repeats one word forever.
struct LoopingSource {
    word: Vec<u8>,
    pos: usize,
}

impl FrameSource for LoopingSource {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        for b in buf.iter_mut() {
            *b = self.word[self.pos];
            self.pos = (self.pos + 1) % self.word.len();
        }
        Ok(buf.len())
    }

    fn purge(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct FnOpener<F> {
    open: F,
    calls: AtomicUsize,
}

impl<F> PortOpener for FnOpener<F>
where
    F: Fn() -> anyhow::Result<Box<dyn FrameSource>> + Send + Sync,
{
    fn open(&self) -> anyhow::Result<Box<dyn FrameSource>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.open)()
    }
}

fn framed(reading: &str) -> Vec<u8> {
    let mut w = b"~~".to_vec();
    w.push(b'\n');
    w.extend_from_slice(reading.as_bytes());
    w.push(b'\r');
    w.resize(WORD_LEN, b' ');
    w
}

fn fast_config() -> SamplerConfig {
    SamplerConfig {
        period_ms: 5,
        ..SamplerConfig::default()
    }
}

#[test]
fn test_word_is_filled_in_chunks() {
    let data: Vec<u8> = (0..WORD_LEN as u8).collect();
    let mut src = ScriptedSource::new(&data);
    let reads = src.reads.clone();
    let mut word = vec![0u8; WORD_LEN];
    read_word(&mut src, &mut word, 8, &CancellationToken::new()).unwrap();
    assert_eq!(word, data);
    assert_eq!(reads.load(Ordering::SeqCst), WORD_LEN / 8);
}

#[test]
fn test_sample_parses_and_purges() {
    let mut src = ScriptedSource::new(&framed("+2.5000E-03"));
    let purges = src.purges.clone();
    let v = sample_once(&mut src, &SamplerConfig::default(), &CancellationToken::new()).unwrap();
    assert_eq!(v, 2.5e-3);
    assert_eq!(purges.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unframed_word_is_a_frame_error() {
    let mut src = ScriptedSource::new(&[b'x'; WORD_LEN]);
    let err = sample_once(&mut src, &SamplerConfig::default(), &CancellationToken::new());
    assert!(matches!(err, Err(SamplerError::Frame(FrameError::NoFrame))));
}

#[test]
fn test_device_error_surfaces_as_io() {
    let mut src = ScriptedSource::new(b"\n0.1");
    src.fail_when_empty = true;
    let err = sample_once(&mut src, &SamplerConfig::default(), &CancellationToken::new());
    assert!(matches!(err, Err(SamplerError::Io(_))));
}

#[test]
fn test_silent_device_yields_to_cancellation() {
    let mut src = ScriptedSource::new(b"");
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut word = vec![0u8; WORD_LEN];
    assert!(matches!(
        read_word(&mut src, &mut word, 8, &cancel),
        Err(SamplerError::Cancelled)
    ));
}

async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_sampler_publishes_latest_reading() {
    let opener = Arc::new(FnOpener {
        open: || -> anyhow::Result<Box<dyn FrameSource>> {
            Ok(Box::new(LoopingSource {
                word: framed("0.001234"),
                pos: 0,
            }))
        },
        calls: AtomicUsize::new(0),
    });
    let sampler = SerialSampler::new(fast_config(), opener, CancellationToken::new());
    sampler.start();

    assert!(wait_until(|| matches!(sampler.voltage(), Ok(v) if v == 0.001234)).await);
    assert!(sampler.is_online());

    sampler.terminate();
    sampler.join().await;
    assert!(!sampler.is_online());
    assert!(matches!(sampler.voltage(), Err(SamplerError::Unavailable)));
}

#[tokio::test]
async fn test_failed_open_waits_for_restart_request() {
    let opener = Arc::new(FnOpener {
        open: || -> anyhow::Result<Box<dyn FrameSource>> { anyhow::bail!("no such device") },
        calls: AtomicUsize::new(0),
    });
    let sampler = SerialSampler::new(fast_config(), opener.clone(), CancellationToken::new());
    sampler.start();
    assert!(wait_until(|| !sampler.is_online()).await);
    assert!(matches!(sampler.voltage(), Err(SamplerError::Unavailable)));
    assert_eq!(opener.calls.load(Ordering::SeqCst), 1);

    sampler.request_restart();
    assert!(wait_until(|| opener.calls.load(Ordering::SeqCst) == 2).await);
    sampler.terminate();
    sampler.join().await;
}

#[tokio::test]
async fn test_terminated_sampler_does_not_restart() {
    let opener = Arc::new(FnOpener {
        open: || -> anyhow::Result<Box<dyn FrameSource>> { anyhow::bail!("gone") },
        calls: AtomicUsize::new(0),
    });
    let sampler = SerialSampler::new(fast_config(), opener.clone(), CancellationToken::new());
    sampler.terminate();
    sampler.request_restart();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(opener.calls.load(Ordering::SeqCst), 0);
}
