//! Byte sources for the sampler: the multimeter's serial port, or anything else that reads.

use std::io::{self, Read};
use std::time::Duration;

use anyhow::{Context, Result};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::config::SamplerConfig;

/// Exclusive, blocking byte source.
pub trait FrameSource: Send {
    /// Reads up to `buf.len()` bytes. A timeout with nothing available returns `Ok(0)`.
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// Drops anything buffered on either side of the line.
    fn purge(&mut self) -> io::Result<()>;
}

/// Opens a fresh [`FrameSource`]; called again on every sampler restart.
pub trait PortOpener: Send + Sync {
    fn open(&self) -> Result<Box<dyn FrameSource>>;
}

/// Opens the configured tty at 8N1 without flow control.
#[derive(Debug, Clone)]
pub struct SerialPortOpener {
    cfg: SamplerConfig,
}

impl SerialPortOpener {
    pub fn new(cfg: SamplerConfig) -> Self {
        Self { cfg }
    }
}

impl PortOpener for SerialPortOpener {
    fn open(&self) -> Result<Box<dyn FrameSource>> {
        let port = serialport::new(&self.cfg.port, self.cfg.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(self.cfg.chunk_timeout_ms))
            .open()
            .with_context(|| format!("open serial port {}", self.cfg.port))?;
        let mut source = SerialFrameSource { port };
        source.purge().context("purge serial port")?;
        tracing::info!(port = %self.cfg.port, baud = self.cfg.baud_rate, "serial port open");
        Ok(Box::new(source))
    }
}

struct SerialFrameSource {
    port: Box<dyn SerialPort>,
}

impl FrameSource for SerialFrameSource {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            other => other,
        }
    }

    fn purge(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::All).map_err(io::Error::from)
    }
}
