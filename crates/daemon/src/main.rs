#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Thermal profiler daemon: samples the PCM thermocouple, records fused
//! temperatures, throttles cores, and drives benchmark load.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use thermal_bench::{BenchMode, KernelKind};
use thermal_daemon::config::DaemonConfig;
use thermal_daemon::serial::SerialPortOpener;
use thermal_daemon::service::ProfilerService;
use thermal_daemon::sysfs::SysfsCpu;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "thermal-daemon")]
struct Args {
    /// TOML config file; CLI flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, e.g. 127.0.0.1:7788
    #[arg(long)]
    listen: Option<String>,

    /// Multimeter serial device.
    #[arg(long)]
    serial_port: Option<String>,

    /// Directory for the record and ambient files.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Arm thermal management whenever a benchmark starts.
    #[arg(long)]
    thermal_management: bool,

    /// Benchmark mode: timed or continuous.
    #[arg(long)]
    benchmark_mode: Option<BenchMode>,

    /// Benchmark kernel: sor, lu or smult.
    #[arg(long)]
    benchmark_kernel: Option<KernelKind>,

    /// Pin each benchmark core to the fastest step before loading it.
    #[arg(long)]
    benchmark_sets_frequency: bool,

    /// Log level (env-filter syntax).
    #[arg(long, default_value = "info")]
    log: String,
}

impl Args {
    fn into_config(self) -> anyhow::Result<DaemonConfig> {
        let mut cfg = match &self.config {
            Some(path) => DaemonConfig::load_from(path)?,
            None => DaemonConfig::default(),
        };
        if let Some(listen) = self.listen {
            cfg.listen = listen;
        }
        if let Some(port) = self.serial_port {
            cfg.sampler.port = port;
        }
        if let Some(dir) = self.data_dir {
            cfg.data_dir = dir;
        }
        if let Some(mode) = self.benchmark_mode {
            cfg.benchmark.mode = mode;
        }
        if let Some(kernel) = self.benchmark_kernel {
            cfg.benchmark.kernel = kernel;
        }
        cfg.control.enabled |= self.thermal_management;
        cfg.benchmark.sets_frequency |= self.benchmark_sets_frequency;
        Ok(cfg)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&args.log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = args.into_config()?;
    tokio::fs::create_dir_all(&cfg.data_dir)
        .await
        .with_context(|| format!("create {}", cfg.data_dir.display()))?;

    let cpu = Arc::new(SysfsCpu::from_config(&cfg.control));
    let opener = Arc::new(SerialPortOpener::new(cfg.sampler.clone()));
    let listen = cfg.listen.clone();
    let svc = ProfilerService::start(cfg, cpu, opener);

    let app = thermal_daemon::http::router(Arc::clone(&svc));

    tracing::info!(listen = %listen, "daemon starting");
    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("bind {listen}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "cannot listen for ctrl-c");
            }
        })
        .await?;

    svc.shutdown().await;
    Ok(())
}
