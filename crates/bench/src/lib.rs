#![forbid(unsafe_code)]

//! CPU load generator for thermal experiments: a pool of numeric kernels,
//! one worker per core.

pub mod kernel;
pub mod pool;
pub mod runner;

pub use kernel::KernelKind;
pub use pool::{BenchConfig, BenchMode, BenchmarkPool, PoolError};
