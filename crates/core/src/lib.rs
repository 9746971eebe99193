#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Testbed constants, sensor conversions, the PCM model and the throttling
//! policy shared by the thermal profiler daemon and its benchmark pool.

pub mod api;
pub mod error;
pub mod frame;
pub mod model;
pub mod pcm;
pub mod policy;
pub mod record;
pub mod testbed;
pub mod thermocouple;

mod util;

pub use util::now_ms;
