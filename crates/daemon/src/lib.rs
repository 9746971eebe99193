#![forbid(unsafe_code)]

//! Thermal profiler daemon: serial thermocouple sampling, sensor fusion with
//! a PCM energy model, and frequency throttling on a quad-core testbed.

pub mod ambient;
pub mod config;
pub mod controller;
pub mod handoff;
pub mod http;
pub mod recorder;
pub mod sampler;
pub mod serial;
pub mod service;
pub mod sysfs;
