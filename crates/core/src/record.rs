//! CSV export of a recording.
//!
//! Layout: one header line `e,<benchmark start>,<benchmark stop>` followed by
//! one line per snapshot.

use std::io::{self, Write};

use chrono::{Local, TimeZone};

use crate::model::{TemperatureSnapshot, TimeInterval};

/// First field of the header line.
pub const RECORD_CODE: &str = "e";
/// Local-time timestamp layout used throughout the file.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Formats epoch ms as local time.
pub fn format_timestamp(ms: i64) -> String {
    match Local.timestamp_millis_opt(ms).single() {
        Some(dt) => dt.format(TIMESTAMP_FORMAT).to_string(),
        None => ms.to_string(),
    }
}

fn format_edge(ms: i64) -> String {
    if ms == 0 {
        "0".to_string()
    } else {
        format_timestamp(ms)
    }
}

/// Header line carrying the benchmark interval; unset edges print as `0`.
pub fn header_line(interval: &TimeInterval) -> String {
    format!(
        "{RECORD_CODE},{},{}",
        format_edge(interval.start_ms),
        format_edge(interval.stop_ms)
    )
}

/// One data line.
pub fn record_line(s: &TemperatureSnapshot) -> String {
    let [c0, c1, c2, c3] = s.core_temps;
    format!(
        "{},{c0},{c1},{c2},{c3},{:.3},{:.1},{:.4},{:.4},{:.4}",
        format_timestamp(s.timestamp_ms),
        s.thermocouple_c,
        s.ambient_c,
        s.pcm_energy_j,
        s.r_si,
        s.r_pcm
    )
}

/// Writes a whole recording.
pub fn write_records<W: Write>(
    w: &mut W,
    interval: &TimeInterval,
    records: &[TemperatureSnapshot],
) -> io::Result<()> {
    writeln!(w, "{}", header_line(interval))?;
    for s in records {
        writeln!(w, "{}", record_line(s))?;
    }
    w.flush()
}
