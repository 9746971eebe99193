//! Persisted ambient (reference junction) temperature.

use std::path::Path;

use anyhow::{Context, Result};

/// Reads the stored ambient temperature, falling back to `default_c` when absent or unreadable.
pub fn load(path: &Path, default_c: f32) -> f32 {
    match std::fs::read_to_string(path) {
        Ok(s) => match s.trim().parse::<f32>() {
            Ok(v) if v.is_finite() => v,
            _ => {
                tracing::warn!(path = %path.display(), "ambient file unreadable, using default");
                default_c
            }
        },
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "no ambient file, using default");
            default_c
        }
    }
}

/// Writes the ambient temperature with one decimal.
pub fn save(path: &Path, celsius: f32) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    std::fs::write(path, format!("{celsius:.1}"))
        .with_context(|| format!("write {}", path.display()))
}

/// Moves `current` by `steps` tenths of a degree, rounded to one decimal.
pub fn step(current: f32, steps: i32) -> f32 {
    ((current + steps as f32 * 0.1) * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("ambient.txt");
        save(&p, 23.46).unwrap();
        assert_eq!(std::fs::read_to_string(&p).unwrap(), "23.5");
        assert_eq!(load(&p, 22.0), 23.5);
    }

    #[test]
    fn missing_or_corrupt_file_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("ambient.txt");
        assert_eq!(load(&p, 22.0), 22.0);
        std::fs::write(&p, "warm").unwrap();
        assert_eq!(load(&p, 22.0), 22.0);
    }

    #[test]
    fn step_rounds_to_tenths() {
        assert_eq!(step(22.0, 1), 22.1);
        assert_eq!(step(22.0, -1), 21.9);
        assert_eq!(step(22.04, 0), 22.0);
    }
}
