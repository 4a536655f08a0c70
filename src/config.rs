use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Configuration for the detection engine with tunable thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Seconds between polling cycles
    pub poll_interval_secs: u64,

    /// Per-pixel difference (0-255) that counts as changed
    pub motion_threshold: u8,

    /// Minimum connected motion area in pixels, filters sensor noise
    pub min_motion_area: u32,

    /// Mean brightness (0-1) above which lights are considered on
    pub brightness_threshold: f64,

    /// Mean brightness (0-1) separating idle from long_break
    pub idle_brightness_threshold: f64,

    /// Smoothing window and majority vote parameters
    pub smoothing_window: usize,
    pub smoothing_majority: usize,
    pub smoothing_enabled: bool,

    /// Minimum active seconds before a session is worth recording
    pub min_session_secs: i64,

    /// Per-request camera fetch timeout
    pub camera_timeout_secs: u64,

    /// Queued messages per broadcast listener before it is considered dead
    pub broadcast_buffer: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            motion_threshold: 40,
            min_motion_area: 2000,
            brightness_threshold: 0.45,
            idle_brightness_threshold: 0.3,
            smoothing_window: 3,
            smoothing_majority: 2,
            smoothing_enabled: true,
            min_session_secs: 60,
            camera_timeout_secs: 3,
            broadcast_buffer: 32,
        }
    }
}

impl DetectionConfig {
    /// Load from a JSON file, falling back to defaults when the file is
    /// missing or unparseable.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match Self::load(path) {
            Ok(config) => config,
            Err(err) => {
                warn!(
                    "Failed to load config from {}: {err:#}; using defaults",
                    path.display()
                );
                Self::default()
            }
        }
    }

    fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse config from {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = DetectionConfig::default();
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.motion_threshold, 40);
        assert_eq!(config.min_motion_area, 2000);
        assert_eq!(config.smoothing_window, 3);
        assert_eq!(config.smoothing_majority, 2);
        assert_eq!(config.min_session_secs, 60);
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"poll_interval_secs": 10, "motion_threshold": 25}}"#).unwrap();

        let config = DetectionConfig::load_or_default(file.path());
        assert_eq!(config.poll_interval_secs, 10);
        assert_eq!(config.motion_threshold, 25);
        assert_eq!(config.min_motion_area, 2000);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let config = DetectionConfig::load_or_default(file.path());
        assert_eq!(config.poll_interval_secs, 5);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = DetectionConfig::load_or_default(Path::new("/nonexistent/config.json"));
        assert_eq!(config.brightness_threshold, 0.45);
    }
}
