//! Application configuration.
//!
//! Every tunable of the pipeline lives here so that deployments with
//! different sensor ranges or shot styles only need a config file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ShotscopeError, ShotscopeResult};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory where recorded sessions are stored.
    pub sessions_dir: PathBuf,

    /// Serial link settings.
    pub serial: SerialConfig,

    /// Sensor hardware parameters.
    pub sensor: SensorConfig,

    /// Low-pass filter settings.
    pub filter: FilterConfig,

    /// Gyro bias calibration.
    pub calibration: CalibrationConfig,

    /// Shot segmentation tunables.
    pub segmenter: SegmenterConfig,

    /// Button label alignment.
    pub labeler: LabelerConfig,

    /// Session recorder batching.
    pub recorder: RecorderConfig,

    /// Live subscriber delivery.
    pub live: LiveConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Serial link parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path (e.g. `/dev/ttyUSB0`).
    pub port: String,

    /// Baud rate.
    pub baud_rate: u32,
}

/// Sensor hardware parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Nominal sample rate of the device (Hz).
    pub sample_rate_hz: u32,

    /// Length of the in-memory live window (seconds).
    pub buffer_seconds: u32,

    /// Accelerometer scale (LSB per g). 16384 for a ±2g range.
    pub accel_lsb_per_g: f64,

    /// Gyroscope scale (LSB per °/s). 131 for a ±250°/s range.
    pub gyro_lsb_per_dps: f64,

    /// Human-readable accelerometer range, stored with sessions.
    pub accel_range: String,

    /// Human-readable gyroscope range, stored with sessions.
    pub gyro_range: String,

    /// Where each sensor is worn.
    pub placement: SensorPlacement,
}

/// Body placement of the two IMUs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorPlacement {
    /// Sensor 1, which drives segmentation.
    pub primary: String,
    /// Sensor 2.
    pub secondary: String,
}

/// Low-pass filter on the magnitude channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Whether filtering is applied at all.
    pub enabled: bool,

    /// Cutoff for gyro magnitudes (Hz).
    pub gyro_cutoff_hz: f64,

    /// Cutoff for accel magnitudes (Hz).
    pub accel_cutoff_hz: f64,
}

/// Gyro bias calibration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// How long to average while the device is still (device ms).
    pub duration_ms: u64,
}

/// Which magnitude signal drives segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentSignal {
    /// Low-pass filtered primary gyro magnitude.
    #[default]
    Filtered,
    /// Unfiltered primary gyro magnitude.
    Raw,
}

/// Hysteresis segmenter tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Signal used for threshold comparison.
    pub signal: SegmentSignal,

    /// Entry threshold (°/s). Also the minimum entry margin in adaptive mode.
    pub th_on: f64,

    /// Exit threshold (°/s). Also the minimum exit margin in adaptive mode.
    pub th_off: f64,

    /// Time above `th_on` needed to open a segment (ms).
    pub on_debounce_ms: u64,

    /// Time below `th_off` needed to close a segment (ms).
    pub off_debounce_ms: u64,

    /// Segments shorter than this are discarded (ms).
    pub min_segment_ms: u64,

    /// Quiet period after a segment before the next may open (ms).
    pub cooldown_ms: u64,

    /// Derive thresholds from the idle baseline and noise.
    pub adaptive: bool,

    /// Noise multiplier for the entry threshold.
    pub k_on: f64,

    /// Noise multiplier for the exit threshold.
    pub k_off: f64,

    /// Idle samples kept for baseline estimation.
    pub baseline_window: usize,

    /// Idle samples required before adaptive thresholds apply.
    pub baseline_min_samples: usize,
}

/// Button label alignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelerConfig {
    /// A level change must hold this long to count (ms).
    pub debounce_ms: u64,

    /// Button level that means "pressed".
    pub pressed_level: u8,

    /// Smallest accepted delay between segment end and press (ms).
    pub min_delay_ms: u64,

    /// Largest accepted delay between segment end and press (ms).
    pub max_delay_ms: u64,

    /// Label applied by a matched press (`good`, `bad` or `unknown`).
    pub positive_label: String,
}

/// Session recorder batching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Hand a batch to the writer after this many samples.
    pub flush_every_samples: usize,

    /// Hand a batch to the writer after this much device time (ms).
    pub flush_interval_ms: u64,
}

/// Live subscriber delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Maximum sample messages per second of device time.
    pub sample_rate_hz: u32,

    /// Messages buffered per subscriber before the oldest are dropped.
    pub channel_capacity: usize,

    /// Period of `stat` messages (ms).
    pub stat_interval_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "shotscope_pipeline=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sessions_dir: dirs_default_sessions(),
            serial: SerialConfig::default(),
            sensor: SensorConfig::default(),
            filter: FilterConfig::default(),
            calibration: CalibrationConfig::default(),
            segmenter: SegmenterConfig::default(),
            labeler: LabelerConfig::default(),
            recorder: RecorderConfig::default(),
            live: LiveConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 100,
            buffer_seconds: 60,
            accel_lsb_per_g: 16384.0,
            gyro_lsb_per_dps: 131.0,
            accel_range: "2g".to_string(),
            gyro_range: "250dps".to_string(),
            placement: SensorPlacement::default(),
        }
    }
}

impl Default for SensorPlacement {
    fn default() -> Self {
        Self {
            primary: "hand_back".to_string(),
            secondary: "bicep".to_string(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gyro_cutoff_hz: 18.0,
            accel_cutoff_hz: 12.0,
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self { duration_ms: 3000 }
    }
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            signal: SegmentSignal::Filtered,
            th_on: 50.0,
            th_off: 30.0,
            on_debounce_ms: 80,
            off_debounce_ms: 200,
            min_segment_ms: 300,
            cooldown_ms: 400,
            adaptive: true,
            k_on: 3.0,
            k_off: 2.0,
            baseline_window: 500,
            baseline_min_samples: 50,
        }
    }
}

impl Default for LabelerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 250,
            pressed_level: 1,
            min_delay_ms: 200,
            max_delay_ms: 3000,
            positive_label: "good".to_string(),
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            flush_every_samples: 200,
            flush_interval_ms: 1000,
        }
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 30,
            channel_capacity: 256,
            stat_interval_ms: 1000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl SensorConfig {
    /// Ring buffer capacity: window length × nominal rate.
    pub fn buffer_capacity(&self) -> usize {
        (self.buffer_seconds as usize * self.sample_rate_hz as usize).max(1)
    }

    /// Nominal interval between samples (seconds).
    pub fn sample_interval_secs(&self) -> f64 {
        1.0 / self.sample_rate_hz.max(1) as f64
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %config_path.display(), error = %e, "Ignoring config file");
                }
            }
        }
        Self::default()
    }

    /// Load and validate config from an explicit path.
    pub fn load_from(path: impl AsRef<Path>) -> ShotscopeResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ShotscopeError::config(format!("Failed to read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            ShotscopeError::config(format!("Failed to parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }

    /// Check cross-field invariants.
    pub fn validate(&self) -> ShotscopeResult<()> {
        let s = &self.sensor;
        if s.sample_rate_hz == 0 {
            return Err(ShotscopeError::config("sensor.sample_rate_hz must be > 0"));
        }
        if s.accel_lsb_per_g <= 0.0 || s.gyro_lsb_per_dps <= 0.0 {
            return Err(ShotscopeError::config("sensor scales must be > 0"));
        }

        let f = &self.filter;
        if f.enabled && (f.gyro_cutoff_hz <= 0.0 || f.accel_cutoff_hz <= 0.0) {
            return Err(ShotscopeError::config("filter cutoffs must be > 0"));
        }

        let seg = &self.segmenter;
        if seg.th_on <= seg.th_off || seg.th_off < 0.0 {
            return Err(ShotscopeError::config(
                "segmenter requires th_on > th_off >= 0",
            ));
        }
        if seg.k_on <= seg.k_off || seg.k_off < 0.0 {
            return Err(ShotscopeError::config(
                "segmenter requires k_on > k_off >= 0",
            ));
        }
        if seg.baseline_window < seg.baseline_min_samples {
            return Err(ShotscopeError::config(
                "segmenter.baseline_window must be >= baseline_min_samples",
            ));
        }

        let lab = &self.labeler;
        if lab.min_delay_ms > lab.max_delay_ms {
            return Err(ShotscopeError::config(
                "labeler.min_delay_ms must be <= max_delay_ms",
            ));
        }
        if !matches!(lab.positive_label.as_str(), "good" | "bad" | "unknown") {
            return Err(ShotscopeError::config(format!(
                "labeler.positive_label '{}' is not one of good|bad|unknown",
                lab.positive_label
            )));
        }

        if self.recorder.flush_every_samples == 0 {
            return Err(ShotscopeError::config(
                "recorder.flush_every_samples must be > 0",
            ));
        }
        if self.live.sample_rate_hz == 0 || self.live.channel_capacity == 0 {
            return Err(ShotscopeError::config(
                "live.sample_rate_hz and live.channel_capacity must be > 0",
            ));
        }
        Ok(())
    }
}


/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("shotscope").join("config.json")
}

/// Default sessions directory.
fn dirs_default_sessions() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("shotscope").join("sessions")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.sensor.buffer_capacity(), 6000);
        assert!((config.sensor.sample_interval_secs() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"segmenter": {"th_on": 80.0}}"#).unwrap();
        assert_eq!(config.segmenter.th_on, 80.0);
        assert_eq!(config.segmenter.th_off, 30.0);
        assert_eq!(config.serial.baud_rate, 115_200);
    }

    #[test]
    fn test_validate_rejects_inverted_hysteresis() {
        let mut config = AppConfig::default();
        config.segmenter.k_on = 1.0;
        config.segmenter.k_off = 2.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.segmenter.th_off = 60.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_label() {
        let mut config = AppConfig::default();
        config.labeler.positive_label = "great".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join("shotscope_test_config");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let path = dir.join("config.json");
        std::fs::write(&path, r#"{"live": {"sample_rate_hz": 10}}"#).unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.live.sample_rate_hz, 10);

        std::fs::write(&path, "not json").unwrap();
        assert!(AppConfig::load_from(&path).is_err());

        std::fs::remove_dir_all(&dir).ok();
    }
}
