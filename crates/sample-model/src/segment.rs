//! Shot segments, their features and labels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// User-facing quality label of a shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShotLabel {
    #[default]
    Unknown,
    Good,
    Bad,
}

impl ShotLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Good => "good",
            Self::Bad => "bad",
        }
    }
}

impl fmt::Display for ShotLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShotLabel {
    type Err = InvalidLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unknown" => Ok(Self::Unknown),
            "good" => Ok(Self::Good),
            "bad" => Ok(Self::Bad),
            _ => Err(InvalidLabel(s.to_string())),
        }
    }
}

/// A label string that is not one of `unknown|good|bad`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Invalid label '{0}': expected good, bad or unknown")]
pub struct InvalidLabel(pub String);

/// Who set a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSource {
    /// Device button press aligned to the segment.
    Button,
    /// Explicit user action.
    Manual,
}

/// Scalar statistics of one closed segment.
///
/// Gyro values in °/s, accel values in g, duration in ms. Computed only
/// from samples inside `[t_start, t_end]`; an empty window gives zeros.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ShotFeatures {
    pub duration_ms: f64,
    pub g1_rms: f64,
    pub g1_peak: f64,
    pub g2_rms: f64,
    pub g2_peak: f64,
    /// RMS of `gyro_mag_2 - gyro_mag_1`.
    pub dg_rms: f64,
    pub a1_rms: f64,
    pub a2_rms: f64,
}

impl ShotFeatures {
    /// Named view of the features, in a stable order.
    pub fn named(&self) -> [(&'static str, f64); 8] {
        [
            ("duration_ms", self.duration_ms),
            ("g1_rms", self.g1_rms),
            ("g1_peak", self.g1_peak),
            ("g2_rms", self.g2_rms),
            ("g2_peak", self.g2_peak),
            ("dg_rms", self.dg_rms),
            ("a1_rms", self.a1_rms),
            ("a2_rms", self.a2_rms),
        ]
    }
}

/// A detected shot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotSegment {
    /// Unique identifier.
    pub shot_id: String,

    /// Device time the signal first exceeded the entry threshold (unwrapped ms).
    pub t_start: u64,

    /// Device time the signal first fell below the exit threshold.
    /// `None` while the segment is open.
    pub t_end: Option<u64>,

    pub label: ShotLabel,

    /// Device time of the press (or host action) that set the label.
    #[serde(default)]
    pub label_time_ms: Option<u64>,

    #[serde(default)]
    pub label_source: Option<LabelSource>,

    /// `None` while the segment is open.
    pub features: Option<ShotFeatures>,

    /// Samples inside the segment window.
    pub sample_count: usize,
}

impl ShotSegment {
    /// Open a new segment with a fresh id.
    pub fn open(t_start: u64) -> Self {
        Self {
            shot_id: new_shot_id(),
            t_start,
            t_end: None,
            label: ShotLabel::Unknown,
            label_time_ms: None,
            label_source: None,
            features: None,
            sample_count: 0,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.t_end.is_some()
    }

    /// Duration in ms, if closed.
    pub fn duration_ms(&self) -> Option<u64> {
        self.t_end.map(|end| end.saturating_sub(self.t_start))
    }

    /// Set the label and remember who set it.
    pub fn apply_label(&mut self, label: ShotLabel, at_ms: Option<u64>, source: LabelSource) {
        self.label = label;
        self.label_time_ms = at_ms;
        self.label_source = Some(source);
    }
}

/// A label change, appended to a session's label log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelUpdate {
    pub shot_id: String,
    pub label: ShotLabel,
    pub source: LabelSource,
    /// Device time of the press, for button labels.
    #[serde(default)]
    pub t_label_ms: Option<u64>,
    /// Wall-clock time the update was recorded (ISO 8601).
    pub recorded_at: String,
}

impl LabelUpdate {
    pub fn new(
        shot_id: impl Into<String>,
        label: ShotLabel,
        source: LabelSource,
        t_label_ms: Option<u64>,
    ) -> Self {
        Self {
            shot_id: shot_id.into(),
            label,
            source,
            t_label_ms,
            recorded_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Counts of labels over a set of segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LabelCounts {
    pub good: usize,
    pub bad: usize,
    pub unknown: usize,
}

impl LabelCounts {
    pub fn tally<'a>(segments: impl IntoIterator<Item = &'a ShotSegment>) -> Self {
        let mut counts = Self::default();
        for seg in segments {
            match seg.label {
                ShotLabel::Good => counts.good += 1,
                ShotLabel::Bad => counts.bad += 1,
                ShotLabel::Unknown => counts.unknown += 1,
            }
        }
        counts
    }
}

fn new_shot_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..12].to_string()
}
