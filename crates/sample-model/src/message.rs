//! JSON payloads pushed to live subscribers.
//!
//! Every message is one JSON object tagged by `type`:
//!
//! ```text
//! {"type":"sample","data":{...}}
//! {"type":"stat","data":{"pps":..,"dropped":..,"parse_err":..}}
//! {"type":"segment","event":"start"|"end","data":{...}}
//! {"type":"label","data":{"shot_id":..,"label":..,"t_label":..}}
//! {"type":"calibration","data":{"status":..,"offset":..}}
//! {"type":"recording","data":{"status":..,"session_id":..}}
//! ```

use serde::{Deserialize, Serialize};

use crate::sample::{CalibrationOffset, ProcessedSample};
use crate::segment::{LabelSource, ShotLabel, ShotSegment};
use crate::stats::Stats;

/// A message for live subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveMessage {
    Sample {
        data: ProcessedSample,
    },
    Stat {
        data: Stats,
    },
    Segment {
        event: SegmentEvent,
        data: ShotSegment,
    },
    Label {
        data: LabelPayload,
    },
    Calibration {
        data: CalibrationPayload,
    },
    Recording {
        data: RecordingPayload,
    },
}

impl LiveMessage {
    /// The `type` tag of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sample { .. } => "sample",
            Self::Stat { .. } => "stat",
            Self::Segment { .. } => "segment",
            Self::Label { .. } => "label",
            Self::Calibration { .. } => "calibration",
            Self::Recording { .. } => "recording",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentEvent {
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelStatus {
    /// A segment received a label.
    Assigned,
    /// A press matched no segment.
    Unmatched,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelPayload {
    pub status: LabelStatus,
    pub shot_id: Option<String>,
    pub label: Option<ShotLabel>,
    /// Device time of the press (unwrapped ms), or of the sample being
    /// processed when the label was set manually.
    pub t_label: u64,
    /// Press time minus segment end.
    pub delay_ms: Option<u64>,
    pub source: LabelSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationStatus {
    Started,
    Completed,
    Aborted,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPayload {
    pub status: CalibrationStatus,
    /// Offset now in force.
    pub offset: Option<CalibrationOffset>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingStatus {
    Started,
    Stopped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingPayload {
    pub status: RecordingStatus,
    pub session_id: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stat_message_shape() {
        let msg = LiveMessage::Stat {
            data: Stats {
                pps: 99.5,
                dropped: 2,
                parse_err: 1,
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "stat");
        assert_eq!(json["data"]["dropped"], 2);
        assert_eq!(json["data"]["parse_err"], 1);
        assert_eq!(msg.kind(), "stat");
    }

    #[test]
    fn test_segment_message_shape() {
        let msg = LiveMessage::Segment {
            event: SegmentEvent::Start,
            data: ShotSegment::open(500),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "segment");
        assert_eq!(json["event"], "start");
        assert_eq!(json["data"]["t_start"], 500);
        assert!(json["data"]["t_end"].is_null());
    }

    #[test]
    fn test_unmatched_label_message() {
        let msg = LiveMessage::Label {
            data: LabelPayload {
                status: LabelStatus::Unmatched,
                shot_id: None,
                label: None,
                t_label: 9_000,
                delay_ms: None,
                source: LabelSource::Button,
            },
        };
        let text = serde_json::to_string(&msg).unwrap();
        let back: LiveMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(back, msg);
        assert!(text.contains(r#""status":"unmatched""#));
    }
}
