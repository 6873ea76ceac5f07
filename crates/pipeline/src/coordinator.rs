//! Synchronous per-sample coordinator.
//!
//! [`Pipeline`] owns every processing stage and runs one line at a time
//! through all of them. It has no clock and no I/O of its own apart from
//! the recorder, so tests drive it directly with lines.

use serde::{Deserialize, Serialize};

use shotscope_common::config::AppConfig;
use shotscope_common::error::{ShotscopeError, ShotscopeResult};
use shotscope_ingest::{IngestedSample, Ingestor, LineOutcome};
use shotscope_model::message::{
    CalibrationPayload, CalibrationStatus, LabelPayload, LabelStatus, LiveMessage,
    RecordingPayload, RecordingStatus, SegmentEvent,
};
use shotscope_model::sample::{CalibrationOffset, ProcessedSample};
use shotscope_model::segment::{LabelCounts, LabelSource, LabelUpdate, ShotLabel, ShotSegment};
use shotscope_model::session::{SessionMeta, SessionStatus};
use shotscope_model::stats::Stats;
use shotscope_processing::{
    LabelOutcome, Labeler, Processor, SegmenterEvent, SegmenterPhase, Segmenter,
    SharedRingBuffer,
};
use shotscope_session::{Recorder, RecordingSpec};

use crate::hub::{LiveFeed, LiveHub, LiveSubscriber};

/// What is feeding the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    None,
    Live,
    Replay,
}

/// Aggregate state for status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub source: SourceKind,
    pub recording: bool,
    pub session_id: Option<String>,
    pub recording_failed: bool,
    pub calibrating: bool,
    pub calibration: CalibrationOffset,
    pub segmenter: SegmenterPhase,
    pub buffer_len: usize,
    pub buffer_capacity: usize,
    pub segment_count: usize,
    pub labels: LabelCounts,
    pub subscribers: usize,
    /// Filled in by the engine when a session is loaded for replay.
    #[serde(default)]
    pub replay: Option<ReplayStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayStatus {
    pub session_id: String,
    pub state: shotscope_session::PlayerState,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub speed: f64,
}

pub struct Pipeline {
    config: AppConfig,
    ingestor: Ingestor,
    processor: Processor,
    ring: SharedRingBuffer,
    segmenter: Segmenter,
    labeler: Labeler,
    shots: Vec<ShotSegment>,
    recorder: Recorder,
    failure_reported: bool,
    hub: LiveHub,
    source: SourceKind,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> ShotscopeResult<Self> {
        config.validate()?;
        Ok(Self {
            ingestor: Ingestor::new(),
            processor: Processor::new(&config.sensor, &config.filter),
            ring: SharedRingBuffer::new(config.sensor.buffer_capacity()),
            segmenter: Segmenter::new(config.segmenter.clone()),
            labeler: Labeler::new(config.labeler.clone())?,
            shots: Vec::new(),
            recorder: Recorder::new(config.recorder.clone()),
            failure_reported: false,
            hub: LiveHub::new(&config.live),
            source: SourceKind::None,
            config,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn subscribe(&self) -> LiveSubscriber {
        self.hub.subscribe()
    }

    pub fn feed(&self) -> LiveFeed {
        self.hub.feed()
    }

    /// Read handle on the recent-sample buffer.
    pub fn ring(&self) -> SharedRingBuffer {
        self.ring.clone()
    }

    /// Run one line through every stage. Bad lines are counted, never fatal.
    pub fn ingest_line(&mut self, line: &str, now_ns: u64) -> LineOutcome {
        let outcome = self.ingestor.ingest_line(line, now_ns);
        if let LineOutcome::Sample(ingested) = &outcome {
            self.process(ingested);
        }
        outcome
    }

    /// Count a line the source could not decode.
    pub fn record_unreadable(&mut self) {
        self.ingestor.record_unreadable();
    }

    fn process(&mut self, ingested: &IngestedSample) {
        if ingested.device_reset {
            self.reset_processing_state();
        }

        if let Some(result) = self.processor.feed_calibration(&ingested.raw, ingested.t_ms) {
            self.finish_calibration(result);
        }

        let sample =
            self.processor
                .process(&ingested.raw, ingested.t_ms, ingested.t_received_ns);
        self.ring.push(sample.clone());

        if !self.processor.is_calibrating() {
            if let Some(event) = self.segmenter.feed(&sample) {
                self.on_segment_event(event);
            }
        }
        if let Some(outcome) = self.labeler.feed(sample.button, sample.t_ms) {
            self.on_label_outcome(outcome);
        }

        self.recorder.append(&sample);
        self.check_recorder();

        self.hub.publish_sample(&sample);
    }

    fn finish_calibration(&mut self, result: ShotscopeResult<CalibrationOffset>) {
        self.segmenter.reset();
        let payload = match result {
            Ok(offset) => {
                tracing::info!(
                    samples = offset.samples,
                    gyro1 = ?offset.gyro[0],
                    gyro2 = ?offset.gyro[1],
                    "Calibration completed"
                );
                CalibrationPayload {
                    status: CalibrationStatus::Completed,
                    offset: Some(offset),
                    message: None,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Calibration failed");
                CalibrationPayload {
                    status: CalibrationStatus::Failed,
                    offset: Some(self.processor.offset().clone()),
                    message: Some(e.to_string()),
                }
            }
        };
        self.hub.publish(LiveMessage::Calibration { data: payload });
    }

    fn on_segment_event(&mut self, event: SegmenterEvent) {
        match event {
            SegmenterEvent::Opened(segment) => {
                self.hub.publish(LiveMessage::Segment {
                    event: SegmentEvent::Start,
                    data: segment,
                });
            }
            SegmenterEvent::Closed(segment) => {
                tracing::info!(
                    shot_id = %segment.shot_id,
                    t_start = segment.t_start,
                    duration_ms = segment.duration_ms().unwrap_or(0),
                    "Shot detected"
                );
                self.labeler.segment_closed(&segment);
                self.recorder.segment_closed(&segment);
                self.shots.push(segment.clone());
                self.hub.publish(LiveMessage::Segment {
                    event: SegmentEvent::End,
                    data: segment,
                });
            }
            SegmenterEvent::Discarded { .. } => {}
        }
    }

    fn on_label_outcome(&mut self, outcome: LabelOutcome) {
        let payload = match outcome {
            LabelOutcome::Assigned {
                shot_id,
                label,
                t_label,
                delay_ms,
            } => {
                if let Some(shot) = self.shots.iter_mut().find(|s| s.shot_id == shot_id) {
                    shot.apply_label(label, Some(t_label), LabelSource::Button);
                }
                self.recorder.label(&LabelUpdate::new(
                    shot_id.clone(),
                    label,
                    LabelSource::Button,
                    Some(t_label),
                ));
                tracing::info!(%shot_id, %label, delay_ms, "Shot labeled by button");
                LabelPayload {
                    status: LabelStatus::Assigned,
                    shot_id: Some(shot_id),
                    label: Some(label),
                    t_label,
                    delay_ms: Some(delay_ms),
                    source: LabelSource::Button,
                }
            }
            LabelOutcome::Unmatched { t_label } => {
                tracing::info!(t_label, "Button press matched no shot");
                LabelPayload {
                    status: LabelStatus::Unmatched,
                    shot_id: None,
                    label: None,
                    t_label,
                    delay_ms: None,
                    source: LabelSource::Button,
                }
            }
        };
        self.hub.publish(LiveMessage::Label { data: payload });
    }

    fn check_recorder(&mut self) {
        if self.failure_reported || !self.recorder.is_failed() {
            return;
        }
        self.failure_reported = true;
        if let Some(session_id) = self.recorder.session_id() {
            self.hub.publish(LiveMessage::Recording {
                data: RecordingPayload {
                    status: RecordingStatus::Failed,
                    session_id,
                    message: Some("Storage write failed, recording continues".into()),
                },
            });
        }
    }

    /// Start recording into the configured sessions directory.
    pub fn start_recording(&mut self, name: &str) -> ShotscopeResult<String> {
        let spec = RecordingSpec {
            name: name.to_string(),
            sensor: self.config.sensor.clone(),
            calibration: self.processor.offset().clone(),
        };
        let session_id = self.recorder.start(&self.config.sessions_dir, spec)?;
        self.failure_reported = false;
        self.hub.publish(LiveMessage::Recording {
            data: RecordingPayload {
                status: RecordingStatus::Started,
                session_id: session_id.clone(),
                message: None,
            },
        });
        Ok(session_id)
    }

    /// Finalize the active recording.
    pub fn stop_recording(&mut self) -> ShotscopeResult<SessionMeta> {
        let meta = self.recorder.stop()?;
        let status = match meta.status {
            SessionStatus::Completed => RecordingStatus::Stopped,
            SessionStatus::Failed => RecordingStatus::Failed,
        };
        self.hub.publish(LiveMessage::Recording {
            data: RecordingPayload {
                status,
                session_id: meta.id.clone(),
                message: meta.failure.clone(),
            },
        });
        Ok(meta)
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    /// Begin gyro bias calibration. Segmentation pauses until it ends.
    pub fn start_calibration(&mut self, duration_ms: Option<u64>) -> ShotscopeResult<()> {
        let duration_ms = duration_ms.unwrap_or(self.config.calibration.duration_ms);
        if let Err(e) = self.processor.start_calibration(duration_ms) {
            tracing::warn!(error = %e, "Calibration request ignored");
            return Err(e);
        }
        self.segmenter.reset();
        tracing::info!(duration_ms, "Calibration started, keep the sensors still");
        self.hub.publish(LiveMessage::Calibration {
            data: CalibrationPayload {
                status: CalibrationStatus::Started,
                offset: None,
                message: None,
            },
        });
        Ok(())
    }

    /// Cancel calibration. The previous offset stays in force.
    pub fn abort_calibration(&mut self) -> ShotscopeResult<()> {
        if !self.processor.abort_calibration() {
            return Err(ShotscopeError::state_conflict("No calibration in progress"));
        }
        self.segmenter.reset();
        tracing::info!("Calibration aborted");
        self.hub.publish(LiveMessage::Calibration {
            data: CalibrationPayload {
                status: CalibrationStatus::Aborted,
                offset: Some(self.processor.offset().clone()),
                message: None,
            },
        });
        Ok(())
    }

    pub fn is_calibrating(&self) -> bool {
        self.processor.is_calibrating()
    }

    pub fn calibration(&self) -> &CalibrationOffset {
        self.processor.offset()
    }

    pub fn set_calibration(&mut self, offset: CalibrationOffset) {
        self.processor.set_offset(offset);
    }

    /// Set a shot's label by hand. Button presses no longer relabel it.
    pub fn patch_label(&mut self, shot_id: &str, label: ShotLabel) -> ShotscopeResult<ShotSegment> {
        let t_label = self.ingestor.last_t_ms();
        let shot = self
            .shots
            .iter_mut()
            .find(|s| s.shot_id == shot_id)
            .ok_or_else(|| ShotscopeError::not_found(format!("No shot with id {shot_id}")))?;
        shot.apply_label(label, Some(t_label), LabelSource::Manual);
        let shot = shot.clone();

        self.labeler.mark_labeled(shot_id);
        self.recorder.label(&LabelUpdate::new(
            shot_id,
            label,
            LabelSource::Manual,
            Some(t_label),
        ));
        self.hub.publish(LiveMessage::Label {
            data: LabelPayload {
                status: LabelStatus::Assigned,
                shot_id: Some(shot_id.to_string()),
                label: Some(label),
                t_label,
                delay_ms: None,
                source: LabelSource::Manual,
            },
        });
        Ok(shot)
    }

    pub fn segments(&self) -> &[ShotSegment] {
        &self.shots
    }

    pub fn stats(&self) -> Stats {
        self.ingestor.stats()
    }

    pub fn reset_stats(&mut self) {
        self.ingestor.reset_stats();
    }

    /// Roll the rate window and push a stat message.
    pub fn publish_stats(&mut self, now_ns: u64) -> Stats {
        self.ingestor.refresh(now_ns);
        let stats = self.ingestor.stats();
        self.hub.publish(LiveMessage::Stat {
            data: stats.clone(),
        });
        stats
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    pub fn set_source(&mut self, source: SourceKind) {
        if self.source != source {
            tracing::info!(from = ?self.source, to = ?source, "Pipeline source changed");
        }
        self.source = source;
    }

    /// The live link was re-established on the same device.
    pub fn reconnect(&mut self) {
        self.ingestor.reconnect();
        self.reset_processing_state();
    }

    /// Start over for an unrelated stream (new source, replay start or seek).
    pub fn reset_stream_state(&mut self) {
        self.ingestor.restart_stream();
        self.ring.clear();
        self.reset_processing_state();
    }

    /// Forget shots that had not ended before `t_ms`. Replaying from
    /// there detects them again.
    pub fn rewind_shots(&mut self, t_ms: u64) -> usize {
        let before = self.shots.len();
        self.shots.retain(|s| s.t_end.is_some_and(|end| end < t_ms));
        let dropped = before - self.shots.len();
        if dropped > 0 {
            tracing::debug!(t_ms, dropped, "Shot log rewound");
        }
        dropped
    }

    /// A new run: stream state and the shot log start empty.
    pub fn begin_run(&mut self, source: SourceKind) {
        self.reset_stream_state();
        self.shots.clear();
        self.set_source(source);
    }

    fn reset_processing_state(&mut self) {
        self.processor.reset_filters();
        self.segmenter.reset();
        self.labeler.reset();
        self.hub.reset_decimation();
    }

    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            source: self.source,
            recording: self.recorder.is_recording(),
            session_id: self.recorder.session_id(),
            recording_failed: self.recorder.is_failed(),
            calibrating: self.processor.is_calibrating(),
            calibration: self.processor.offset().clone(),
            segmenter: self.segmenter.phase(),
            buffer_len: self.ring.len(),
            buffer_capacity: self.ring.capacity(),
            segment_count: self.shots.len(),
            labels: LabelCounts::tally(&self.shots),
            subscribers: self.hub.subscriber_count(),
            replay: None,
        }
    }

    /// The most recent processed sample.
    pub fn latest_sample(&self) -> Option<ProcessedSample> {
        self.ring.latest()
    }
}
