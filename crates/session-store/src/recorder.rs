//! Append-only session recorder.
//!
//! Samples are buffered on the caller's thread and handed to a background
//! writer thread in batches, so the ingest loop never waits on the disk.

use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use shotscope_common::config::{RecorderConfig, SensorConfig};
use shotscope_common::error::{ShotscopeError, ShotscopeResult};
use shotscope_model::record::{SampleRecord, SAMPLE_COLUMNS};
use shotscope_model::sample::{CalibrationOffset, ProcessedSample};
use shotscope_model::segment::{LabelUpdate, ShotSegment};
use shotscope_model::session::{
    append_jsonl, make_session_id, SessionDir, SessionMeta, SessionStatus,
    SESSION_SCHEMA_VERSION,
};

/// What to record and under which name.
#[derive(Debug, Clone)]
pub struct RecordingSpec {
    pub name: String,
    pub sensor: SensorConfig,
    /// Offset in force when the recording starts.
    pub calibration: CalibrationOffset,
}

enum WriterCommand {
    Samples(Vec<SampleRecord>),
    Segment(ShotSegment),
    Label(LabelUpdate),
    Finish,
}

/// Outcome of the writer thread.
#[derive(Debug, Default)]
struct WriterReport {
    rows_written: u64,
    failure: Option<String>,
}

struct ActiveRecording {
    dir: SessionDir,
    spec: RecordingSpec,
    created_at: DateTime<Utc>,
    tx: UnboundedSender<WriterCommand>,
    writer: JoinHandle<WriterReport>,
    failed: Arc<AtomicBool>,
    pending: Vec<SampleRecord>,
    batch_started_ms: Option<u64>,
    first_t_ms: Option<u64>,
    last_t_ms: u64,
    sample_count: u64,
    shot_ids: HashSet<String>,
}

/// Records one session at a time.
pub struct Recorder {
    config: RecorderConfig,
    active: Option<ActiveRecording>,
}

impl Recorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            active: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Id of the session being recorded.
    pub fn session_id(&self) -> Option<String> {
        self.active.as_ref().map(|a| a.dir.id())
    }

    /// True once a write has failed in the current recording.
    pub fn is_failed(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.failed.load(Ordering::SeqCst))
    }

    /// Samples accepted in the current recording.
    pub fn sample_count(&self) -> u64 {
        self.active.as_ref().map_or(0, |a| a.sample_count)
    }

    /// Create the session directory and start the writer. Returns the session id.
    pub fn start(
        &mut self,
        sessions_dir: impl AsRef<Path>,
        spec: RecordingSpec,
    ) -> ShotscopeResult<String> {
        if let Some(active) = &self.active {
            return Err(ShotscopeError::state_conflict(format!(
                "Already recording session {}",
                active.dir.id()
            )));
        }

        let created_at = Utc::now();
        let dir = SessionDir::create(sessions_dir, &make_session_id(&spec.name, created_at))?;
        self.start_at(dir, spec, created_at)
    }

    /// Start writing into a freshly created `dir`. The directory is removed
    /// again if the writer cannot be set up.
    fn start_at(
        &mut self,
        dir: SessionDir,
        spec: RecordingSpec,
        created_at: DateTime<Utc>,
    ) -> ShotscopeResult<String> {
        match self.start_in(dir.clone(), spec, created_at) {
            Ok(id) => Ok(id),
            Err(e) => {
                if let Err(cleanup) = std::fs::remove_dir_all(dir.root()) {
                    tracing::warn!(
                        path = %dir.root().display(),
                        error = %cleanup,
                        "Could not remove abandoned session directory"
                    );
                }
                Err(e)
            }
        }
    }

    fn start_in(
        &mut self,
        dir: SessionDir,
        spec: RecordingSpec,
        created_at: DateTime<Utc>,
    ) -> ShotscopeResult<String> {
        let data_path = dir.data_path();
        let file = File::create(&data_path).map_err(|e| {
            ShotscopeError::storage(format!("Cannot create {}: {e}", data_path.display()))
        })?;
        let mut csv_writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        csv_writer.write_record(SAMPLE_COLUMNS)?;
        csv_writer.flush()?;

        let (tx, rx) = unbounded_channel();
        let failed = Arc::new(AtomicBool::new(false));
        let writer = {
            let dir = dir.clone();
            let failed = failed.clone();
            std::thread::Builder::new()
                .name("shotscope-recorder".into())
                .spawn(move || run_writer(rx, csv_writer, dir, failed))?
        };

        let id = dir.id();
        tracing::info!(session_id = %id, path = %dir.root().display(), "Recording started");

        self.active = Some(ActiveRecording {
            dir,
            spec,
            created_at,
            tx,
            writer,
            failed,
            pending: Vec::with_capacity(self.config.flush_every_samples),
            batch_started_ms: None,
            first_t_ms: None,
            last_t_ms: 0,
            sample_count: 0,
            shot_ids: HashSet::new(),
        });
        Ok(id)
    }

    /// Buffer one sample. A no-op when not recording.
    pub fn append(&mut self, sample: &ProcessedSample) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        active.first_t_ms.get_or_insert(sample.t_ms);
        active.last_t_ms = sample.t_ms;
        active.sample_count += 1;
        active.pending.push(SampleRecord::from(sample));

        let started = *active.batch_started_ms.get_or_insert(sample.t_ms);
        let due = active.pending.len() >= self.config.flush_every_samples
            || sample.t_ms.saturating_sub(started) >= self.config.flush_interval_ms;
        if due {
            active.flush();
        }
    }

    /// Log a closed segment to the session.
    pub fn segment_closed(&mut self, segment: &ShotSegment) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        // Keep sample rows ahead of the segment that refers to them.
        active.flush();
        active.shot_ids.insert(segment.shot_id.clone());
        active.send(WriterCommand::Segment(segment.clone()));
    }

    /// Log a label change. Ignored for segments outside this recording.
    pub fn label(&mut self, update: &LabelUpdate) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if !active.shot_ids.contains(&update.shot_id) {
            tracing::debug!(shot_id = %update.shot_id, "Label for unrecorded segment ignored");
            return;
        }
        active.send(WriterCommand::Label(update.clone()));
    }

    /// Drain the writer and write `meta.json`.
    pub fn stop(&mut self) -> ShotscopeResult<SessionMeta> {
        let Some(mut active) = self.active.take() else {
            return Err(ShotscopeError::state_conflict("Not recording"));
        };
        active.flush();
        active.send(WriterCommand::Finish);

        let report = active.writer.join().unwrap_or_else(|_| WriterReport {
            rows_written: 0,
            failure: Some("Recorder writer thread panicked".into()),
        });

        let duration_ms = active
            .first_t_ms
            .map_or(0, |first| active.last_t_ms.saturating_sub(first));
        let sample_rate_hz = if duration_ms > 0 && active.sample_count > 1 {
            (active.sample_count - 1) as f64 * 1000.0 / duration_ms as f64
        } else {
            0.0
        };
        let status = if report.failure.is_some() {
            SessionStatus::Failed
        } else {
            SessionStatus::Completed
        };

        let meta = SessionMeta {
            schema_version: SESSION_SCHEMA_VERSION.to_string(),
            id: active.dir.id(),
            name: active.spec.name.clone(),
            created_at: active.created_at.to_rfc3339(),
            finished_at: Utc::now().to_rfc3339(),
            duration_ms,
            sample_count: active.sample_count,
            segment_count: active.shot_ids.len() as u64,
            sample_rate_hz: (sample_rate_hz * 100.0).round() / 100.0,
            accel_range: active.spec.sensor.accel_range.clone(),
            gyro_range: active.spec.sensor.gyro_range.clone(),
            accel_lsb_per_g: active.spec.sensor.accel_lsb_per_g,
            gyro_lsb_per_dps: active.spec.sensor.gyro_lsb_per_dps,
            placement: active.spec.sensor.placement.clone(),
            calibration: active.spec.calibration.clone(),
            status,
            failure: report.failure,
            columns: SessionMeta::default_columns(),
        };
        active.dir.write_meta_once(&meta)?;

        tracing::info!(
            session_id = %meta.id,
            samples = meta.sample_count,
            rows_written = report.rows_written,
            segments = meta.segment_count,
            status = ?meta.status,
            "Recording finalized"
        );
        Ok(meta)
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if self.active.is_some() {
            if let Err(e) = self.stop() {
                tracing::error!(error = %e, "Failed to finalize recording on drop");
            }
        }
    }
}

impl ActiveRecording {
    fn flush(&mut self) {
        self.batch_started_ms = None;
        if self.pending.is_empty() {
            return;
        }
        let capacity = self.pending.len();
        let batch = std::mem::replace(&mut self.pending, Vec::with_capacity(capacity));
        self.send(WriterCommand::Samples(batch));
    }

    fn send(&self, command: WriterCommand) {
        if self.tx.send(command).is_err() && !self.failed.swap(true, Ordering::SeqCst) {
            tracing::error!(session_id = %self.dir.id(), "Recorder writer is gone");
        }
    }
}

fn run_writer(
    mut rx: UnboundedReceiver<WriterCommand>,
    mut csv_writer: csv::Writer<File>,
    dir: SessionDir,
    failed: Arc<AtomicBool>,
) -> WriterReport {
    let mut report = WriterReport::default();
    let fail = |report: &mut WriterReport, message: String| {
        if report.failure.is_none() {
            tracing::error!(session_id = %dir.id(), error = %message, "Session write failed");
            report.failure = Some(message);
        }
        failed.store(true, Ordering::SeqCst);
    };

    while let Some(command) = rx.blocking_recv() {
        match command {
            WriterCommand::Samples(batch) => {
                if report.failure.is_some() {
                    continue;
                }
                let written = batch
                    .iter()
                    .try_for_each(|r| csv_writer.serialize(r))
                    .and_then(|_| csv_writer.flush().map_err(csv::Error::from));
                match written {
                    Ok(()) => report.rows_written += batch.len() as u64,
                    Err(e) => fail(&mut report, format!("data.csv: {e}")),
                }
            }
            WriterCommand::Segment(segment) => {
                if let Err(e) = append_jsonl(&dir.segments_path(), &segment) {
                    fail(&mut report, e.to_string());
                }
            }
            WriterCommand::Label(update) => {
                if let Err(e) = append_jsonl(&dir.labels_path(), &update) {
                    fail(&mut report, e.to_string());
                }
            }
            WriterCommand::Finish => break,
        }
    }

    if let Err(e) = csv_writer.flush() {
        fail(&mut report, format!("data.csv: {e}"));
    }
    report
}
