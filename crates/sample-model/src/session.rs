//! Recorded session metadata and on-disk layout.
//!
//! A session is a directory:
//!
//! ```text
//! <sessions_dir>/<session_id>/
//!   data.csv        one row per processed sample (append-only)
//!   segments.jsonl  closed shot segments, appended as they close
//!   labels.jsonl    label updates, append-only
//!   meta.json       written once when the recording is finalized
//! ```

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shotscope_common::config::SensorPlacement;
use shotscope_common::error::ShotscopeError;

use crate::record::SAMPLE_COLUMNS;
use crate::sample::CalibrationOffset;
use crate::segment::{LabelUpdate, ShotSegment};

/// Current `meta.json` schema version.
pub const SESSION_SCHEMA_VERSION: &str = "1.0";

/// Final state of a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// All samples were written.
    Completed,
    /// Storage failed while recording; the data file may be incomplete.
    Failed,
}

/// Contents of `meta.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub schema_version: String,
    pub id: String,
    pub name: String,
    /// Recording start (ISO 8601).
    pub created_at: String,
    /// Recording stop (ISO 8601).
    pub finished_at: String,
    /// Device time covered by the samples (ms).
    pub duration_ms: u64,
    pub sample_count: u64,
    pub segment_count: u64,
    /// Effective rate derived from sample timestamps.
    pub sample_rate_hz: f64,
    pub accel_range: String,
    pub gyro_range: String,
    pub accel_lsb_per_g: f64,
    pub gyro_lsb_per_dps: f64,
    pub placement: SensorPlacement,
    /// Gyro offset in force when recording started.
    #[serde(default)]
    pub calibration: CalibrationOffset,
    pub status: SessionStatus,
    #[serde(default)]
    pub failure: Option<String>,
    pub columns: Vec<String>,
}

impl SessionMeta {
    /// Column list of the sample file.
    pub fn default_columns() -> Vec<String> {
        SAMPLE_COLUMNS.iter().map(|c| c.to_string()).collect()
    }
}

/// Summary of a session for listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub name: String,
    pub created_at: String,
    pub duration_ms: u64,
    pub sample_count: u64,
    pub segment_count: u64,
    pub status: SessionStatus,
    pub placement: SensorPlacement,
    pub path: PathBuf,
}

/// Errors that can occur when reading or writing a session directory.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Session metadata already finalized: {path}")]
    AlreadyFinalized { path: PathBuf },

    #[error("Invalid session: {message}")]
    ValidationError { message: String },
}

impl From<SessionError> for ShotscopeError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::IoError { source, .. }
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                ShotscopeError::not_found(source.to_string())
            }
            SessionError::ValidationError { message } => ShotscopeError::not_found(message),
            other => ShotscopeError::storage(other.to_string()),
        }
    }
}

/// Handle on one session directory.
#[derive(Debug, Clone)]
pub struct SessionDir {
    root: PathBuf,
}

impl SessionDir {
    pub const DATA_FILE: &'static str = "data.csv";
    pub const META_FILE: &'static str = "meta.json";
    pub const SEGMENTS_FILE: &'static str = "segments.jsonl";
    pub const LABELS_FILE: &'static str = "labels.jsonl";

    /// Wrap a path without touching the filesystem.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Create a fresh directory for `id` under `sessions_dir`.
    /// A numeric suffix is added if the id is already taken.
    pub fn create(sessions_dir: impl AsRef<Path>, id: &str) -> Result<Self, SessionError> {
        let sessions_dir = sessions_dir.as_ref();
        std::fs::create_dir_all(sessions_dir).map_err(|e| SessionError::IoError {
            path: sessions_dir.to_path_buf(),
            source: e,
        })?;

        let mut root = sessions_dir.join(id);
        let mut suffix = 1;
        while root.exists() {
            suffix += 1;
            root = sessions_dir.join(format!("{id}_{suffix}"));
        }
        std::fs::create_dir(&root).map_err(|e| SessionError::IoError {
            path: root.clone(),
            source: e,
        })?;
        Ok(Self { root })
    }

    /// Open a finalized session. Both the data file and metadata must exist.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, SessionError> {
        let dir = Self::new(root);
        for required in [dir.data_path(), dir.meta_path()] {
            if !required.exists() {
                return Err(SessionError::ValidationError {
                    message: format!("missing {}", required.display()),
                });
            }
        }
        Ok(dir)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Session id (the directory name).
    pub fn id(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn data_path(&self) -> PathBuf {
        self.root.join(Self::DATA_FILE)
    }

    pub fn meta_path(&self) -> PathBuf {
        self.root.join(Self::META_FILE)
    }

    pub fn segments_path(&self) -> PathBuf {
        self.root.join(Self::SEGMENTS_FILE)
    }

    pub fn labels_path(&self) -> PathBuf {
        self.root.join(Self::LABELS_FILE)
    }

    pub fn is_finalized(&self) -> bool {
        self.meta_path().exists()
    }

    pub fn read_meta(&self) -> Result<SessionMeta, SessionError> {
        let path = self.meta_path();
        let json = std::fs::read_to_string(&path).map_err(|e| SessionError::IoError {
            path: path.clone(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| SessionError::ParseError { path, source: e })
    }

    /// Write `meta.json`. Fails if it already exists.
    pub fn write_meta_once(&self, meta: &SessionMeta) -> Result<(), SessionError> {
        let path = self.meta_path();
        let json = serde_json::to_string_pretty(meta).map_err(|e| SessionError::ParseError {
            path: path.clone(),
            source: e,
        })?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    SessionError::AlreadyFinalized { path: path.clone() }
                } else {
                    SessionError::IoError {
                        path: path.clone(),
                        source: e,
                    }
                }
            })?;
        file.write_all(json.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| SessionError::IoError { path, source: e })
    }

    /// Closed segments as written during recording (labels not applied).
    pub fn read_segments(&self) -> Result<Vec<ShotSegment>, SessionError> {
        read_jsonl(&self.segments_path())
    }

    /// Label log in append order.
    pub fn read_labels(&self) -> Result<Vec<LabelUpdate>, SessionError> {
        read_jsonl(&self.labels_path())
    }

    /// Append one label update to the label log of a finalized session.
    pub fn append_label(&self, update: &LabelUpdate) -> Result<(), SessionError> {
        if !self.is_finalized() {
            return Err(SessionError::ValidationError {
                message: format!("session {} is not finalized", self.id()),
            });
        }
        let known = self
            .read_segments()?
            .iter()
            .any(|s| s.shot_id == update.shot_id);
        if !known {
            return Err(SessionError::ValidationError {
                message: format!("segment {} not in session {}", update.shot_id, self.id()),
            });
        }
        append_jsonl(&self.labels_path(), update)
    }

    /// Segments with every logged label update applied in order.
    pub fn labeled_segments(&self) -> Result<Vec<ShotSegment>, SessionError> {
        let mut segments = self.read_segments()?;
        for update in self.read_labels()? {
            if let Some(seg) = segments.iter_mut().find(|s| s.shot_id == update.shot_id) {
                seg.apply_label(update.label, update.t_label_ms, update.source);
            }
        }
        Ok(segments)
    }

    /// Listing summary built from `meta.json`.
    pub fn info(&self) -> Result<SessionInfo, SessionError> {
        let meta = self.read_meta()?;
        Ok(SessionInfo {
            id: meta.id,
            name: meta.name,
            created_at: meta.created_at,
            duration_ms: meta.duration_ms,
            sample_count: meta.sample_count,
            segment_count: meta.segment_count,
            status: meta.status,
            placement: meta.placement,
            path: self.root.clone(),
        })
    }
}

/// `{name}_{YYYYmmdd_HHMMSS}` with the name reduced to filesystem-safe characters.
pub fn make_session_id(name: &str, at: DateTime<Utc>) -> String {
    let mut clean: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if clean.is_empty() {
        clean = "session".to_string();
    }
    format!("{clean}_{}", at.format("%Y%m%d_%H%M%S"))
}

/// Append one JSON line to `path`, creating the file if needed.
pub fn append_jsonl<T: Serialize>(path: &Path, value: &T) -> Result<(), SessionError> {
    let json = serde_json::to_string(value).map_err(|e| SessionError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| SessionError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
    writeln!(file, "{json}").map_err(|e| SessionError::IoError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Read a JSONL file. A missing file is empty; blank and `#` lines are skipped.
fn read_jsonl<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>, SessionError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = std::fs::File::open(path).map_err(|e| SessionError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut items = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| SessionError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        items.push(
            serde_json::from_str(line).map_err(|e| SessionError::ParseError {
                path: path.to_path_buf(),
                source: e,
            })?,
        );
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{LabelSource, ShotLabel};
    use chrono::TimeZone;

    fn meta(id: &str) -> SessionMeta {
        SessionMeta {
            schema_version: SESSION_SCHEMA_VERSION.to_string(),
            id: id.to_string(),
            name: "practice".to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            finished_at: "2026-01-01T00:01:00Z".to_string(),
            duration_ms: 60_000,
            sample_count: 6000,
            segment_count: 1,
            sample_rate_hz: 100.0,
            accel_range: "2g".to_string(),
            gyro_range: "250dps".to_string(),
            accel_lsb_per_g: 16384.0,
            gyro_lsb_per_dps: 131.0,
            placement: SensorPlacement::default(),
            calibration: CalibrationOffset::default(),
            status: SessionStatus::Completed,
            failure: None,
            columns: SessionMeta::default_columns(),
        }
    }

    fn temp_sessions(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(name);
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_make_session_id() {
        let at = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(make_session_id("free throws", at), "free_throws_20260304_050607");
        assert_eq!(make_session_id("  ", at), "session_20260304_050607");
        assert_eq!(make_session_id("../x", at), "___x_20260304_050607");
    }

    proptest::proptest! {
        #[test]
        fn test_session_id_is_a_single_path_component(name in ".{0,40}") {
            let at = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
            let id = make_session_id(&name, at);
            proptest::prop_assert!(id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
            proptest::prop_assert!(id.ends_with("_20260304_050607"));
        }
    }

    #[test]
    fn test_create_adds_suffix_when_taken() {
        let dir = temp_sessions("shotscope_test_session_suffix");
        let a = SessionDir::create(&dir, "s").unwrap();
        let b = SessionDir::create(&dir, "s").unwrap();
        assert_eq!(a.id(), "s");
        assert_eq!(b.id(), "s_2");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_meta_written_once() {
        let dir = temp_sessions("shotscope_test_session_meta");
        let session = SessionDir::create(&dir, "once").unwrap();
        session.write_meta_once(&meta("once")).unwrap();
        assert_eq!(session.read_meta().unwrap().sample_count, 6000);

        let err = session.write_meta_once(&meta("once")).unwrap_err();
        assert!(matches!(err, SessionError::AlreadyFinalized { .. }));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_open_requires_both_files() {
        let dir = temp_sessions("shotscope_test_session_open");
        let session = SessionDir::create(&dir, "partial").unwrap();
        session.write_meta_once(&meta("partial")).unwrap();
        assert!(SessionDir::open(session.root()).is_err());

        std::fs::write(session.data_path(), "seq\n").unwrap();
        assert!(SessionDir::open(session.root()).is_ok());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_label_log_applies_in_order() {
        let dir = temp_sessions("shotscope_test_session_labels");
        let session = SessionDir::create(&dir, "labels").unwrap();

        let mut seg = ShotSegment::open(100);
        seg.t_end = Some(700);
        append_jsonl(&session.segments_path(), &seg).unwrap();

        let update = LabelUpdate::new(&seg.shot_id, ShotLabel::Good, LabelSource::Manual, None);
        // Not finalized yet.
        assert!(session.append_label(&update).is_err());

        session.write_meta_once(&meta("labels")).unwrap();
        session.append_label(&update).unwrap();
        session
            .append_label(&LabelUpdate::new(
                &seg.shot_id,
                ShotLabel::Bad,
                LabelSource::Manual,
                None,
            ))
            .unwrap();

        let labeled = session.labeled_segments().unwrap();
        assert_eq!(labeled.len(), 1);
        assert_eq!(labeled[0].label, ShotLabel::Bad);
        assert_eq!(session.read_labels().unwrap().len(), 2);

        let unknown = LabelUpdate::new("nope", ShotLabel::Good, LabelSource::Manual, None);
        assert!(session.append_label(&unknown).is_err());

        std::fs::remove_dir_all(&dir).ok();
    }
}
