//! Session directory management: list, inspect, label, delete.

use std::path::{Path, PathBuf};

use serde::Serialize;
use shotscope_common::error::{ShotscopeError, ShotscopeResult};
use shotscope_model::segment::{LabelCounts, LabelSource, LabelUpdate, ShotLabel, ShotSegment};
use shotscope_model::session::{SessionDir, SessionInfo, SessionMeta};

/// Everything `info` shows about one session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub meta: SessionMeta,
    /// Segments with all label updates applied.
    pub segments: Vec<ShotSegment>,
    pub labels: LabelCounts,
}

/// Map a session id or path to its directory.
///
/// An existing directory path is used as is; anything else is taken as
/// an id under `sessions_dir`.
pub fn resolve_session(sessions_dir: &Path, id_or_path: &str) -> ShotscopeResult<PathBuf> {
    let as_path = Path::new(id_or_path);
    if as_path.is_dir() && as_path.join(SessionDir::META_FILE).exists() {
        return Ok(as_path.to_path_buf());
    }
    if id_or_path.is_empty()
        || id_or_path.contains(['/', '\\'])
        || id_or_path == "."
        || id_or_path == ".."
    {
        return Err(ShotscopeError::not_found(format!(
            "No session at {id_or_path}"
        )));
    }
    let path = sessions_dir.join(id_or_path);
    if !path.is_dir() {
        return Err(ShotscopeError::not_found(format!(
            "Session {id_or_path} not found in {}",
            sessions_dir.display()
        )));
    }
    Ok(path)
}

/// Finalized sessions, newest first. Unreadable sessions are skipped.
pub fn list_sessions(sessions_dir: &Path) -> ShotscopeResult<Vec<SessionInfo>> {
    if !sessions_dir.exists() {
        return Ok(Vec::new());
    }
    let mut sessions = Vec::new();
    for entry in std::fs::read_dir(sessions_dir)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        match SessionDir::open(&path).and_then(|dir| dir.info()) {
            Ok(info) => sessions.push(info),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping session"),
        }
    }
    sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    Ok(sessions)
}

/// Metadata plus labeled segments of one session.
pub fn load_summary(session: &Path) -> ShotscopeResult<SessionSummary> {
    let dir = SessionDir::open(session)?;
    let meta = dir.read_meta()?;
    let segments = dir.labeled_segments()?;
    let labels = LabelCounts::tally(&segments);
    Ok(SessionSummary {
        meta,
        segments,
        labels,
    })
}

/// Manually label one segment of a finalized session.
pub fn label_session(
    session: &Path,
    shot_id: &str,
    label: ShotLabel,
) -> ShotscopeResult<LabelUpdate> {
    let dir = SessionDir::open(session)?;
    let update = LabelUpdate::new(shot_id, label, LabelSource::Manual, None);
    dir.append_label(&update)?;
    tracing::info!(session_id = %dir.id(), %shot_id, %label, "Segment relabeled");
    Ok(update)
}

/// Remove a session directory and everything in it.
pub fn delete_session(session: &Path) -> ShotscopeResult<()> {
    let dir = SessionDir::new(session);
    if !dir.data_path().exists() && !dir.meta_path().exists() {
        return Err(ShotscopeError::not_found(format!(
            "{} is not a session directory",
            session.display()
        )));
    }
    std::fs::remove_dir_all(session).map_err(|e| {
        ShotscopeError::storage(format!("Cannot delete {}: {e}", session.display()))
    })?;
    tracing::info!(session_id = %dir.id(), "Session deleted");
    Ok(())
}
