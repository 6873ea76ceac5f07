//! Replay of a recorded session.
//!
//! The player turns stored rows back into wire lines, so a replay runs
//! through exactly the same ingest and processing path as a live run.

use std::path::Path;

use shotscope_common::error::{ShotscopeError, ShotscopeResult};
use shotscope_ingest::{LineSource, Pacer};
use shotscope_model::record::SampleRecord;
use shotscope_model::sample::CalibrationOffset;
use shotscope_model::session::{SessionDir, SessionMeta};

/// Accepted playback speed range.
pub const MIN_SPEED: f64 = 0.1;
pub const MAX_SPEED: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    /// Nothing loaded.
    Idle,
    Playing,
    Paused,
    /// Loaded, positioned at the start.
    Stopped,
}

struct Loaded {
    dir: SessionDir,
    meta: SessionMeta,
    records: Vec<SampleRecord>,
}

pub struct Player {
    loaded: Option<Loaded>,
    state: PlayerState,
    position: usize,
    pacer: Pacer,
}

impl Default for Player {
    fn default() -> Self {
        Self::new()
    }
}

impl Player {
    pub fn new() -> Self {
        Self {
            loaded: None,
            state: PlayerState::Idle,
            position: 0,
            pacer: Pacer::new(1.0),
        }
    }

    /// Load a finalized session. Replaces any previously loaded one.
    pub fn load(&mut self, root: impl AsRef<Path>) -> ShotscopeResult<&SessionMeta> {
        if matches!(self.state, PlayerState::Playing | PlayerState::Paused) {
            return Err(ShotscopeError::state_conflict(
                "Playback in progress, stop it before loading another session",
            ));
        }
        let dir = SessionDir::open(root)?;
        let meta = dir.read_meta()?;
        let mut reader = csv::Reader::from_path(dir.data_path())?;
        let records = reader
            .deserialize()
            .collect::<Result<Vec<SampleRecord>, _>>()?;
        if records.windows(2).any(|w| w[1].t_ms < w[0].t_ms) {
            return Err(ShotscopeError::playback(format!(
                "Samples in {} are not in time order",
                dir.data_path().display()
            )));
        }

        tracing::info!(
            session_id = %meta.id,
            samples = records.len(),
            duration_ms = meta.duration_ms,
            "Session loaded for replay"
        );
        self.position = 0;
        self.state = PlayerState::Stopped;
        self.pacer.reanchor();
        let loaded = self.loaded.insert(Loaded { dir, meta, records });
        Ok(&loaded.meta)
    }

    fn require_loaded(&self, action: &str) -> ShotscopeResult<&Loaded> {
        self.loaded
            .as_ref()
            .ok_or_else(|| ShotscopeError::state_conflict(format!("Cannot {action}: no session loaded")))
    }

    /// Start playing from the current position (or the start, when stopped).
    pub fn play(&mut self, speed: f64) -> ShotscopeResult<()> {
        self.require_loaded("play")?;
        if !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
            return Err(ShotscopeError::playback(format!(
                "Speed {speed} outside {MIN_SPEED}..={MAX_SPEED}"
            )));
        }
        if self.state == PlayerState::Playing {
            return Err(ShotscopeError::state_conflict("Already playing"));
        }
        if self.state == PlayerState::Stopped {
            self.position = 0;
        }
        self.pacer.set_speed(speed);
        self.state = PlayerState::Playing;
        Ok(())
    }

    pub fn pause(&mut self) -> ShotscopeResult<()> {
        if self.state != PlayerState::Playing {
            return Err(ShotscopeError::state_conflict("Cannot pause: not playing"));
        }
        self.state = PlayerState::Paused;
        Ok(())
    }

    pub fn resume(&mut self) -> ShotscopeResult<()> {
        if self.state != PlayerState::Paused {
            return Err(ShotscopeError::state_conflict("Cannot resume: not paused"));
        }
        self.pacer.reanchor();
        self.state = PlayerState::Playing;
        Ok(())
    }

    /// Stop and rewind.
    pub fn stop(&mut self) -> ShotscopeResult<()> {
        self.require_loaded("stop")?;
        self.position = 0;
        self.state = PlayerState::Stopped;
        self.pacer.reanchor();
        Ok(())
    }

    /// Jump to the first sample at or after `t_ms`, measured from the
    /// session start. Returns that sample's time on the same scale, or
    /// the session end when `t_ms` is past it.
    pub fn seek(&mut self, t_ms: u64) -> ShotscopeResult<u64> {
        let loaded = self.require_loaded("seek")?;
        let start = loaded.records.first().map_or(0, |r| r.t_ms);
        let target = start.saturating_add(t_ms);
        let index = loaded.records.partition_point(|r| r.t_ms < target);
        let landed = loaded
            .records
            .get(index)
            .or(loaded.records.last())
            .map_or(0, |r| r.t_ms.saturating_sub(start));
        self.position = index;
        if self.state == PlayerState::Stopped {
            self.state = PlayerState::Paused;
        }
        self.pacer.reanchor();
        tracing::debug!(t_ms, landed, index, "Replay seek");
        Ok(landed)
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlayerState::Playing
    }

    pub fn speed(&self) -> f64 {
        self.pacer.speed()
    }

    pub fn meta(&self) -> Option<&SessionMeta> {
        self.loaded.as_ref().map(|l| &l.meta)
    }

    pub fn session_id(&self) -> Option<String> {
        self.loaded.as_ref().map(|l| l.dir.id())
    }

    /// Offset that was in force when the session was recorded.
    pub fn calibration(&self) -> Option<&CalibrationOffset> {
        self.meta().map(|m| &m.calibration)
    }

    /// Index of the next sample to emit.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.loaded.as_ref().map_or(0, |l| l.records.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Device time of the last emitted sample, relative to the session start.
    pub fn current_time_ms(&self) -> u64 {
        let Some(loaded) = &self.loaded else {
            return 0;
        };
        let start = loaded.records.first().map_or(0, |r| r.t_ms);
        match self.position.checked_sub(1).and_then(|i| loaded.records.get(i)) {
            Some(r) => r.t_ms.saturating_sub(start),
            None => 0,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.meta().map_or(0, |m| m.duration_ms)
    }

    /// First sample time of the loaded session.
    pub fn start_ms(&self) -> Option<u64> {
        self.loaded.as_ref()?.records.first().map(|r| r.t_ms)
    }

    /// Emit the next line without pacing.
    fn advance(&mut self) -> Option<String> {
        let loaded = self.loaded.as_ref()?;
        match loaded.records.get(self.position) {
            Some(record) => {
                self.position += 1;
                Some(record.raw_sample().to_line())
            }
            None => {
                tracing::info!(session_id = %loaded.dir.id(), "Replay finished");
                self.position = 0;
                self.state = PlayerState::Stopped;
                None
            }
        }
    }

    /// All remaining lines at once, ignoring the speed. Leaves the player stopped.
    pub fn drain_lines(&mut self) -> ShotscopeResult<Vec<String>> {
        if self.state != PlayerState::Playing {
            return Err(ShotscopeError::state_conflict("Cannot drain: not playing"));
        }
        let mut lines = Vec::with_capacity(self.len().saturating_sub(self.position));
        while let Some(line) = self.advance() {
            lines.push(line);
        }
        Ok(lines)
    }
}

#[async_trait::async_trait]
impl LineSource for Player {
    /// Paced by recorded device time. Yields `None` at the end of the
    /// session or when not playing.
    async fn next_line(&mut self) -> ShotscopeResult<Option<String>> {
        if self.state != PlayerState::Playing {
            return Ok(None);
        }
        let next_t = self
            .loaded
            .as_ref()
            .and_then(|l| l.records.get(self.position))
            .map(|r| r.t_ms);
        if let Some(t_ms) = next_t {
            self.pacer.wait_for(t_ms).await;
        }
        Ok(self.advance())
    }

    fn name(&self) -> &str {
        "replay"
    }
}
