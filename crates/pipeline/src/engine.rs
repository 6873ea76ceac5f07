//! Async runtime around the [`Pipeline`].
//!
//! The engine task owns the pipeline, the replay player and at most one
//! active line source. Control requests arrive as [`Command`]s on an mpsc
//! channel, each carrying a oneshot for the reply, and are handled
//! between samples.

use std::path::PathBuf;
use std::time::Duration;

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use shotscope_common::clock::RecordingClock;
use shotscope_common::config::AppConfig;
use shotscope_common::error::{ShotscopeError, ShotscopeResult};
use shotscope_ingest::LineSource;
use shotscope_model::segment::{ShotLabel, ShotSegment};
use shotscope_model::session::SessionMeta;
use shotscope_model::stats::Stats;
use shotscope_session::{Player, PlayerState};

use crate::coordinator::{Pipeline, PipelineStatus, ReplayStatus, SourceKind};
use crate::hub::{LiveFeed, LiveSubscriber};

const COMMAND_CAPACITY: usize = 32;

/// Lines handled back to back before yielding to the runtime.
const LINES_PER_YIELD: u32 = 256;

type Reply<T> = oneshot::Sender<ShotscopeResult<T>>;

/// A control request for the engine task.
pub enum Command {
    StartLive {
        source: Box<dyn LineSource>,
        response: Reply<()>,
    },
    StopSource {
        response: Reply<()>,
    },
    LoadReplay {
        path: PathBuf,
        response: Reply<SessionMeta>,
    },
    Play {
        speed: f64,
        response: Reply<()>,
    },
    Pause {
        response: Reply<()>,
    },
    Resume {
        response: Reply<()>,
    },
    StopReplay {
        response: Reply<()>,
    },
    Seek {
        t_ms: u64,
        response: Reply<u64>,
    },
    StartRecording {
        name: String,
        response: Reply<String>,
    },
    StopRecording {
        response: Reply<SessionMeta>,
    },
    StartCalibration {
        duration_ms: Option<u64>,
        response: Reply<()>,
    },
    AbortCalibration {
        response: Reply<()>,
    },
    PatchLabel {
        shot_id: String,
        label: ShotLabel,
        response: Reply<ShotSegment>,
    },
    Stats {
        response: oneshot::Sender<Stats>,
    },
    ResetStats {
        response: oneshot::Sender<()>,
    },
    Segments {
        response: oneshot::Sender<Vec<ShotSegment>>,
    },
    Status {
        response: oneshot::Sender<PipelineStatus>,
    },
    Shutdown {
        response: oneshot::Sender<()>,
    },
}

enum ActiveSource {
    None,
    Live(Box<dyn LineSource>),
    Replay,
}

impl ActiveSource {
    fn kind(&self) -> SourceKind {
        match self {
            Self::None => SourceKind::None,
            Self::Live(_) => SourceKind::Live,
            Self::Replay => SourceKind::Replay,
        }
    }
}

pub struct Engine {
    pipeline: Pipeline,
    player: Player,
    source: ActiveSource,
    commands: mpsc::Receiver<Command>,
    source_state: watch::Sender<SourceKind>,
    clock: RecordingClock,
    stat_interval: Duration,
}

/// Cloneable client for a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Command>,
    feed: LiveFeed,
    source_state: watch::Receiver<SourceKind>,
}

impl Engine {
    pub fn new(config: AppConfig) -> ShotscopeResult<(Self, EngineHandle)> {
        let stat_interval = Duration::from_millis(config.live.stat_interval_ms.max(1));
        let pipeline = Pipeline::new(config)?;
        let (tx, commands) = mpsc::channel(COMMAND_CAPACITY);
        let (source_state, source_rx) = watch::channel(SourceKind::None);
        let handle = EngineHandle {
            tx,
            feed: pipeline.feed(),
            source_state: source_rx,
        };
        let engine = Self {
            pipeline,
            player: Player::new(),
            source: ActiveSource::None,
            commands,
            source_state,
            clock: RecordingClock::start(),
            stat_interval,
        };
        Ok((engine, handle))
    }

    /// Spawn the engine on the current runtime.
    pub fn spawn(config: AppConfig) -> ShotscopeResult<(EngineHandle, JoinHandle<()>)> {
        let (engine, handle) = Self::new(config)?;
        Ok((handle, tokio::spawn(engine.run())))
    }

    /// Run until shut down or every handle is dropped.
    pub async fn run(mut self) {
        tracing::info!("Engine started");
        let mut stat_tick = tokio::time::interval(self.stat_interval);
        stat_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut burst = 0u32;

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::Shutdown { response }) => {
                        self.shutdown();
                        let _ = response.send(());
                        return;
                    }
                    Some(command) => self.handle(command),
                    None => break,
                },

                // Polled ahead of lines so a source that is always ready
                // cannot starve it.
                _ = stat_tick.tick() => {
                    self.pipeline.publish_stats(self.clock.elapsed_ns());
                }

                line = next_line(&mut self.source, &mut self.player) => {
                    self.on_line(line);
                    burst += 1;
                    if burst >= LINES_PER_YIELD {
                        burst = 0;
                        tokio::task::yield_now().await;
                    }
                }
            }
        }
        self.shutdown();
    }

    fn on_line(&mut self, line: ShotscopeResult<Option<String>>) {
        match line {
            Ok(Some(line)) => {
                self.pipeline.ingest_line(&line, self.clock.elapsed_ns());
            }
            Ok(None) => {
                tracing::info!(source = ?self.source.kind(), "Source exhausted");
                self.set_source(ActiveSource::None);
            }
            Err(ShotscopeError::Ingest { message }) => {
                tracing::debug!(%message, "Unreadable line");
                self.pipeline.record_unreadable();
            }
            Err(e) => {
                tracing::error!(error = %e, "Source failed, detaching");
                self.set_source(ActiveSource::None);
            }
        }
    }

    fn set_source(&mut self, source: ActiveSource) {
        let kind = source.kind();
        self.source = source;
        self.pipeline.set_source(kind);
        self.source_state.send_replace(kind);
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::StartLive { source, response } => {
                let _ = response.send(self.start_live(source));
            }
            Command::StopSource { response } => {
                let _ = response.send(self.stop_source());
            }
            Command::LoadReplay { path, response } => {
                let _ = response.send(self.load_replay(path));
            }
            Command::Play { speed, response } => {
                let _ = response.send(self.play(speed));
            }
            Command::Pause { response } => {
                let _ = response.send(self.player.pause());
            }
            Command::Resume { response } => {
                let result = self.player.resume();
                if result.is_ok() {
                    self.set_source(ActiveSource::Replay);
                }
                let _ = response.send(result);
            }
            Command::StopReplay { response } => {
                let result = self.player.stop();
                if result.is_ok() && matches!(self.source, ActiveSource::Replay) {
                    self.set_source(ActiveSource::None);
                }
                let _ = response.send(result);
            }
            Command::Seek { t_ms, response } => {
                let _ = response.send(self.seek(t_ms));
            }
            Command::StartRecording { name, response } => {
                let _ = response.send(self.pipeline.start_recording(&name));
            }
            Command::StopRecording { response } => {
                let _ = response.send(self.stop_recording());
            }
            Command::StartCalibration {
                duration_ms,
                response,
            } => {
                let _ = response.send(self.pipeline.start_calibration(duration_ms));
            }
            Command::AbortCalibration { response } => {
                let _ = response.send(self.pipeline.abort_calibration());
            }
            Command::PatchLabel {
                shot_id,
                label,
                response,
            } => {
                let _ = response.send(self.pipeline.patch_label(&shot_id, label));
            }
            Command::Stats { response } => {
                let _ = response.send(self.pipeline.stats());
            }
            Command::ResetStats { response } => {
                self.pipeline.reset_stats();
                let _ = response.send(());
            }
            Command::Segments { response } => {
                let _ = response.send(self.pipeline.segments().to_vec());
            }
            Command::Status { response } => {
                let _ = response.send(self.status());
            }
            Command::Shutdown { response } => {
                // Handled in the run loop.
                let _ = response.send(());
            }
        }
    }

    fn replay_active(&self) -> bool {
        matches!(self.player.state(), PlayerState::Playing | PlayerState::Paused)
    }

    fn start_live(&mut self, source: Box<dyn LineSource>) -> ShotscopeResult<()> {
        match self.source {
            ActiveSource::Live(ref active) => {
                return Err(ShotscopeError::state_conflict(format!(
                    "Live source {} already active",
                    active.name()
                )))
            }
            ActiveSource::Replay => {
                return Err(ShotscopeError::state_conflict("Replay in progress"));
            }
            ActiveSource::None if self.replay_active() => {
                return Err(ShotscopeError::state_conflict("Replay in progress"));
            }
            ActiveSource::None => {}
        }
        tracing::info!(source = %source.name(), "Live source attached");
        self.pipeline.begin_run(SourceKind::Live);
        self.set_source(ActiveSource::Live(source));
        Ok(())
    }

    fn stop_source(&mut self) -> ShotscopeResult<()> {
        match self.source {
            ActiveSource::None => Err(ShotscopeError::state_conflict("No active source")),
            ActiveSource::Live(_) => {
                self.set_source(ActiveSource::None);
                Ok(())
            }
            ActiveSource::Replay => {
                self.player.stop()?;
                self.set_source(ActiveSource::None);
                Ok(())
            }
        }
    }

    fn load_replay(&mut self, path: PathBuf) -> ShotscopeResult<SessionMeta> {
        if matches!(self.source, ActiveSource::Live(_)) {
            return Err(ShotscopeError::state_conflict("Live source active"));
        }
        self.player.load(&path).cloned()
    }

    fn play(&mut self, speed: f64) -> ShotscopeResult<()> {
        if matches!(self.source, ActiveSource::Live(_)) {
            return Err(ShotscopeError::state_conflict("Live source active"));
        }
        let fresh = self.player.state() == PlayerState::Stopped;
        self.player.play(speed)?;
        if fresh {
            self.pipeline.begin_run(SourceKind::Replay);
            if let Some(offset) = self.player.calibration().cloned() {
                self.pipeline.set_calibration(offset);
            }
        }
        tracing::info!(
            session_id = ?self.player.session_id(),
            speed,
            "Replay playing"
        );
        self.set_source(ActiveSource::Replay);
        Ok(())
    }

    fn seek(&mut self, t_ms: u64) -> ShotscopeResult<u64> {
        if matches!(self.source, ActiveSource::Live(_)) {
            return Err(ShotscopeError::state_conflict("Live source active"));
        }
        let fresh = self.player.state() == PlayerState::Stopped;
        let landed = self.player.seek(t_ms)?;
        if fresh {
            self.pipeline.begin_run(SourceKind::Replay);
        } else {
            self.pipeline.reset_stream_state();
            let start = self.player.start_ms().unwrap_or(0);
            self.pipeline.rewind_shots(start.saturating_add(landed));
        }
        if let Some(offset) = self.player.calibration().cloned() {
            self.pipeline.set_calibration(offset);
        }
        if !matches!(self.source, ActiveSource::Replay) {
            self.set_source(ActiveSource::Replay);
        }
        Ok(landed)
    }

    /// Stopping joins the writer thread, which waits on disk.
    fn stop_recording(&mut self) -> ShotscopeResult<SessionMeta> {
        let pipeline = &mut self.pipeline;
        blocking(|| pipeline.stop_recording())
    }

    fn status(&self) -> PipelineStatus {
        let mut status = self.pipeline.status();
        status.replay = self.player.session_id().map(|session_id| ReplayStatus {
            session_id,
            state: self.player.state(),
            position_ms: self.player.current_time_ms(),
            duration_ms: self.player.duration_ms(),
            speed: self.player.speed(),
        });
        status
    }

    fn shutdown(&mut self) {
        if self.pipeline.is_recording() {
            match self.stop_recording() {
                Ok(meta) => tracing::info!(session_id = %meta.id, "Recording finalized at shutdown"),
                Err(e) => tracing::error!(error = %e, "Failed to finalize recording at shutdown"),
            }
        }
        self.set_source(ActiveSource::None);
        tracing::info!("Engine stopped");
    }
}

/// Run `f` off the async workers where the runtime allows it.
/// `block_in_place` panics on a current-thread runtime, so there `f` runs
/// inline.
fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

/// Next line from whatever is active. Pends forever when nothing is.
async fn next_line(
    source: &mut ActiveSource,
    player: &mut Player,
) -> ShotscopeResult<Option<String>> {
    match source {
        ActiveSource::Live(live) => live.next_line().await,
        ActiveSource::Replay if player.is_playing() => player.next_line().await,
        _ => std::future::pending().await,
    }
}

impl EngineHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> ShotscopeResult<T> {
        let (response, rx) = oneshot::channel();
        self.tx
            .send(make(response))
            .await
            .map_err(|_| ShotscopeError::processing("Engine is not running"))?;
        rx.await
            .map_err(|_| ShotscopeError::processing("Engine dropped the request"))
    }

    pub fn subscribe(&self) -> LiveSubscriber {
        self.feed.subscribe()
    }

    /// Watch which source is feeding the pipeline.
    pub fn source_state(&self) -> watch::Receiver<SourceKind> {
        self.source_state.clone()
    }

    /// Wait until no source is active.
    pub async fn wait_source_idle(&self) {
        let mut rx = self.source_state.clone();
        let _ = rx.wait_for(|kind| *kind == SourceKind::None).await;
    }

    pub async fn start_live(&self, source: Box<dyn LineSource>) -> ShotscopeResult<()> {
        self.request(|response| Command::StartLive { source, response })
            .await?
    }

    pub async fn stop_source(&self) -> ShotscopeResult<()> {
        self.request(|response| Command::StopSource { response }).await?
    }

    pub async fn load_replay(&self, path: impl Into<PathBuf>) -> ShotscopeResult<SessionMeta> {
        let path = path.into();
        self.request(|response| Command::LoadReplay { path, response })
            .await?
    }

    pub async fn play(&self, speed: f64) -> ShotscopeResult<()> {
        self.request(|response| Command::Play { speed, response })
            .await?
    }

    pub async fn pause(&self) -> ShotscopeResult<()> {
        self.request(|response| Command::Pause { response }).await?
    }

    pub async fn resume(&self) -> ShotscopeResult<()> {
        self.request(|response| Command::Resume { response }).await?
    }

    pub async fn stop_replay(&self) -> ShotscopeResult<()> {
        self.request(|response| Command::StopReplay { response })
            .await?
    }

    pub async fn seek(&self, t_ms: u64) -> ShotscopeResult<u64> {
        self.request(|response| Command::Seek { t_ms, response })
            .await?
    }

    pub async fn start_recording(&self, name: impl Into<String>) -> ShotscopeResult<String> {
        let name = name.into();
        self.request(|response| Command::StartRecording { name, response })
            .await?
    }

    pub async fn stop_recording(&self) -> ShotscopeResult<SessionMeta> {
        self.request(|response| Command::StopRecording { response })
            .await?
    }

    pub async fn start_calibration(&self, duration_ms: Option<u64>) -> ShotscopeResult<()> {
        self.request(|response| Command::StartCalibration {
            duration_ms,
            response,
        })
        .await?
    }

    pub async fn abort_calibration(&self) -> ShotscopeResult<()> {
        self.request(|response| Command::AbortCalibration { response })
            .await?
    }

    pub async fn patch_label(
        &self,
        shot_id: impl Into<String>,
        label: ShotLabel,
    ) -> ShotscopeResult<ShotSegment> {
        let shot_id = shot_id.into();
        self.request(|response| Command::PatchLabel {
            shot_id,
            label,
            response,
        })
        .await?
    }

    pub async fn stats(&self) -> ShotscopeResult<Stats> {
        self.request(|response| Command::Stats { response }).await
    }

    pub async fn reset_stats(&self) -> ShotscopeResult<()> {
        self.request(|response| Command::ResetStats { response }).await
    }

    pub async fn segments(&self) -> ShotscopeResult<Vec<ShotSegment>> {
        self.request(|response| Command::Segments { response }).await
    }

    pub async fn status(&self) -> ShotscopeResult<PipelineStatus> {
        self.request(|response| Command::Status { response }).await
    }

    /// Finalize any recording and stop the engine task.
    pub async fn shutdown(&self) -> ShotscopeResult<()> {
        self.request(|response| Command::Shutdown { response }).await
    }
}
