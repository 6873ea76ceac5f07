use std::path::PathBuf;
use std::time::Duration;

use shotscope_common::config::AppConfig;
use shotscope_common::error::ShotscopeResult;
use shotscope_ingest::{practice_session, LineSource, StubSource, SyntheticSource, TraceBuilder};
use shotscope_model::message::{LiveMessage, RecordingStatus, SegmentEvent};
use shotscope_model::segment::ShotLabel;
use shotscope_pipeline::{Engine, EngineHandle, SourceKind};
use shotscope_session::PlayerState;

fn config(name: &str) -> AppConfig {
    let sessions_dir: PathBuf = std::env::temp_dir().join(format!("shotscope_engine_{name}"));
    let _ = std::fs::remove_dir_all(&sessions_dir);
    AppConfig {
        sessions_dir,
        ..AppConfig::default()
    }
}

fn spawn(name: &str) -> (EngineHandle, AppConfig) {
    let config = config(name);
    let (handle, _task) = Engine::spawn(config.clone()).expect("engine starts");
    (handle, config)
}

/// A device that never stops sending, with every line ready at once.
struct Firehose {
    seq: u32,
}

#[async_trait::async_trait]
impl LineSource for Firehose {
    async fn next_line(&mut self) -> ShotscopeResult<Option<String>> {
        self.seq = self.seq.wrapping_add(1);
        Ok(Some(format!(
            "{},{},0,0.0,0.0,1.0,0.0,0.0,0.0,0.0,0.0,1.0,0.0,0.0,0.0",
            self.seq,
            self.seq.wrapping_mul(10)
        )))
    }

    fn name(&self) -> &str {
        "firehose"
    }
}

#[tokio::test]
async fn test_live_source_runs_to_completion() {
    let (engine, _) = spawn("live");
    let mut sub = engine.subscribe();
    let samples = practice_session(3);
    let total = samples.len() as u64;

    engine
        .start_live(Box::new(SyntheticSource::unpaced(samples)))
        .await
        .unwrap();
    engine.wait_source_idle().await;

    let segments = engine.segments().await.unwrap();
    assert_eq!(segments.len(), 3);
    assert!(segments.iter().all(|s| s.t_end.is_some()));
    assert!(segments.iter().all(|s| s.label == ShotLabel::Good));

    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.received, total);
    assert_eq!(stats.parse_err, 0);

    let mut ends = 0;
    while let Some(msg) = sub.try_recv() {
        if let LiveMessage::Segment {
            event: SegmentEvent::End,
            ..
        } = msg.as_ref()
        {
            ends += 1;
            let json = serde_json::to_value(msg.as_ref()).unwrap();
            assert_eq!(json["type"], "segment");
            assert_eq!(json["event"], "end");
            assert!(json["data"]["t_end"].is_u64());
        }
    }
    assert_eq!(ends, 3);
    assert_eq!(*engine.source_state().borrow(), SourceKind::None);
    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_live_and_replay_are_exclusive() {
    let (engine, config) = spawn("exclusive");
    engine
        .start_live(Box::new(SyntheticSource::paced(practice_session(3), 1.0)))
        .await
        .unwrap();
    assert_eq!(*engine.source_state().borrow(), SourceKind::Live);

    let err = engine
        .start_live(Box::new(StubSource::empty()))
        .await
        .unwrap_err();
    assert!(err.is_state_conflict());
    let err = engine
        .load_replay(config.sessions_dir.join("nothing"))
        .await
        .unwrap_err();
    assert!(err.is_state_conflict());
    assert!(engine.seek(0).await.unwrap_err().is_state_conflict());

    engine.stop_source().await.unwrap();
    assert!(engine.stop_source().await.unwrap_err().is_state_conflict());
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unreadable_lines_are_counted() {
    let (engine, _) = spawn("unreadable");
    engine
        .start_live(Box::new(StubSource::new([
            "# proto=1",
            "garbage",
            "1,2,3",
            "",
        ])))
        .await
        .unwrap();
    engine.wait_source_idle().await;
    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.received, 0);
    assert_eq!(stats.parse_err, 2);
    assert_eq!(stats.status_lines, 1);
    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_record_then_replay_through_engine() {
    let (engine, config) = spawn("record_replay");
    let mut sub = engine.subscribe();

    let id = engine.start_recording("drill").await.unwrap();
    assert!(engine
        .start_recording("again")
        .await
        .unwrap_err()
        .is_state_conflict());
    engine
        .start_live(Box::new(SyntheticSource::unpaced(practice_session(2))))
        .await
        .unwrap();
    engine.wait_source_idle().await;
    let live_segments = engine.segments().await.unwrap();
    let meta = engine.stop_recording().await.unwrap();
    assert_eq!(meta.id, id);
    assert_eq!(meta.segment_count, 2);

    let mut recording = Vec::new();
    while let Some(msg) = sub.try_recv() {
        if let LiveMessage::Recording { data } = msg.as_ref() {
            recording.push(data.status);
        }
    }
    assert_eq!(
        recording,
        vec![RecordingStatus::Started, RecordingStatus::Stopped]
    );

    let loaded = engine
        .load_replay(config.sessions_dir.join(&id))
        .await
        .unwrap();
    assert_eq!(loaded.sample_count, meta.sample_count);
    engine.play(10.0).await.unwrap();
    assert!(engine
        .start_live(Box::new(StubSource::empty()))
        .await
        .unwrap_err()
        .is_state_conflict());
    engine.wait_source_idle().await;

    let replayed = engine.segments().await.unwrap();
    assert_eq!(replayed.len(), live_segments.len());
    for (a, b) in replayed.iter().zip(&live_segments) {
        assert_eq!(a.t_start, b.t_start);
        assert_eq!(a.t_end, b.t_end);
        assert_eq!(a.label, b.label);
    }

    let status = engine.status().await.unwrap();
    let replay = status.replay.expect("replay status");
    assert_eq!(replay.session_id, id);
    assert_eq!(replay.state, PlayerState::Stopped);
    assert_eq!(status.source, SourceKind::None);
    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_pause_and_seek_replay() {
    let (engine, config) = spawn("seek");
    let id = engine.start_recording("seek").await.unwrap();
    engine
        .start_live(Box::new(SyntheticSource::unpaced(practice_session(2))))
        .await
        .unwrap();
    engine.wait_source_idle().await;
    engine.stop_recording().await.unwrap();

    engine
        .load_replay(config.sessions_dir.join(&id))
        .await
        .unwrap();
    assert!(engine.pause().await.unwrap_err().is_state_conflict());
    let landed = engine.seek(5_000).await.unwrap();
    assert!(landed >= 5_000);

    let status = engine.status().await.unwrap();
    assert_eq!(status.replay.unwrap().state, PlayerState::Paused);
    assert_eq!(status.buffer_len, 0);

    engine.resume().await.unwrap();
    engine.pause().await.unwrap();
    engine.stop_replay().await.unwrap();
    let status = engine.status().await.unwrap();
    assert_eq!(status.replay.unwrap().state, PlayerState::Stopped);
    assert_eq!(status.source, SourceKind::None);
    engine.shutdown().await.unwrap();
}

/// Two shots on a device that has been up for a while.
fn uptime_session() -> Vec<shotscope_model::sample::RawSample> {
    let mut builder = TraceBuilder::new(100).starting_at(250_000, 40).still(2_000);
    for _ in 0..2 {
        builder = builder
            .swing(600, 260.0)
            .still(900)
            .press(300)
            .still(1_800);
    }
    builder.build()
}

#[tokio::test(start_paused = true)]
async fn test_backward_seek_keeps_one_copy_of_each_shot() {
    let (engine, config) = spawn("seek_back");
    let id = engine.start_recording("uptime").await.unwrap();
    engine
        .start_live(Box::new(SyntheticSource::unpaced(uptime_session())))
        .await
        .unwrap();
    engine.wait_source_idle().await;
    let live = engine.segments().await.unwrap();
    assert_eq!(live.len(), 2);
    engine.stop_recording().await.unwrap();

    engine
        .load_replay(config.sessions_dir.join(&id))
        .await
        .unwrap();
    engine.play(10.0).await.unwrap();
    // 5 s of device time: past the first shot, before the second.
    tokio::time::sleep(Duration::from_millis(500)).await;
    engine.pause().await.unwrap();
    let status = engine.status().await.unwrap();
    assert_eq!(status.segment_count, 1);
    let position = status.replay.unwrap().position_ms;
    assert!((4_000..5_600).contains(&position), "position {position}");

    let landed = engine.seek(1_000).await.unwrap();
    assert_eq!(landed, 1_000);
    let status = engine.status().await.unwrap();
    let position = status.replay.unwrap().position_ms;
    assert!(landed - position <= 10, "position {position} after seek to {landed}");
    assert_eq!(status.segment_count, 0);

    engine.resume().await.unwrap();
    engine.wait_source_idle().await;
    let replayed = engine.segments().await.unwrap();
    assert_eq!(replayed.len(), 2);
    for (a, b) in replayed.iter().zip(&live) {
        assert!(a.t_start.abs_diff(b.t_start) <= 20);
    }
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_guards_without_source() {
    let (engine, _) = spawn("guards");
    assert!(engine.play(1.0).await.is_err());
    assert!(engine.seek(0).await.is_err());
    assert!(engine.stop_recording().await.unwrap_err().is_state_conflict());
    assert!(engine
        .abort_calibration()
        .await
        .unwrap_err()
        .is_state_conflict());
    assert!(engine
        .patch_label("missing", ShotLabel::Bad)
        .await
        .is_err());
    engine.shutdown().await.unwrap();
    assert!(engine.status().await.is_err());
}

#[tokio::test]
async fn test_shutdown_finalizes_recording() {
    let (engine, config) = spawn("shutdown");
    let id = engine.start_recording("cut").await.unwrap();
    engine
        .start_live(Box::new(SyntheticSource::unpaced(practice_session(1))))
        .await
        .unwrap();
    engine.wait_source_idle().await;
    engine.shutdown().await.unwrap();

    let meta_path = config.sessions_dir.join(&id).join("meta.json");
    assert!(meta_path.exists());
}

#[tokio::test]
async fn test_stats_flow_while_source_is_always_ready() {
    let mut config = config("firehose");
    config.live.stat_interval_ms = 20;
    let (engine, _task) = Engine::spawn(config).unwrap();
    let mut sub = engine.subscribe();
    engine
        .start_live(Box::new(Firehose { seq: 0 }))
        .await
        .unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(msg) = sub.recv().await {
            if let LiveMessage::Stat { data } = msg.as_ref() {
                if data.received > 0 {
                    return data.received;
                }
            }
        }
        0
    })
    .await
    .expect("a stat message while lines keep coming");
    assert!(received > 0);

    engine.stop_source().await.unwrap();
    engine.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_recording_on_multi_thread_runtime() {
    let (engine, config) = spawn("multi_thread");
    let samples = practice_session(1);
    let total = samples.len() as u64;
    let id = engine.start_recording("threads").await.unwrap();
    engine
        .start_live(Box::new(SyntheticSource::unpaced(samples)))
        .await
        .unwrap();
    engine.wait_source_idle().await;

    let meta = engine.stop_recording().await.unwrap();
    assert_eq!(meta.id, id);
    assert_eq!(meta.sample_count, total);
    assert!(config.sessions_dir.join(&id).join("meta.json").exists());

    // Shutdown finalizes an open recording through the same path.
    let again = engine.start_recording("again").await.unwrap();
    engine.shutdown().await.unwrap();
    assert!(config.sessions_dir.join(&again).join("meta.json").exists());
}
