//! Replay a recorded session.

use anyhow::Context;

use shotscope_common::config::AppConfig;
use shotscope_pipeline::Engine;
use shotscope_session::resolve_session;

pub async fn run(
    config: AppConfig,
    session: String,
    speed: f64,
    seek: Option<u64>,
) -> anyhow::Result<()> {
    let path = resolve_session(&config.sessions_dir, &session)?;
    let (engine, task) = Engine::spawn(config).context("Failed to start the pipeline")?;
    let printer = tokio::spawn(super::print_events(engine.subscribe()));

    let meta = engine
        .load_replay(&path)
        .await
        .with_context(|| format!("Failed to load {}", path.display()))?;
    eprintln!(
        "Replaying {} ({} samples, {:.1}s) at {speed}x",
        meta.id,
        meta.sample_count,
        meta.duration_ms as f64 / 1000.0
    );
    if let Some(t_ms) = seek {
        let landed = engine.seek(t_ms).await?;
        eprintln!("Starting {landed} ms in");
    }
    engine.play(speed).await?;

    if super::wait_for_end(&engine).await? {
        eprintln!("Interrupted");
    }
    super::report(&engine).await?;

    engine.shutdown().await?;
    drop(engine);
    task.await.context("Pipeline task failed")?;
    printer.await.context("Event printer failed")?;
    Ok(())
}
