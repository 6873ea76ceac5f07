//! Relabel a segment of a recorded session.

use anyhow::Context;

use shotscope_common::config::AppConfig;
use shotscope_model::segment::ShotLabel;
use shotscope_session::{label_session, load_summary, resolve_session};

pub fn run(config: &AppConfig, session: &str, shot_id: &str, label: &str) -> anyhow::Result<()> {
    let label: ShotLabel = label.parse()?;
    let path = resolve_session(&config.sessions_dir, session)?;
    let summary = load_summary(&path)
        .with_context(|| format!("Failed to load session {}", path.display()))?;
    if !summary.segments.iter().any(|s| s.shot_id == shot_id) {
        anyhow::bail!("No segment {shot_id} in session {}", summary.meta.id);
    }

    let update = label_session(&path, shot_id, label)?;
    println!("{}", serde_json::to_string(&update)?);
    Ok(())
}
