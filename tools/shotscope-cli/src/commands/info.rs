//! Show session information.

use anyhow::Context;

use shotscope_common::config::AppConfig;
use shotscope_session::{load_summary, resolve_session};

pub fn run(config: &AppConfig, session: &str, json: bool) -> anyhow::Result<()> {
    let path = resolve_session(&config.sessions_dir, session)?;
    let summary = load_summary(&path)
        .with_context(|| format!("Failed to load session {}", path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let m = &summary.meta;
    println!("Session: {}", m.name);
    println!("  ID: {}", m.id);
    println!("  Created: {}", m.created_at);
    println!("  Finished: {}", m.finished_at);
    println!("  Status: {:?}", m.status);
    println!();

    println!("Data:");
    println!(
        "  {} samples over {:.1}s ({:.1} Hz)",
        m.sample_count,
        m.duration_ms as f64 / 1000.0,
        m.sample_rate_hz
    );
    println!("  Ranges: accel {}, gyro {}", m.accel_range, m.gyro_range);
    println!("  Placement: {:?}", m.placement);
    println!("  Gyro offset: {:?}", m.calibration.gyro);
    println!();

    println!(
        "Shots: {} ({} good, {} bad, {} unlabeled)",
        summary.segments.len(),
        summary.labels.good,
        summary.labels.bad,
        summary.labels.unknown
    );
    for seg in &summary.segments {
        let peak = seg
            .features
            .as_ref()
            .map_or(0.0, |f| f.g1_peak.max(f.g2_peak));
        println!(
            "  {}  {:>8} ms  {:>5} ms  {:<7}  peak {:.1} dps",
            seg.shot_id,
            seg.t_start,
            seg.duration_ms().unwrap_or(0),
            seg.label,
            peak
        );
    }
    Ok(())
}
