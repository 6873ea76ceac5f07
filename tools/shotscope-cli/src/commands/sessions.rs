//! List recorded sessions.

use shotscope_common::config::AppConfig;
use shotscope_session::list_sessions;

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    let sessions = list_sessions(&config.sessions_dir)?;
    if sessions.is_empty() {
        println!("No sessions in {}", config.sessions_dir.display());
        return Ok(());
    }

    println!(
        "{:<40} {:<25} {:>9} {:>8} {:>6}  STATUS",
        "ID", "CREATED", "DURATION", "SAMPLES", "SHOTS"
    );
    for s in sessions {
        println!(
            "{:<40} {:<25} {:>8.1}s {:>8} {:>6}  {:?}",
            s.id,
            s.created_at,
            s.duration_ms as f64 / 1000.0,
            s.sample_count,
            s.segment_count,
            s.status
        );
    }
    Ok(())
}
