pub mod delete;
pub mod info;
pub mod label;
pub mod live;
pub mod replay;
pub mod sessions;

use std::io::Write;

use shotscope_model::message::LiveMessage;
use shotscope_pipeline::{EngineHandle, LiveSubscriber};

/// Print segment, label, calibration and recording events as JSON lines
/// until the hub closes.
pub(crate) async fn print_events(mut sub: LiveSubscriber) {
    let mut stdout = std::io::stdout();
    while let Some(msg) = sub.recv().await {
        if matches!(
            msg.as_ref(),
            LiveMessage::Sample { .. } | LiveMessage::Stat { .. }
        ) {
            continue;
        }
        match serde_json::to_string(msg.as_ref()) {
            Ok(line) => {
                if writeln!(stdout, "{line}").is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!(error = %e, "Cannot encode event"),
        }
    }
    if sub.skipped() > 0 {
        tracing::warn!(skipped = sub.skipped(), "Event printer fell behind");
    }
}

/// Wait for the source to finish or Ctrl+C, whichever comes first.
/// Returns `true` when interrupted.
pub(crate) async fn wait_for_end(engine: &EngineHandle) -> anyhow::Result<bool> {
    tokio::select! {
        _ = engine.wait_source_idle() => Ok(false),
        res = tokio::signal::ctrl_c() => {
            res?;
            Ok(true)
        }
    }
}

/// One-line run summary on stderr.
pub(crate) async fn report(engine: &EngineHandle) -> anyhow::Result<()> {
    let stats = engine.stats().await?;
    let segments = engine.segments().await?;
    let status = engine.status().await?;
    eprintln!(
        "{} samples ({} dropped, {} unparseable), {} shots ({} good, {} bad, {} unlabeled)",
        stats.received,
        stats.dropped,
        stats.parse_err,
        segments.len(),
        status.labels.good,
        status.labels.bad,
        status.labels.unknown,
    );
    if stats.protocol_mismatch > 0 {
        eprintln!(
            "{} samples discarded: unsupported protocol version",
            stats.protocol_mismatch
        );
    }
    Ok(())
}
