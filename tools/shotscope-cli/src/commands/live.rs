//! Run the live pipeline.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use shotscope_common::config::AppConfig;
use shotscope_ingest::{practice_session, LineSource, ReaderSource, SyntheticSource};
use shotscope_pipeline::Engine;

#[derive(Args)]
pub struct LiveArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Serial baud rate (defaults to the configured one)
    #[arg(long)]
    baud: Option<u32>,

    /// Record the run as a session with this name
    #[arg(long, value_name = "NAME")]
    record: Option<String>,

    /// Calibrate the gyro offset for this long (ms) before segmenting
    #[arg(long, value_name = "MS", num_args = 0..=1, default_missing_value = "0")]
    calibrate: Option<u64>,

    /// Speed multiplier for --simulate
    #[arg(long, default_value = "1.0")]
    speed: f64,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct SourceArgs {
    /// Serial device path
    #[arg(long)]
    port: Option<String>,

    /// Read lines from standard input
    #[arg(long)]
    stdin: bool,

    /// Read lines from a capture file
    #[arg(long)]
    file: Option<PathBuf>,

    /// Generate a practice trace with this many shots
    #[arg(long, value_name = "SHOTS")]
    simulate: Option<usize>,
}

async fn open_source(
    config: &AppConfig,
    args: &LiveArgs,
) -> anyhow::Result<Box<dyn LineSource>> {
    let source = &args.source;
    if let Some(port) = &source.port {
        return open_port(port, args.baud.unwrap_or(config.serial.baud_rate));
    }
    if source.stdin {
        return Ok(Box::new(ReaderSource::stdin()));
    }
    if let Some(path) = &source.file {
        let reader = ReaderSource::open_file(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        return Ok(Box::new(reader));
    }
    let shots = source.simulate.unwrap_or(3);
    if !(0.1..=10.0).contains(&args.speed) {
        anyhow::bail!("--speed must be within 0.1..=10");
    }
    Ok(Box::new(SyntheticSource::paced(
        practice_session(shots),
        args.speed,
    )))
}

#[cfg(feature = "serial")]
fn open_port(port: &str, baud_rate: u32) -> anyhow::Result<Box<dyn LineSource>> {
    let reader = shotscope_ingest::sources::open_serial(port, baud_rate)?;
    Ok(Box::new(reader))
}

#[cfg(not(feature = "serial"))]
fn open_port(port: &str, _baud_rate: u32) -> anyhow::Result<Box<dyn LineSource>> {
    anyhow::bail!("Cannot open {port}: built without serial support (enable the `serial` feature)")
}

pub async fn run(config: AppConfig, args: LiveArgs) -> anyhow::Result<()> {
    let source = open_source(&config, &args).await?;
    let (engine, task) = Engine::spawn(config).context("Failed to start the pipeline")?;
    let printer = tokio::spawn(super::print_events(engine.subscribe()));

    if let Some(name) = &args.record {
        let id = engine
            .start_recording(name.as_str())
            .await
            .context("Failed to start recording")?;
        eprintln!("Recording session {id}");
    }
    if let Some(ms) = args.calibrate {
        let duration = (ms > 0).then_some(ms);
        engine
            .start_calibration(duration)
            .await
            .context("Failed to start calibration")?;
        eprintln!("Calibrating: keep the sensors still");
    }

    engine.start_live(source).await?;
    if super::wait_for_end(&engine).await? {
        eprintln!("Interrupted");
    }

    super::report(&engine).await?;
    if args.record.is_some() {
        match engine.stop_recording().await {
            Ok(meta) => eprintln!(
                "Saved {} ({} samples, {} shots, {:?})",
                meta.id, meta.sample_count, meta.segment_count, meta.status
            ),
            Err(e) => eprintln!("Recording was not saved: {e}"),
        }
    }

    engine.shutdown().await?;
    drop(engine);
    task.await.context("Pipeline task failed")?;
    printer.await.context("Event printer failed")?;
    Ok(())
}
