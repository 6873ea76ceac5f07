//! ShotScope CLI: live capture, replay, and session management.
//!
//! Usage:
//!   shotscope live --simulate 5        Run the pipeline on a synthetic trace
//!   shotscope live --port /dev/ttyUSB0 Run on the device link (`serial` feature)
//!   shotscope replay <SESSION>         Replay a recorded session
//!   shotscope sessions                 List recorded sessions
//!   shotscope info <SESSION>           Show session metadata and segments
//!   shotscope label <SESSION> <ID> <L> Relabel one segment
//!   shotscope delete <SESSION>         Delete a session

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use shotscope_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "shotscope",
    about = "Shot segmentation for dual-IMU motion sensors",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the user config, if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the sessions directory
    #[arg(long, global = true)]
    sessions_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the live pipeline on one source
    Live(commands::live::LiveArgs),

    /// Replay a recorded session through the pipeline
    Replay {
        /// Session id or directory
        session: String,

        /// Playback speed multiplier
        #[arg(long, default_value = "1.0")]
        speed: f64,

        /// Start this many ms into the session
        #[arg(long)]
        seek: Option<u64>,
    },

    /// List recorded sessions
    Sessions,

    /// Show session metadata and segments
    Info {
        /// Session id or directory
        session: String,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Label one segment of a recorded session
    Label {
        /// Session id or directory
        session: String,

        /// Segment id
        shot_id: String,

        /// good, bad or unknown
        label: String,
    },

    /// Delete a recorded session
    Delete {
        /// Session id or directory
        session: String,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AppConfig::load(),
    };
    if let Some(dir) = &cli.sessions_dir {
        config.sessions_dir = dir.clone();
    }
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    shotscope_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Live(args) => commands::live::run(config, args).await,
        Commands::Replay {
            session,
            speed,
            seek,
        } => commands::replay::run(config, session, speed, seek).await,
        Commands::Sessions => commands::sessions::run(&config),
        Commands::Info { session, json } => commands::info::run(&config, &session, json),
        Commands::Label {
            session,
            shot_id,
            label,
        } => commands::label::run(&config, &session, &shot_id, &label),
        Commands::Delete { session } => commands::delete::run(&config, &session),
    }
}
