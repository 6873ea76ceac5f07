//! Delete a recorded session.

use shotscope_common::config::AppConfig;
use shotscope_session::{delete_session, resolve_session};

pub fn run(config: &AppConfig, session: &str) -> anyhow::Result<()> {
    let path = resolve_session(&config.sessions_dir, session)?;
    delete_session(&path)?;
    println!("Deleted {}", path.display());
    Ok(())
}
