//! CLI command implementations

pub mod account;
pub mod banks;
pub mod batches;
pub mod import;
pub mod logs;
pub mod review;

use std::path::PathBuf;

use anyhow::{Context, Result};
use balanceline_core::services::{EntryPoint, LogEvent};
use balanceline_core::BalancelineContext;
use uuid::Uuid;

/// Get the balanceline directory from environment or default
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("BALANCELINE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".balanceline"))
        .context("Could not find home directory; set BALANCELINE_DIR")
}

/// Open the context for the data directory and record the command
pub fn get_context(command: &str) -> Result<BalancelineContext> {
    let data_dir = get_data_dir()?;
    let ctx = BalancelineContext::new(&data_dir, EntryPoint::Cli)
        .with_context(|| format!("Failed to open balanceline data in {}", data_dir.display()))?;
    ctx.log(LogEvent::new("command_executed").with_command(command));
    Ok(ctx)
}

pub fn parse_id(value: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(value.trim()).with_context(|| format!("Invalid {} ID: {}", what, value))
}
