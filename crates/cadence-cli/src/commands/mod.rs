pub mod audit;
pub mod config;
pub mod dedupe;
pub mod materialize;
pub mod metrics;
pub mod migrate;
pub mod next;
pub mod status;

use std::path::{Path, PathBuf};

use cadence_core::{EngineConfig, Snapshot};
use chrono::{Local, NaiveDate, NaiveDateTime};
use clap::Args;
use serde::Serialize;

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Snapshot file shared by every engine command.
#[derive(Args, Debug, Clone)]
pub struct SnapshotArgs {
    /// Snapshot JSON file (actions, rules, occurrences)
    #[arg(long, short = 's')]
    pub snapshot: PathBuf,
    /// Write the result back to the snapshot file
    #[arg(long)]
    pub write: bool,
}

/// Clock inputs. The core never reads the clock; the CLI fills the gaps.
#[derive(Args, Debug, Clone)]
pub struct ClockArgs {
    /// Current instant (YYYY-MM-DDTHH:MM[:SS]); defaults to the local clock
    #[arg(long, value_parser = parse_datetime)]
    pub now: Option<NaiveDateTime>,
}

impl ClockArgs {
    pub fn now(&self) -> NaiveDateTime {
        self.now.unwrap_or_else(|| Local::now().naive_local())
    }
}

pub fn parse_datetime(s: &str) -> Result<NaiveDateTime, String> {
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s.trim(), fmt).ok())
        .ok_or_else(|| format!("invalid date-time '{s}': expected YYYY-MM-DDTHH:MM"))
}

pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    cadence_core::time::parse_date(s).map_err(|e| e.to_string())
}

/// Config from `path` when it exists, defaults when it does not, and the
/// user config file when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) if path.exists() => EngineConfig::load_from(path)?,
        Some(_) => EngineConfig::default(),
        None => EngineConfig::load()?,
    };
    Ok(config)
}

pub fn load_snapshot(args: &SnapshotArgs) -> Result<Snapshot, Box<dyn std::error::Error>> {
    Ok(Snapshot::load(&args.snapshot)?)
}

/// Persist `updated` when requested and changed, then print `report`.
pub fn finish(args: &SnapshotArgs, updated: Option<&Snapshot>, report: &impl Serialize) -> CliResult {
    match updated {
        Some(snapshot) if args.write => {
            snapshot.save(&args.snapshot)?;
            tracing::info!(path = %args.snapshot.display(), "snapshot written");
        }
        Some(_) => tracing::info!("snapshot changed; pass --write to persist"),
        None => tracing::debug!("snapshot unchanged"),
    }
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}
