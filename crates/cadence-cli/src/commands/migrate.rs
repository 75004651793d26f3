use cadence_core::{migrate_snapshot, EngineConfig};
use chrono::NaiveDate;
use clap::Args;

use super::{finish, load_snapshot, parse_date, ClockArgs, CliResult, SnapshotArgs};

#[derive(Args)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub snapshot: SnapshotArgs,
    #[command(flatten)]
    pub clock: ClockArgs,
    /// Regenerate touched actions from this day (YYYY-MM-DD); defaults to today
    #[arg(long, value_parser = parse_date)]
    pub start: Option<NaiveDate>,
}

pub fn run(args: MigrateArgs, config: &EngineConfig) -> CliResult {
    let now = args.clock.now();
    let state = load_snapshot(&args.snapshot)?;
    let report = migrate_snapshot(&state, args.start.unwrap_or(now.date()), now, config);
    let updated = report.changed().then_some(&*report.snapshot);
    finish(&args.snapshot, updated, &report)
}
