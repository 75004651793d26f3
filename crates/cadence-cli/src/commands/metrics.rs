use cadence_core::{aggregate, MetricsQuery};
use chrono::NaiveDate;
use clap::Args;

use super::{load_snapshot, parse_date, CliResult, SnapshotArgs};

#[derive(Args)]
pub struct MetricsArgs {
    #[command(flatten)]
    pub snapshot: SnapshotArgs,
    /// First day included (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub from: Option<NaiveDate>,
    /// Last day included (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub to: Option<NaiveDate>,
    /// Restrict to one action
    #[arg(long)]
    pub action: Option<String>,
    /// Restrict to one category
    #[arg(long)]
    pub category: Option<String>,
}

pub fn run(args: MetricsArgs) -> CliResult {
    if let (Some(from), Some(to)) = (args.from, args.to) {
        if from > to {
            return Err(format!("--from {from} is after --to {to}").into());
        }
    }
    let state = load_snapshot(&args.snapshot)?;
    let query = MetricsQuery {
        from: args.from,
        to: args.to,
        action_id: args.action,
        category_id: args.category,
    };
    let report = aggregate(&state.occurrences, &state.actions, &query);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
