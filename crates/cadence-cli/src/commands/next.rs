use cadence_core::{next_up, resolve_execution};
use chrono::NaiveDate;
use clap::Subcommand;

use super::{load_snapshot, parse_date, ClockArgs, CliResult, SnapshotArgs};

#[derive(Subcommand)]
pub enum NextAction {
    /// Pick the occurrence to act on now
    Execute {
        #[command(flatten)]
        snapshot: SnapshotArgs,
        #[command(flatten)]
        clock: ClockArgs,
        /// Day to resolve (YYYY-MM-DD); defaults to today
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
        /// Eligible action ids; every action in the snapshot when omitted
        #[arg(long = "action", short = 'a')]
        actions: Vec<String>,
    },
    /// Show what comes next today
    Up {
        #[command(flatten)]
        snapshot: SnapshotArgs,
        #[command(flatten)]
        clock: ClockArgs,
        /// Day to look at (YYYY-MM-DD); defaults to today
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
    },
}

pub fn run(action: NextAction) -> CliResult {
    match action {
        NextAction::Execute {
            snapshot,
            clock,
            date,
            actions,
        } => {
            let now = clock.now();
            let state = load_snapshot(&snapshot)?;
            let eligible: Vec<&str> = if actions.is_empty() {
                state.actions.iter().map(|a| a.id.as_str()).collect()
            } else {
                actions.iter().map(String::as_str).collect()
            };
            let result = resolve_execution(&state.occurrences, now, date.unwrap_or(now.date()), &eligible);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        NextAction::Up { snapshot, clock, date } => {
            let now = clock.now();
            let state = load_snapshot(&snapshot)?;
            match next_up(&state.occurrences, &state.actions, now, date.unwrap_or(now.date())) {
                Some(next) => println!("{}", serde_json::to_string_pretty(&next)?),
                None => println!("null"),
            }
        }
    }
    Ok(())
}
