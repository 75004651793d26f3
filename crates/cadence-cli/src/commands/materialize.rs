use std::borrow::Cow;

use cadence_core::{
    mark_missed, materialize_snapshot, regenerate_action, regenerate_rules, EngineConfig, MaterializeStats, Occurrence,
    Snapshot,
};
use chrono::{NaiveDate, NaiveDateTime};
use clap::Subcommand;
use serde::Serialize;

use super::{finish, load_snapshot, parse_date, ClockArgs, CliResult, SnapshotArgs};

#[derive(Subcommand)]
pub enum MaterializeAction {
    /// Expand every action over the rolling horizon, then dedupe
    Run {
        #[command(flatten)]
        snapshot: SnapshotArgs,
        #[command(flatten)]
        clock: ClockArgs,
        /// First day of the horizon (YYYY-MM-DD); defaults to today
        #[arg(long, value_parser = parse_date)]
        start: Option<NaiveDate>,
    },
    /// Rebuild one action's planned rows from a pivot date after an edit
    Regenerate {
        #[command(flatten)]
        snapshot: SnapshotArgs,
        #[command(flatten)]
        clock: ClockArgs,
        /// Action to regenerate
        action_id: String,
        /// Planned rows dated on or after this day are rebuilt; defaults to today
        #[arg(long, value_parser = parse_date)]
        pivot: Option<NaiveDate>,
    },
    /// Mark overdue planned rows of a rule as missed
    Missed {
        #[command(flatten)]
        snapshot: SnapshotArgs,
        #[command(flatten)]
        clock: ClockArgs,
        /// Rule whose rows are checked
        rule_id: String,
    },
}

#[derive(Serialize)]
struct Report<'a> {
    command: &'a str,
    changed: bool,
    stats: MaterializeStats,
}

pub fn run(action: MaterializeAction, config: &EngineConfig) -> CliResult {
    match action {
        MaterializeAction::Run { snapshot, clock, start } => {
            let now = clock.now();
            let state = load_snapshot(&snapshot)?;
            let outcome = materialize_snapshot(&state, start.unwrap_or(now.date()), now, config);
            let changed = outcome.changed();
            let report = Report {
                command: "run",
                changed,
                stats: outcome.stats,
            };
            finish(&snapshot, changed.then_some(&*outcome.snapshot), &report)
        }
        MaterializeAction::Regenerate {
            snapshot,
            clock,
            action_id,
            pivot,
        } => {
            let now = clock.now();
            let pivot = pivot.unwrap_or(now.date());
            let state = load_snapshot(&snapshot)?;
            let (occurrences, stats) = regenerate(&state, &action_id, pivot, now, config)?;
            let changed = matches!(occurrences, Cow::Owned(_));
            let report = Report {
                command: "regenerate",
                changed,
                stats,
            };
            let updated = changed.then(|| Snapshot {
                occurrences: occurrences.into_owned(),
                ..state.clone()
            });
            finish(&snapshot, updated.as_ref(), &report)
        }
        MaterializeAction::Missed {
            snapshot,
            clock,
            rule_id,
        } => {
            let state = load_snapshot(&snapshot)?;
            if !state.rules.iter().any(|r| r.id == rule_id) {
                return Err(format!("unknown rule: {rule_id}").into());
            }
            let outcome = mark_missed(&state.occurrences, &rule_id, clock.now(), config);
            let changed = outcome.changed();
            let report = Report {
                command: "missed",
                changed,
                stats: outcome.stats,
            };
            let updated = changed.then(|| Snapshot {
                occurrences: outcome.occurrences.into_owned(),
                ..state.clone()
            });
            finish(&snapshot, updated.as_ref(), &report)
        }
    }
}

/// Rule path when the action owns active rules, inline schedule otherwise.
fn regenerate<'a>(
    state: &'a Snapshot,
    action_id: &str,
    pivot: NaiveDate,
    now: NaiveDateTime,
    config: &EngineConfig,
) -> Result<(Cow<'a, [Occurrence]>, MaterializeStats), Box<dyn std::error::Error>> {
    let action = state
        .action(action_id)
        .ok_or_else(|| format!("unknown action: {action_id}"))?;

    let outcome = if state.active_rules_for(action_id).next().is_some() {
        regenerate_rules(action_id, &state.rules, &state.occurrences, pivot, pivot, now, config)
    } else {
        regenerate_action(action, &state.occurrences, pivot, pivot, config)
    };
    Ok((outcome.occurrences, outcome.stats))
}
