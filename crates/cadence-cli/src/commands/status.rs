use std::borrow::Cow;

use cadence_core::{
    set_status_by_id, set_status_for_action_date, upsert_by_slot, ClockTime, Occurrence, OccurrenceStatus, SlotUpsert,
    Snapshot,
};
use chrono::NaiveDate;
use clap::Subcommand;
use serde::Serialize;

use super::{finish, load_snapshot, parse_date, CliResult, SnapshotArgs};

#[derive(Subcommand)]
pub enum StatusAction {
    /// Set the status of one occurrence by id
    Set {
        #[command(flatten)]
        snapshot: SnapshotArgs,
        /// Occurrence id
        id: String,
        /// planned, done, skipped, canceled, rescheduled or missed
        status: OccurrenceStatus,
    },
    /// Set the status of every occurrence of an action on a day
    Day {
        #[command(flatten)]
        snapshot: SnapshotArgs,
        action_id: String,
        #[arg(value_parser = parse_date)]
        date: NaiveDate,
        status: OccurrenceStatus,
    },
    /// Record a status at a slot, creating the occurrence when absent
    Upsert {
        #[command(flatten)]
        snapshot: SnapshotArgs,
        action_id: String,
        #[arg(value_parser = parse_date)]
        date: NaiveDate,
        status: OccurrenceStatus,
        /// Slot start (HH:MM); the untimed slot when omitted
        #[arg(long)]
        start: Option<ClockTime>,
        /// Duration in minutes for a newly created occurrence
        #[arg(long)]
        duration: Option<u32>,
    },
}

#[derive(Serialize)]
struct Report<'a> {
    changed: bool,
    occurrences: Vec<&'a Occurrence>,
}

pub fn run(action: StatusAction) -> CliResult {
    match action {
        StatusAction::Set { snapshot, id, status } => {
            let state = load_snapshot(&snapshot)?;
            if !state.occurrences.iter().any(|o| o.id == id) {
                return Err(format!("unknown occurrence: {id}").into());
            }
            let rows = set_status_by_id(&state.occurrences, &id, status);
            apply(&snapshot, &state, rows, |o| o.id == id)
        }
        StatusAction::Day {
            snapshot,
            action_id,
            date,
            status,
        } => {
            let state = load_snapshot(&snapshot)?;
            let rows = set_status_for_action_date(&state.occurrences, &action_id, date, status);
            apply(&snapshot, &state, rows, |o| o.action_id == action_id && o.date == date)
        }
        StatusAction::Upsert {
            snapshot,
            action_id,
            date,
            status,
            start,
            duration,
        } => {
            let state = load_snapshot(&snapshot)?;
            let mut draft = SlotUpsert::new(action_id, date, status);
            if let Some(start) = start {
                draft = draft.at(start);
            }
            if let Some(minutes) = duration {
                draft = draft.with_duration(minutes);
            }
            let rows = upsert_by_slot(&state.occurrences, &draft);
            apply(&snapshot, &state, rows, |o| {
                o.action_id == draft.action_id && o.date == draft.date && o.status == draft.status
            })
        }
    }
}

/// Report the rows selected by `touched`, then persist when changed.
fn apply(
    args: &SnapshotArgs,
    state: &Snapshot,
    rows: Cow<'_, [Occurrence]>,
    touched: impl Fn(&Occurrence) -> bool,
) -> CliResult {
    let changed = matches!(rows, Cow::Owned(_));
    let report = Report {
        changed,
        occurrences: rows.iter().filter(|&o| touched(o)).collect(),
    };
    let updated = changed.then(|| Snapshot {
        actions: state.actions.clone(),
        rules: state.rules.clone(),
        occurrences: rows.to_vec(),
    });
    finish(args, updated.as_ref(), &report)
}
