use std::borrow::Cow;

use cadence_core::{dedupe_occurrences, Snapshot};
use serde::Serialize;

use super::{finish, load_snapshot, CliResult, SnapshotArgs};

#[derive(Serialize)]
struct Report {
    before: usize,
    after: usize,
    dropped: usize,
}

pub fn run(args: SnapshotArgs) -> CliResult {
    let state = load_snapshot(&args)?;
    let deduped = dedupe_occurrences(&state.occurrences);
    let report = Report {
        before: state.occurrences.len(),
        after: deduped.len(),
        dropped: state.occurrences.len() - deduped.len(),
    };
    let updated = match deduped {
        Cow::Owned(occurrences) => Some(Snapshot {
            actions: state.actions.clone(),
            rules: state.rules.clone(),
            occurrences,
        }),
        Cow::Borrowed(_) => None,
    };
    finish(&args, updated.as_ref(), &report)
}
