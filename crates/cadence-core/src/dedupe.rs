//! Canonicalize an occurrence collection by `(action id, date, effective slot)`.

use std::borrow::Cow;
use std::collections::HashMap;

use crate::model::{Occurrence, OccurrenceKey};

/// Keep one row per key.
///
/// The survivor is the row with the highest status rank
/// (done > planned > skipped > other); equal ranks keep the first seen.
/// Survivors stay at the position of their key's first row. Rows without
/// a key pass through in place. Returns `Borrowed` when nothing is dropped.
pub fn dedupe_occurrences(occurrences: &[Occurrence]) -> Cow<'_, [Occurrence]> {
    // key -> index of the current winner
    let mut winners: HashMap<OccurrenceKey, usize> = HashMap::new();
    let mut order: Vec<Slot> = Vec::with_capacity(occurrences.len());
    let mut dropped = 0usize;

    for (idx, occ) in occurrences.iter().enumerate() {
        let Some(key) = occ.key() else {
            order.push(Slot::Passthrough(idx));
            continue;
        };

        match winners.get_mut(&key) {
            Some(winner) => {
                dropped += 1;
                if occ.status.rank() > occurrences[*winner].status.rank() {
                    *winner = idx;
                }
            }
            None => {
                winners.insert(key.clone(), idx);
                order.push(Slot::Keyed(key));
            }
        }
    }

    if dropped == 0 {
        return Cow::Borrowed(occurrences);
    }

    tracing::debug!(dropped, kept = order.len(), "deduplicated occurrences");

    let deduped = order
        .into_iter()
        .map(|slot| match slot {
            Slot::Passthrough(idx) => occurrences[idx].clone(),
            Slot::Keyed(key) => occurrences[winners[&key]].clone(),
        })
        .collect();
    Cow::Owned(deduped)
}

enum Slot {
    Passthrough(usize),
    Keyed(OccurrenceKey),
}

/// Keys held by more than one row, in first-seen order.
pub fn duplicate_keys(occurrences: &[Occurrence]) -> Vec<(OccurrenceKey, Vec<String>)> {
    let mut groups: HashMap<OccurrenceKey, Vec<String>> = HashMap::new();
    let mut first_seen: Vec<OccurrenceKey> = Vec::new();

    for occ in occurrences {
        if let Some(key) = occ.key() {
            let ids = groups.entry(key.clone()).or_default();
            if ids.is_empty() {
                first_seen.push(key);
            }
            ids.push(occ.id.clone());
        }
    }

    first_seen
        .into_iter()
        .filter_map(|key| {
            let ids = groups.remove(&key)?;
            (ids.len() > 1).then_some((key, ids))
        })
        .collect()
}
