//! Status mutation helpers used to record what the user did.
//!
//! Each returns `Cow::Borrowed` when the collection is already in the
//! requested state. None of them ever appends a second row for an occupied
//! `(action id, date, slot)`.

use std::borrow::Cow;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::{occurrence_id, Occurrence, OccurrenceStatus, SlotKey, TimeType};
use crate::time::ClockTime;

/// Set the status of the row with `id`. Unknown ids are a no-op.
pub fn set_status_by_id<'a>(
    occurrences: &'a [Occurrence],
    id: &str,
    status: OccurrenceStatus,
) -> Cow<'a, [Occurrence]> {
    let Some(idx) = occurrences.iter().position(|o| o.id == id) else {
        tracing::debug!(occurrence = id, "status update for unknown occurrence ignored");
        return Cow::Borrowed(occurrences);
    };
    if occurrences[idx].status == status {
        return Cow::Borrowed(occurrences);
    }

    let mut rows = occurrences.to_vec();
    rows[idx].status = status;
    tracing::debug!(occurrence = id, %status, "status updated");
    Cow::Owned(rows)
}

/// Set the status of every row of `action_id` on `date`.
pub fn set_status_for_action_date<'a>(
    occurrences: &'a [Occurrence],
    action_id: &str,
    date: NaiveDate,
    status: OccurrenceStatus,
) -> Cow<'a, [Occurrence]> {
    let mut result = Cow::Borrowed(occurrences);
    for (idx, occ) in occurrences.iter().enumerate() {
        if occ.action_id == action_id && occ.date == date && occ.status != status {
            result.to_mut()[idx].status = status;
        }
    }
    if let Cow::Owned(_) = result {
        tracing::debug!(action = action_id, %date, %status, "status updated for action date");
    }
    result
}

/// A status to record at `(action id, date, start)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotUpsert {
    pub action_id: String,
    pub date: NaiveDate,
    /// `None` targets the untimed slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<ClockTime>,
    pub status: OccurrenceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
}

impl SlotUpsert {
    pub fn new(action_id: impl Into<String>, date: NaiveDate, status: OccurrenceStatus) -> Self {
        Self {
            action_id: action_id.into(),
            date,
            start: None,
            status,
            duration_minutes: None,
        }
    }

    pub fn at(mut self, start: ClockTime) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }

    fn slot(&self) -> SlotKey {
        self.start.map_or(SlotKey::Untimed, SlotKey::Time)
    }
}

/// Update the row occupying the draft's slot, else insert one.
///
/// A timed draft also matches a row relocated away from that start.
/// Drafts without an action id are a no-op.
pub fn upsert_by_slot<'a>(occurrences: &'a [Occurrence], draft: &SlotUpsert) -> Cow<'a, [Occurrence]> {
    if draft.action_id.trim().is_empty() {
        return Cow::Borrowed(occurrences);
    }
    let slot = draft.slot();

    let existing = occurrences.iter().position(|o| {
        o.action_id == draft.action_id
            && o.date == draft.date
            && (o.slot_key() == slot || (draft.start.is_some() && o.requested_start == draft.start))
    });

    match existing {
        Some(idx) => set_status_by_id(occurrences, &occurrences[idx].id, draft.status),
        None => {
            let id = occurrence_id(&draft.action_id, draft.date, &slot, None);
            let mut row = Occurrence::planned(id, draft.action_id.clone(), draft.date);
            row.start = draft.start;
            row.duration_minutes = draft.duration_minutes;
            row.end = draft
                .start
                .zip(draft.duration_minutes)
                .and_then(|(start, minutes)| start.checked_add_minutes(minutes as i64));
            row.time_type = Some(if draft.start.is_some() {
                TimeType::Fixed
            } else {
                TimeType::Untimed
            });
            row.status = draft.status;

            tracing::debug!(occurrence = %row.id, slot = %slot, status = %draft.status, "slot upserted");
            let mut rows = occurrences.to_vec();
            rows.push(row);
            Cow::Owned(rows)
        }
    }
}
