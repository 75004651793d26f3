//! Execution resolution: pick the one occurrence to act on.
//!
//! Ordering is total and deterministic:
//! 1. Class: fixed, then window, then anytime
//! 2. Effective time, rows without one last
//! 3. Action id, then occurrence id
//!
//! [`next_up`] adds a priority tier before the id tie-break.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::model::{Action, Occurrence, OccurrenceStatus, PriorityTier, TimeType};
use crate::time::ClockTime;

/// Execution class of an occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionClass {
    Fixed,
    Window,
    Anytime,
}

/// Fixed: explicit start or fixed time type. Window: window time type or
/// a resolved start. Anytime: neither.
pub fn classify(occ: &Occurrence) -> ExecutionClass {
    if occ.start.is_some() || occ.time_type == Some(TimeType::Fixed) {
        ExecutionClass::Fixed
    } else if occ.is_window_item() || occ.resolved_start.is_some() {
        ExecutionClass::Window
    } else {
        ExecutionClass::Anytime
    }
}

/// Time used for ordering within a class.
pub fn ordering_time(occ: &Occurrence) -> Option<ClockTime> {
    match classify(occ) {
        ExecutionClass::Fixed => occ.start,
        ExecutionClass::Window => occ.resolved_start,
        ExecutionClass::Anytime => None,
    }
}

fn compare_time(a: Option<ClockTime>, b: Option<ClockTime>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Class, then time, then action id, then occurrence id.
pub fn execution_order(a: &Occurrence, b: &Occurrence) -> Ordering {
    classify(a)
        .cmp(&classify(b))
        .then_with(|| compare_time(ordering_time(a), ordering_time(b)))
        .then_with(|| a.action_id.cmp(&b.action_id))
        .then_with(|| a.id.cmp(&b.id))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// Nothing eligible.
    NotFound,
    /// The head is already terminal.
    Final,
    Ok,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult<'a> {
    pub outcome: ExecutionOutcome,
    pub occurrence: Option<&'a Occurrence>,
    pub class: Option<ExecutionClass>,
    /// Minutes from `now` to the occurrence's effective time; negative once
    /// it has started.
    pub starts_in_minutes: Option<i64>,
}

impl ExecutionResult<'_> {
    fn not_found() -> Self {
        Self {
            outcome: ExecutionOutcome::NotFound,
            occurrence: None,
            class: None,
            starts_in_minutes: None,
        }
    }
}

/// Select the planned occurrence on `date` to act on, among actions in
/// `eligible`.
pub fn resolve_execution<'a>(
    occurrences: &'a [Occurrence],
    now: NaiveDateTime,
    date: NaiveDate,
    eligible: &[&str],
) -> ExecutionResult<'a> {
    let head = occurrences
        .iter()
        .filter(|o| o.date == date && o.status == OccurrenceStatus::Planned)
        .filter(|o| eligible.contains(&o.action_id.as_str()))
        .min_by(|a, b| execution_order(a, b));

    let Some(head) = head else {
        tracing::debug!(%date, eligible = eligible.len(), "no eligible occurrence");
        return ExecutionResult::not_found();
    };

    let outcome = if head.status.is_terminal() {
        ExecutionOutcome::Final
    } else {
        ExecutionOutcome::Ok
    };
    let starts_in_minutes = ordering_time(head).map(|t| (t.on(head.date) - now).num_minutes());

    tracing::debug!(occurrence = %head.id, ?outcome, "resolved execution");
    ExecutionResult {
        outcome,
        occurrence: Some(head),
        class: Some(classify(head)),
        starts_in_minutes,
    }
}

/// Why [`next_up`] picked its occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NextReason {
    /// Timed and at or after the current time of day.
    Upcoming,
    /// Every timed row has passed; the day's earliest.
    EarliestOfDay,
    /// No timed rows; a window or anytime row.
    Unscheduled,
}

#[derive(Debug, Clone, Serialize)]
pub struct NextUp<'a> {
    pub occurrence: &'a Occurrence,
    pub reason: NextReason,
}

/// Single-day "what's next" over the planned occurrences of `date`.
pub fn next_up<'a>(
    occurrences: &'a [Occurrence],
    actions: &[Action],
    now: NaiveDateTime,
    date: NaiveDate,
) -> Option<NextUp<'a>> {
    let tiers: HashMap<&str, PriorityTier> = actions.iter().map(|a| (a.id.as_str(), a.priority)).collect();
    let tier = |o: &Occurrence| tiers.get(o.action_id.as_str()).copied().unwrap_or_default();
    let order = |a: &&Occurrence, b: &&Occurrence| {
        classify(a)
            .cmp(&classify(b))
            .then_with(|| compare_time(ordering_time(a), ordering_time(b)))
            .then_with(|| tier(a).cmp(&tier(b)))
            .then_with(|| a.action_id.cmp(&b.action_id))
            .then_with(|| a.id.cmp(&b.id))
    };

    let planned: Vec<&Occurrence> = occurrences
        .iter()
        .filter(|o| o.date == date && o.status == OccurrenceStatus::Planned)
        .collect();

    let is_upcoming = |time: ClockTime| time.on(date) >= now;

    let pick = planned
        .iter()
        .copied()
        .filter(|o| ordering_time(o).is_some_and(is_upcoming))
        .min_by(order)
        .map(|o| (o, NextReason::Upcoming))
        .or_else(|| {
            planned
                .iter()
                .copied()
                .filter(|o| ordering_time(o).is_some())
                .min_by(order)
                .map(|o| (o, NextReason::EarliestOfDay))
        })
        .or_else(|| {
            planned
                .iter()
                .copied()
                .filter(|o| classify(o) != ExecutionClass::Fixed)
                .min_by(order)
                .map(|o| (o, NextReason::Unscheduled))
        });

    pick.map(|(occurrence, reason)| NextUp { occurrence, reason })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::WeekdaySet;

    fn t(s: &str) -> ClockTime {
        s.parse().unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn now(hh: u32, mm: u32) -> NaiveDateTime {
        day().and_hms_opt(hh, mm, 0).unwrap()
    }

    #[test]
    fn fixed_beats_earlier_window() {
        let rows = vec![
            Occurrence::planned("w", "a2", day())
                .in_window(t("08:00"), t("10:00"), 30)
                .with_resolved_start(t("08:30")),
            Occurrence::planned("f", "a1", day()).at(t("09:00"), 30),
        ];
        let res = resolve_execution(&rows, now(7, 0), day(), &["a1", "a2"]);
        assert_eq!(res.outcome, ExecutionOutcome::Ok);
        assert_eq!(res.occurrence.unwrap().id, "f");
        assert_eq!(res.class, Some(ExecutionClass::Fixed));
        assert_eq!(res.starts_in_minutes, Some(120));
    }

    #[test]
    fn ties_break_by_action_then_id() {
        let rows = vec![
            Occurrence::planned("z", "b", day()).at(t("09:00"), 30),
            Occurrence::planned("y", "a", day()).at(t("09:00"), 30),
            Occurrence::planned("x", "a", day()).at(t("09:00"), 30),
        ];
        let res = resolve_execution(&rows, now(7, 0), day(), &["a", "b"]);
        assert_eq!(res.occurrence.unwrap().id, "x");
    }

    #[test]
    fn unresolved_window_sorts_after_resolved() {
        let rows = vec![
            Occurrence::planned("w1", "a1", day()).in_window(t("08:00"), t("10:00"), 30),
            Occurrence::planned("w2", "a2", day())
                .in_window(t("12:00"), t("14:00"), 30)
                .with_resolved_start(t("12:00")),
            Occurrence::planned("any", "a0", day()),
        ];
        let res = resolve_execution(&rows, now(7, 0), day(), &["a0", "a1", "a2"]);
        assert_eq!(res.occurrence.unwrap().id, "w2");
        assert_eq!(classify(&rows[2]), ExecutionClass::Anytime);
    }

    #[test]
    fn ineligible_and_terminal_rows_are_not_found() {
        let rows = vec![
            Occurrence::planned("d", "a1", day())
                .at(t("09:00"), 30)
                .with_status(OccurrenceStatus::Done),
            Occurrence::planned("p", "a2", day()).at(t("09:00"), 30),
        ];
        let res = resolve_execution(&rows, now(7, 0), day(), &["a1"]);
        assert_eq!(res.outcome, ExecutionOutcome::NotFound);
        assert!(res.occurrence.is_none());

        let other_day = resolve_execution(&rows, now(7, 0), day().succ_opt().unwrap(), &["a2"]);
        assert_eq!(other_day.outcome, ExecutionOutcome::NotFound);
    }

    #[test]
    fn next_up_prefers_upcoming_then_earliest_then_unscheduled() {
        let rows = vec![
            Occurrence::planned("early", "a1", day()).at(t("08:00"), 30),
            Occurrence::planned("late", "a2", day()).at(t("17:00"), 30),
            Occurrence::planned("loose", "a3", day()),
        ];
        let actions = vec![Action::recurring("a1", "c", WeekdaySet::ALL)];

        let next = next_up(&rows, &actions, now(12, 0), day()).unwrap();
        assert_eq!((next.occurrence.id.as_str(), next.reason), ("late", NextReason::Upcoming));

        let next = next_up(&rows, &actions, now(18, 0), day()).unwrap();
        assert_eq!(
            (next.occurrence.id.as_str(), next.reason),
            ("early", NextReason::EarliestOfDay)
        );

        let next = next_up(&rows[2..], &actions, now(18, 0), day()).unwrap();
        assert_eq!(next.reason, NextReason::Unscheduled);
        assert!(next_up(&[], &actions, now(18, 0), day()).is_none());
    }

    #[test]
    fn next_up_uses_priority_tier_before_ids() {
        let rows = vec![
            Occurrence::planned("o1", "a1", day()).at(t("10:00"), 30),
            Occurrence::planned("o2", "a2", day()).at(t("10:00"), 30),
        ];
        let actions = vec![
            Action::recurring("a1", "c", WeekdaySet::ALL).with_priority(PriorityTier::Bonus),
            Action::recurring("a2", "c", WeekdaySet::ALL).with_priority(PriorityTier::Primary),
        ];
        let next = next_up(&rows, &actions, now(9, 0), day()).unwrap();
        assert_eq!(next.occurrence.id, "o2");
    }
}
