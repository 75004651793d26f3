//! Window materializer: expand recurrences into dated occurrences.
//!
//! Entry points:
//! - [`materialize_action`] / [`regenerate_action`]: inline (legacy) schedules
//! - [`materialize_rule`] / [`regenerate_rules`]: first-class rules, with
//!   attach, in-place update and missed detection
//! - [`materialize_snapshot`]: every action of a snapshot, then dedupe
//!
//! Inputs are never mutated. Results are `Cow`s that stay `Borrowed` when a
//! call changed nothing, so callers can skip persistence.

use std::borrow::Cow;
use std::collections::{BTreeSet, HashSet};
use std::ops::AddAssign;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::conflict::{fixed_intervals, place_exact, place_nearest, resolve_window_items, Placement};
use crate::dedupe::dedupe_occurrences;
use crate::model::{occurrence_id, Action, Occurrence, OccurrenceStatus, RecurrenceRule, SlotKey, Snapshot, TimeType};
use crate::recurrence::{PlacementPolicy, PlannedSlot, Recurrence, ScheduleSource};

/// Per-call change counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaterializeStats {
    pub inserted: usize,
    pub updated: usize,
    pub attached: usize,
    pub missed: usize,
    pub pruned: usize,
}

impl MaterializeStats {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl AddAssign for MaterializeStats {
    fn add_assign(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.attached += other.attached;
        self.missed += other.missed;
        self.pruned += other.pruned;
    }
}

#[derive(Debug, Clone)]
pub struct MaterializeOutcome<'a> {
    pub occurrences: Cow<'a, [Occurrence]>,
    pub stats: MaterializeStats,
}

impl MaterializeOutcome<'_> {
    /// False when the input collection was returned as-is.
    pub fn changed(&self) -> bool {
        matches!(self.occurrences, Cow::Owned(_))
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotOutcome<'a> {
    pub snapshot: Cow<'a, Snapshot>,
    pub stats: MaterializeStats,
}

impl SnapshotOutcome<'_> {
    pub fn changed(&self) -> bool {
        matches!(self.snapshot, Cow::Owned(_))
    }
}

/// Expand an action's inline schedule over `[start, start + window_days)`.
///
/// Slots already present for `(action, date, slot)` are left alone, so a
/// second call with the same inputs returns the collection unchanged.
/// Unschedulable actions are a no-op.
pub fn materialize_action<'a>(
    action: &Action,
    occurrences: &'a [Occurrence],
    start: NaiveDate,
    config: &EngineConfig,
) -> MaterializeOutcome<'a> {
    let mut current = Cow::Borrowed(occurrences);
    let mut stats = MaterializeStats::default();
    if let Some(recurrence) = Recurrence::from_action(action, config) {
        stats = expand(ScheduleSource::Legacy(action), &recurrence, &mut current, start, config);
    }
    log_stats(&action.id, &stats);
    MaterializeOutcome {
        occurrences: current,
        stats,
    }
}

/// Prune the action's planned rows dated on or after `pivot`, then expand
/// again from `start`. Used after an edit changes cadence or timing.
pub fn regenerate_action<'a>(
    action: &Action,
    occurrences: &'a [Occurrence],
    pivot: NaiveDate,
    start: NaiveDate,
    config: &EngineConfig,
) -> MaterializeOutcome<'a> {
    let mut current = Cow::Borrowed(occurrences);
    let mut stats = MaterializeStats::default();

    stats.pruned = prune(&mut current, |o| o.action_id == action.id && o.date >= pivot);
    if let Some(recurrence) = Recurrence::from_action(action, config) {
        stats += expand(ScheduleSource::Legacy(action), &recurrence, &mut current, start, config);
    }

    settle(occurrences, current, stats, &action.id)
}

/// Expand one rule, then mark its overdue planned rows `missed`.
///
/// On top of [`materialize_action`]:
/// - a matching planned legacy row (same action, date and slot, no rule)
///   is attached to the rule instead of duplicated
/// - a planned row of this rule whose time or duration no longer matches
///   is updated in place, keeping its id
/// - planned rows of this rule that ended more than the configured grace
///   before `now` become `missed`
///
/// Inactive rules are a no-op.
pub fn materialize_rule<'a>(
    rule: &RecurrenceRule,
    occurrences: &'a [Occurrence],
    start: NaiveDate,
    now: NaiveDateTime,
    config: &EngineConfig,
) -> MaterializeOutcome<'a> {
    let mut current = Cow::Borrowed(occurrences);
    let stats = run_rule(rule, &mut current, start, now, config);
    log_stats(&rule.action_id, &stats);
    MaterializeOutcome {
        occurrences: current,
        stats,
    }
}

/// Re-run every active rule of `action_id` after a rule edit.
///
/// From `pivot` on, planned rows of the action are pruned unless an active
/// rule still produces their date within the horizon from `start`. Rows
/// that survive keep their id and are reshaped in place. Active rules then
/// expand from `start`, and planned rows of the action still without a
/// rule are pruned.
pub fn regenerate_rules<'a>(
    action_id: &str,
    rules: &[RecurrenceRule],
    occurrences: &'a [Occurrence],
    pivot: NaiveDate,
    start: NaiveDate,
    now: NaiveDateTime,
    config: &EngineConfig,
) -> MaterializeOutcome<'a> {
    let active: Vec<&RecurrenceRule> = rules
        .iter()
        .filter(|r| r.active && r.action_id == action_id)
        .collect();
    let produced: HashSet<(&str, NaiveDate)> = active
        .iter()
        .flat_map(|r| {
            Recurrence::from_rule(r)
                .dates(start, config.window_days)
                .into_iter()
                .map(move |date| (r.id.as_str(), date))
        })
        .collect();

    let mut current = Cow::Borrowed(occurrences);
    let mut stats = MaterializeStats::default();

    stats.pruned = prune(&mut current, |o| {
        o.action_id == action_id
            && o.date >= pivot
            && o.rule_id.as_deref().is_some_and(|id| !produced.contains(&(id, o.date)))
    });
    for rule in &active {
        stats += run_rule(rule, &mut current, start, now, config);
    }
    if !active.is_empty() {
        stats.pruned += prune(&mut current, |o| {
            o.action_id == action_id && o.date >= pivot && o.rule_id.is_none()
        });
    }

    settle(occurrences, current, stats, action_id)
}

/// Mark planned rows of `rule_id` as `missed` once `now` is past their end
/// plus the configured grace. Rows without a resolvable end are skipped.
pub fn mark_missed<'a>(
    occurrences: &'a [Occurrence],
    rule_id: &str,
    now: NaiveDateTime,
    config: &EngineConfig,
) -> MaterializeOutcome<'a> {
    let mut current = Cow::Borrowed(occurrences);
    let missed = mark_missed_in(&mut current, rule_id, now, config);
    MaterializeOutcome {
        occurrences: current,
        stats: MaterializeStats {
            missed,
            ..MaterializeStats::default()
        },
    }
}

/// Materialize every action of `snapshot`, then dedupe.
///
/// Actions owning active rules take the rule path; the rest expand their
/// inline schedule. Rules and actions are never added or removed here.
pub fn materialize_snapshot<'a>(
    snapshot: &'a Snapshot,
    start: NaiveDate,
    now: NaiveDateTime,
    config: &EngineConfig,
) -> SnapshotOutcome<'a> {
    let mut current = Cow::Borrowed(snapshot.occurrences.as_slice());
    let mut stats = MaterializeStats::default();

    for action in &snapshot.actions {
        let rules: Vec<&RecurrenceRule> = snapshot.active_rules_for(&action.id).collect();
        if rules.is_empty() {
            if let Some(recurrence) = Recurrence::from_action(action, config) {
                stats += expand(ScheduleSource::Legacy(action), &recurrence, &mut current, start, config);
            }
        } else {
            for rule in rules {
                stats += run_rule(rule, &mut current, start, now, config);
            }
        }
    }

    let deduped = match dedupe_occurrences(&current) {
        Cow::Owned(rows) => Some(rows),
        Cow::Borrowed(_) => None,
    };
    if let Some(rows) = deduped {
        stats.pruned += current.len() - rows.len();
        current = Cow::Owned(rows);
    }

    tracing::debug!(
        actions = snapshot.actions.len(),
        inserted = stats.inserted,
        updated = stats.updated,
        attached = stats.attached,
        missed = stats.missed,
        pruned = stats.pruned,
        "materialized snapshot"
    );

    let snapshot = match current {
        Cow::Borrowed(_) => Cow::Borrowed(snapshot),
        Cow::Owned(occurrences) => Cow::Owned(Snapshot {
            actions: snapshot.actions.clone(),
            rules: snapshot.rules.clone(),
            occurrences,
        }),
    };
    SnapshotOutcome { snapshot, stats }
}

fn run_rule(
    rule: &RecurrenceRule,
    current: &mut Cow<'_, [Occurrence]>,
    start: NaiveDate,
    now: NaiveDateTime,
    config: &EngineConfig,
) -> MaterializeStats {
    if !rule.active {
        return MaterializeStats::default();
    }
    let recurrence = Recurrence::from_rule(rule);
    let mut stats = expand(ScheduleSource::Rule(rule), &recurrence, current, start, config);
    stats.missed += mark_missed_in(current, &rule.id, now, config);
    stats
}

/// Shared pipeline for both schedule sources.
fn expand(
    source: ScheduleSource<'_>,
    recurrence: &Recurrence,
    current: &mut Cow<'_, [Occurrence]>,
    start: NaiveDate,
    config: &EngineConfig,
) -> MaterializeStats {
    let default_minutes = config.default_duration_minutes;
    let mut stats = MaterializeStats::default();
    let mut touched: BTreeSet<NaiveDate> = BTreeSet::new();

    for date in recurrence.dates(start, config.window_days) {
        for slot in recurrence.slots_on(date, default_minutes) {
            let change = match source {
                ScheduleSource::Legacy(_) => {
                    if find_slot(current, source.action_id(), date, &slot, |_| true).is_some() {
                        continue;
                    }
                    insert_slot(source, recurrence.policy, current, date, &slot, config)
                }
                ScheduleSource::Rule(rule) => apply_rule_slot(rule, recurrence.policy, current, date, &slot, config),
            };
            match change {
                Change::None => continue,
                Change::Inserted => stats.inserted += 1,
                Change::Updated => stats.updated += 1,
                Change::Attached => stats.attached += 1,
            }
            touched.insert(date);
        }
    }

    for date in touched {
        let resolved = match resolve_window_items(current, date, default_minutes) {
            Cow::Owned(rows) => Some(rows),
            Cow::Borrowed(_) => None,
        };
        if let Some(rows) = resolved {
            *current = Cow::Owned(rows);
        }
    }

    stats
}

enum Change {
    None,
    Inserted,
    Updated,
    Attached,
}

/// A rule places at most one slot per date.
fn apply_rule_slot(
    rule: &RecurrenceRule,
    policy: PlacementPolicy,
    current: &mut Cow<'_, [Occurrence]>,
    date: NaiveDate,
    slot: &PlannedSlot,
    config: &EngineConfig,
) -> Change {
    let own = current
        .iter()
        .position(|o| o.date == date && o.rule_id.as_deref() == Some(rule.id.as_str()));
    if let Some(idx) = own {
        let row = &current[idx];
        if row.status.is_terminal() || matches_exactly(row, slot) {
            return Change::None;
        }
        let updated = reshape(row, slot, policy, current, config);
        tracing::trace!(occurrence = %updated.id, rule = %rule.id, "rule row updated in place");
        current.to_mut()[idx] = updated;
        return Change::Updated;
    }

    let legacy = find_slot(current, &rule.action_id, date, slot, |o| o.rule_id.is_none());
    if let Some(idx) = legacy {
        if current[idx].status.is_terminal() {
            return Change::None;
        }
        let mut row = current[idx].clone();
        row.rule_id = Some(rule.id.clone());
        if !matches_exactly(&row, slot) {
            row = reshape(&row, slot, policy, current, config);
        }
        tracing::trace!(occurrence = %row.id, rule = %rule.id, "legacy row attached to rule");
        current.to_mut()[idx] = row;
        return Change::Attached;
    }

    insert_slot(ScheduleSource::Rule(rule), policy, current, date, slot, config)
}

fn insert_slot(
    source: ScheduleSource<'_>,
    policy: PlacementPolicy,
    current: &mut Cow<'_, [Occurrence]>,
    date: NaiveDate,
    slot: &PlannedSlot,
    config: &EngineConfig,
) -> Change {
    let action_id = source.action_id();
    let requested_key = match *slot {
        PlannedSlot::Timed { start, .. } => SlotKey::Time(start),
        PlannedSlot::Window { start, end, .. } => SlotKey::Window { start, end },
        PlannedSlot::Untimed { .. } => SlotKey::Untimed,
    };
    let id = occurrence_id(action_id, date, &requested_key, source.rule_id());

    let mut row = reshape(&Occurrence::planned(id, action_id, date), slot, policy, current, config);
    row.rule_id = source.rule_id().map(str::to_string);

    tracing::trace!(
        occurrence = %row.id,
        action = action_id,
        %date,
        slot = %requested_key,
        conflict = row.conflict,
        "occurrence inserted"
    );
    current.to_mut().push(row);
    Change::Inserted
}

/// Copy of `row` laid out for `slot`, placing timed slots against the
/// fixed items already on the date.
fn reshape(
    row: &Occurrence,
    slot: &PlannedSlot,
    policy: PlacementPolicy,
    current: &[Occurrence],
    config: &EngineConfig,
) -> Occurrence {
    let mut base = Occurrence::planned(row.id.clone(), row.action_id.clone(), row.date);
    base.rule_id = row.rule_id.clone();
    base.points = row.points;

    match *slot {
        PlannedSlot::Timed { start, minutes } => {
            let busy = fixed_intervals(current, row.date, config.default_duration_minutes, Some(row.id.as_str()));
            let Placement { start: placed, conflict } = match policy {
                PlacementPolicy::Exact => place_exact(&busy, start, minutes as i64),
                PlacementPolicy::Nearest => {
                    let candidates = &config.placement.candidate_slots;
                    let candidates = (!candidates.is_empty()).then_some(candidates.as_slice());
                    place_nearest(&busy, start, minutes as i64, candidates, &config.placement)
                }
            };
            let mut out = base.at(placed, minutes);
            out.requested_start = (placed != start).then_some(start);
            out.conflict = conflict;
            out
        }
        PlannedSlot::Window { start, end, minutes } => base.in_window(start, end, minutes),
        PlannedSlot::Untimed { minutes } => {
            base.duration_minutes = Some(minutes);
            base.time_type = Some(TimeType::Untimed);
            base
        }
    }
}

/// Row of `action_id` on `date` occupying `slot`, ignoring duration.
fn find_slot(
    rows: &[Occurrence],
    action_id: &str,
    date: NaiveDate,
    slot: &PlannedSlot,
    extra: impl Fn(&Occurrence) -> bool,
) -> Option<usize> {
    rows.iter().position(|o| {
        o.action_id == action_id
            && o.date == date
            && extra(o)
            && match *slot {
                PlannedSlot::Timed { start, .. } => {
                    !o.is_window_item() && (o.start == Some(start) || o.requested_start == Some(start))
                }
                PlannedSlot::Window { start, end, .. } => {
                    o.is_window_item() && o.window_start == Some(start) && o.window_end == Some(end)
                }
                PlannedSlot::Untimed { .. } => o.slot_key() == SlotKey::Untimed,
            }
    })
}

/// Whether `row` already reflects `slot`, duration included.
fn matches_exactly(row: &Occurrence, slot: &PlannedSlot) -> bool {
    match *slot {
        PlannedSlot::Timed { start, minutes } => {
            !row.is_window_item()
                && (row.start == Some(start) || row.requested_start == Some(start))
                && row.duration() == Some(minutes)
        }
        PlannedSlot::Window { start, end, minutes } => {
            row.is_window_item()
                && row.window_start == Some(start)
                && row.window_end == Some(end)
                && row.duration() == Some(minutes)
        }
        PlannedSlot::Untimed { minutes } => {
            row.slot_key() == SlotKey::Untimed && row.duration_minutes == Some(minutes)
        }
    }
}

fn mark_missed_in(
    current: &mut Cow<'_, [Occurrence]>,
    rule_id: &str,
    now: NaiveDateTime,
    config: &EngineConfig,
) -> usize {
    let grace = config.missed_grace();
    let overdue: Vec<usize> = current
        .iter()
        .enumerate()
        .filter(|(_, o)| o.status == OccurrenceStatus::Planned && o.rule_id.as_deref() == Some(rule_id))
        .filter(|(_, o)| {
            resolved_end(o, config.default_duration_minutes).is_some_and(|end| now > end + grace)
        })
        .map(|(i, _)| i)
        .collect();

    if overdue.is_empty() {
        return 0;
    }
    let rows = current.to_mut();
    for &idx in &overdue {
        tracing::debug!(occurrence = %rows[idx].id, "marking occurrence missed");
        rows[idx].status = OccurrenceStatus::Missed;
    }
    overdue.len()
}

/// End instant of a placed row, or the window end of an unplaced window item.
fn resolved_end(occ: &Occurrence, default_minutes: u32) -> Option<NaiveDateTime> {
    occ.end_instant(default_minutes).or_else(|| {
        if occ.is_window_item() {
            occ.window_end.map(|end| end.on(occ.date))
        } else {
            None
        }
    })
}

/// Remove planned rows matching `pred`; returns the number removed.
fn prune(current: &mut Cow<'_, [Occurrence]>, pred: impl Fn(&Occurrence) -> bool) -> usize {
    let doomed = |o: &Occurrence| o.status == OccurrenceStatus::Planned && pred(o);
    let count = current.iter().filter(|&o| doomed(o)).count();
    if count > 0 {
        let kept: Vec<Occurrence> = current.iter().filter(|&o| !doomed(o)).cloned().collect();
        *current = Cow::Owned(kept);
    }
    count
}

/// Collapse a prune-and-rebuild that reproduced the input back to `Borrowed`.
///
/// Rebuilt rows are appended, so the comparison ignores row order.
fn settle<'a>(
    original: &'a [Occurrence],
    current: Cow<'a, [Occurrence]>,
    stats: MaterializeStats,
    subject: &str,
) -> MaterializeOutcome<'a> {
    if let Cow::Owned(rows) = &current {
        if same_rows(rows, original) {
            tracing::debug!(action = subject, "regeneration reproduced existing rows");
            return MaterializeOutcome {
                occurrences: Cow::Borrowed(original),
                stats: MaterializeStats::default(),
            };
        }
    }
    log_stats(subject, &stats);
    MaterializeOutcome {
        occurrences: current,
        stats,
    }
}

fn same_rows(a: &[Occurrence], b: &[Occurrence]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    fn sorted(rows: &[Occurrence]) -> Vec<&Occurrence> {
        let mut refs: Vec<&Occurrence> = rows.iter().collect();
        refs.sort_by(|x, y| x.id.cmp(&y.id));
        refs
    }
    sorted(a) == sorted(b)
}

fn log_stats(subject: &str, stats: &MaterializeStats) {
    if stats.is_empty() {
        tracing::trace!(action = subject, "materialization was a no-op");
    } else {
        tracing::debug!(
            action = subject,
            inserted = stats.inserted,
            updated = stats.updated,
            attached = stats.attached,
            missed = stats.missed,
            pruned = stats.pruned,
            "materialized"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RuleKind, RuleTime, SlotSpec};
    use crate::time::{ClockTime, WeekdaySet};
    use chrono::{TimeZone, Utc};

    fn t(s: &str) -> ClockTime {
        s.parse().unwrap()
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn at(date: NaiveDate, hh: u32, mm: u32) -> NaiveDateTime {
        date.and_hms_opt(hh, mm, 0).unwrap()
    }

    fn mwf() -> WeekdaySet {
        WeekdaySet::from_iso(&[1, 3, 5]).unwrap()
    }

    fn cfg() -> EngineConfig {
        EngineConfig {
            window_days: 7,
            ..EngineConfig::default()
        }
    }

    fn rule(time: RuleTime, minutes: u32) -> RecurrenceRule {
        let created = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        RecurrenceRule::new("a1", RuleKind::Recurring { weekdays: mwf() }, 0, time, minutes, created)
    }

    #[test]
    fn weekly_fixed_action_materializes_three_rows() {
        let action = Action::recurring("a1", "c1", mwf()).fixed_at(t("09:00"), 30);
        let out = materialize_action(&action, &[], monday(), &cfg());
        assert_eq!(out.stats.inserted, 3);
        assert!(out
            .occurrences
            .iter()
            .all(|o| o.status == OccurrenceStatus::Planned && o.start == Some(t("09:00"))));
    }

    #[test]
    fn second_pass_is_borrowed() {
        let action = Action::recurring("a1", "c1", mwf()).fixed_at(t("09:00"), 30);
        let first = materialize_action(&action, &[], monday(), &cfg()).occurrences.into_owned();
        let second = materialize_action(&action, &first, monday(), &cfg());
        assert!(!second.changed());
        assert_eq!(second.occurrences.as_ref(), first.as_slice());
    }

    #[test]
    fn nearest_relocation_is_remembered() {
        let blocker = Occurrence::planned("busy", "other", monday()).at(t("09:00"), 60);
        let action = Action::one_off("a1", "c1", monday()).fixed_at(t("09:00"), 30);

        let first = materialize_action(&action, &[blocker], monday(), &cfg()).occurrences.into_owned();
        let placed = first.iter().find(|o| o.action_id == "a1").unwrap();
        // 08:30 touches the blocker without overlapping it
        assert_eq!(placed.start, Some(t("08:30")));
        assert_eq!(placed.requested_start, Some(t("09:00")));
        assert!(!placed.conflict);

        assert!(!materialize_action(&action, &first, monday(), &cfg()).changed());
    }

    #[test]
    fn weekday_table_keeps_chosen_time_and_flags_conflict() {
        let blocker = Occurrence::planned("busy", "other", monday()).at(t("07:00"), 60);
        let action = Action::recurring("a1", "c1", WeekdaySet::EMPTY).with_weekday_slot(1, SlotSpec::at(t("07:30")));
        let rows = vec![blocker];
        let out = materialize_action(&action, &rows, monday(), &cfg());
        let row = out.occurrences.iter().find(|o| o.action_id == "a1").unwrap();
        assert_eq!(row.start, Some(t("07:30")));
        assert!(row.conflict);
    }

    #[test]
    fn window_rows_are_gap_filled() {
        let rows = vec![
            Occurrence::planned("f1", "x", monday()).at(t("09:00"), 60),
            Occurrence::planned("f2", "y", monday()).at(t("11:00"), 60),
        ];
        let action = Action::one_off("a1", "c1", monday()).within_window(t("10:00"), t("12:00"), 30);
        let out = materialize_action(&action, &rows, monday(), &cfg());
        let row = out.occurrences.iter().find(|o| o.action_id == "a1").unwrap();
        assert_eq!(row.resolved_start, Some(t("10:00")));
        assert!(row.start.is_none());
        assert!(!row.conflict);
    }

    #[test]
    fn untimed_action_creates_tagged_rows() {
        let action = Action::recurring("a1", "c1", WeekdaySet::from_iso(&[1]).unwrap());
        let out = materialize_action(&action, &[], monday(), &cfg());
        assert_eq!(out.occurrences.len(), 1);
        assert_eq!(out.occurrences[0].time_type, Some(TimeType::Untimed));
        assert!(out.occurrences[0].is_anytime());

        let report = crate::metrics::aggregate(&out.occurrences, &[action], &Default::default());
        assert_eq!(report.total.expected, 0);
    }

    #[test]
    fn anytime_action_is_noop() {
        let out = materialize_action(&Action::anytime("a1", "c1"), &[], monday(), &cfg());
        assert!(!out.changed());
        assert!(out.stats.is_empty());
    }

    #[test]
    fn regenerate_replaces_future_planned_rows_only() {
        let action = Action::recurring("a1", "c1", mwf()).fixed_at(t("09:00"), 30);
        let mut rows = materialize_action(&action, &[], monday(), &cfg()).occurrences.into_owned();
        rows[0].status = OccurrenceStatus::Done;

        let edited = action.clone().fixed_at(t("18:00"), 30);
        let out = regenerate_action(&edited, &rows, monday(), monday(), &cfg());
        assert_eq!(out.stats.pruned, 2);

        let starts: Vec<_> = out.occurrences.iter().map(|o| (o.status, o.start)).collect();
        assert!(starts.contains(&(OccurrenceStatus::Done, Some(t("09:00")))));
        assert_eq!(
            out.occurrences
                .iter()
                .filter(|o| o.status == OccurrenceStatus::Planned && o.start == Some(t("18:00")))
                .count(),
            3
        );

        let again = regenerate_action(&edited, &out.occurrences, monday(), monday(), &cfg());
        assert!(!again.changed());
    }

    #[test]
    fn rule_attaches_to_matching_legacy_row() {
        let legacy = Occurrence::planned("legacy", "a1", monday()).at(t("09:00"), 30);
        let r = rule(RuleTime::Fixed { start: t("09:00") }, 30);
        let rows = vec![legacy];
        let out = materialize_rule(&r, &rows, monday(), at(monday(), 6, 0), &cfg());
        assert_eq!(out.stats.attached, 1);
        assert_eq!(out.stats.inserted, 2);
        let attached = out.occurrences.iter().find(|o| o.id == "legacy").unwrap();
        assert_eq!(attached.rule_id.as_deref(), Some(r.id.as_str()));
    }

    #[test]
    fn attached_row_takes_rule_duration_once() {
        let legacy = Occurrence::planned("legacy", "a1", monday()).at(t("09:00"), 60);
        let r = rule(RuleTime::Fixed { start: t("09:00") }, 30);
        let rows = vec![legacy];
        let now = at(monday(), 6, 0);

        let first = materialize_rule(&r, &rows, monday(), now, &cfg());
        assert_eq!(first.stats.attached, 1);
        let first = first.occurrences.into_owned();
        let attached = first.iter().find(|o| o.id == "legacy").unwrap();
        assert_eq!(attached.start, Some(t("09:00")));
        assert_eq!(attached.duration(), Some(30));

        let second = materialize_rule(&r, &first, monday(), now, &cfg());
        assert!(!second.changed());
        assert!(second.stats.is_empty());
    }

    #[test]
    fn regenerate_rules_follows_weekday_edit() {
        let r = rule(RuleTime::Fixed { start: t("09:00") }, 30);
        let now = at(monday(), 6, 0);
        let rows = materialize_rule(&r, &[], monday(), now, &cfg()).occurrences.into_owned();
        assert_eq!(rows.len(), 3);

        let mut edited = r.clone();
        edited.kind = RuleKind::Recurring {
            weekdays: WeekdaySet::from_iso(&[2]).unwrap(),
        };
        let rules = vec![edited];
        let out = regenerate_rules("a1", &rules, &rows, monday(), monday(), now, &cfg());
        assert_eq!(out.stats.pruned, 3);
        assert_eq!(out.stats.inserted, 1);
        let weekdays: Vec<u8> = out.occurrences.iter().map(|o| crate::time::iso_weekday(o.date)).collect();
        assert_eq!(weekdays, vec![2]);

        let again = regenerate_rules("a1", &rules, &out.occurrences, monday(), monday(), now, &cfg());
        assert!(!again.changed());
    }

    #[test]
    fn regenerate_keeps_terminal_rows_of_dropped_days() {
        let r = rule(RuleTime::Fixed { start: t("09:00") }, 30);
        let now = at(monday(), 6, 0);
        let mut rows = materialize_rule(&r, &[], monday(), now, &cfg()).occurrences.into_owned();
        rows[0].status = OccurrenceStatus::Done;

        let mut edited = r.clone();
        edited.kind = RuleKind::Recurring {
            weekdays: WeekdaySet::from_iso(&[2]).unwrap(),
        };
        let out = regenerate_rules("a1", &[edited], &rows, monday(), monday(), now, &cfg());
        assert_eq!(out.stats.pruned, 2);
        assert!(out
            .occurrences
            .iter()
            .any(|o| o.date == monday() && o.status == OccurrenceStatus::Done));
    }

    #[test]
    fn unchanged_regenerate_ignores_row_order() {
        let action = Action::recurring("a1", "c1", mwf()).fixed_at(t("09:00"), 30);
        let own = materialize_action(&action, &[], monday(), &cfg()).occurrences.into_owned();
        let rows = vec![
            own[0].clone(),
            Occurrence::planned("other", "b1", monday()).at(t("12:00"), 30),
            own[1].clone(),
            own[2].clone(),
        ];

        let out = regenerate_action(&action, &rows, monday(), monday(), &cfg());
        assert!(!out.changed());
        assert!(out.stats.is_empty());
        assert_eq!(out.occurrences[1].id, "other");
    }

    #[test]
    fn rule_time_change_updates_in_place() {
        let r = rule(RuleTime::Fixed { start: t("09:00") }, 30);
        let now = at(monday(), 6, 0);
        let rows = materialize_rule(&r, &[], monday(), now, &cfg()).occurrences.into_owned();
        let ids: Vec<String> = rows.iter().map(|o| o.id.clone()).collect();

        let mut edited = r.clone();
        edited.time = RuleTime::Fixed { start: t("10:15") };
        edited.duration_minutes = 45;
        let out = materialize_rule(&edited, &rows, monday(), now, &cfg());
        assert_eq!(out.stats.updated, 3);
        assert_eq!(out.stats.inserted, 0);
        let new_ids: Vec<String> = out.occurrences.iter().map(|o| o.id.clone()).collect();
        assert_eq!(ids, new_ids);
        assert!(out.occurrences.iter().all(|o| o.start == Some(t("10:15")) && o.duration() == Some(45)));
    }

    #[test]
    fn missed_transition_applies_once() {
        let r = rule(RuleTime::Fixed { start: t("09:00") }, 30);
        let rows = materialize_rule(&r, &[], monday(), at(monday(), 6, 0), &cfg()).occurrences.into_owned();

        let now = at(monday(), 9, 31);
        let first = materialize_rule(&r, &rows, monday(), now, &cfg());
        assert_eq!(first.stats.missed, 1);
        let first = first.occurrences.into_owned();
        assert_eq!(first[0].status, OccurrenceStatus::Missed);

        let second = materialize_rule(&r, &first, monday(), now, &cfg());
        assert!(!second.changed());
    }

    #[test]
    fn missed_respects_grace() {
        let r = rule(RuleTime::Fixed { start: t("09:00") }, 30);
        let rows = materialize_rule(&r, &[], monday(), at(monday(), 6, 0), &cfg()).occurrences.into_owned();
        let config = EngineConfig {
            missed_grace_minutes: 15,
            ..cfg()
        };
        let out = mark_missed(&rows, &r.id, at(monday(), 9, 40), &config);
        assert_eq!(out.stats.missed, 0);
        let out = mark_missed(&rows, &r.id, at(monday(), 9, 46), &config);
        assert_eq!(out.stats.missed, 1);
    }

    #[test]
    fn regenerate_rules_drops_rows_of_deactivated_rules() {
        let morning = rule(RuleTime::Fixed { start: t("09:00") }, 30);
        let now = at(monday(), 6, 0);
        let rows = materialize_rule(&morning, &[], monday(), now, &cfg()).occurrences.into_owned();

        let mut retired = morning.clone();
        retired.active = false;
        let evening = RecurrenceRule::new(
            "a1",
            RuleKind::Recurring { weekdays: WeekdaySet::from_iso(&[2]).unwrap() },
            0,
            RuleTime::Fixed { start: t("19:00") },
            30,
            morning.created_at,
        );
        let out = regenerate_rules("a1", &[retired, evening.clone()], &rows, monday(), monday(), now, &cfg());
        assert_eq!(out.stats.pruned, 3);
        assert_eq!(out.stats.inserted, 1);
        assert!(out.occurrences.iter().all(|o| o.rule_id.as_deref() == Some(evening.id.as_str())));
    }

    #[test]
    fn snapshot_pipeline_is_idempotent() {
        let snapshot = Snapshot {
            actions: vec![
                Action::recurring("a1", "c1", mwf()).fixed_at(t("09:00"), 30),
                Action::recurring("a2", "c1", mwf()).within_window(t("08:00"), t("12:00"), 60),
            ],
            rules: Vec::new(),
            occurrences: Vec::new(),
        };
        let now = at(monday(), 6, 0);
        let first = materialize_snapshot(&snapshot, monday(), now, &cfg());
        assert!(first.changed());
        assert_eq!(first.stats.inserted, 6);

        let window_row = first
            .snapshot
            .occurrences
            .iter()
            .find(|o| o.action_id == "a2" && o.date == monday())
            .unwrap();
        assert_eq!(window_row.resolved_start, Some(t("08:00")));

        let materialized = first.snapshot.into_owned();
        let second = materialize_snapshot(&materialized, monday(), now, &cfg());
        assert!(!second.changed());
    }
}
