//! Seed first-class recurrence rules from inline action schedules.
//!
//! Safe to run on every startup: rules upsert by source key, rules an
//! edited schedule no longer derives are deactivated, and only actions
//! whose rules changed get regenerated.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::materialize::{regenerate_rules, MaterializeStats};
use crate::model::{Action, RecurrenceRule, RuleKind, RuleTime, Snapshot};
use crate::recurrence::{Cadence, Recurrence, Timing};
use crate::time::{ClockTime, WeekdaySet};

/// Rules describing `action`'s inline schedule.
///
/// - per-weekday slot table: one rule per distinct `(start, duration)`
///   over the weekdays sharing it
/// - window: one window rule
/// - fixed, slots or legacy start: one fixed rule per slot
///
/// Untimed and unschedulable actions derive nothing.
pub fn derive_rules(action: &Action, config: &EngineConfig, now: DateTime<Utc>) -> Vec<RecurrenceRule> {
    let Some(recurrence) = Recurrence::from_action(action, config) else {
        return Vec::new();
    };
    let session = recurrence.duration_minutes.unwrap_or(config.default_duration_minutes);
    let kind = match recurrence.cadence {
        Cadence::Once(date) => RuleKind::OneTime { date },
        Cadence::Weekly(weekdays) => RuleKind::Recurring { weekdays },
    };
    let rule = |kind: RuleKind, ordinal: usize, time: RuleTime, minutes: u32| {
        RecurrenceRule::new(action.id.clone(), kind, ordinal, time, minutes, now)
    };

    match &recurrence.timing {
        Timing::Untimed => Vec::new(),
        Timing::Window { start, end } => vec![rule(kind, 0, RuleTime::Window { start: *start, end: *end }, session)],
        Timing::Fixed(slots) => slots
            .iter()
            .enumerate()
            .map(|(ordinal, slot)| {
                let minutes = slot.implied_minutes().unwrap_or(session);
                rule(kind, ordinal, RuleTime::Fixed { start: slot.start }, minutes)
            })
            .collect(),
        Timing::PerWeekday(table) => {
            let mut groups: BTreeMap<(ClockTime, u32), Vec<u8>> = BTreeMap::new();
            for (day, slots) in table {
                for slot in slots {
                    let minutes = slot.implied_minutes().unwrap_or(session);
                    groups.entry((slot.start, minutes)).or_default().push(*day);
                }
            }
            groups
                .into_iter()
                .enumerate()
                .filter_map(|(ordinal, ((start, minutes), days))| {
                    let weekdays = WeekdaySet::from_iso(&days).ok()?;
                    let kind = match recurrence.cadence {
                        Cadence::Once(date) => RuleKind::OneTime { date },
                        Cadence::Weekly(_) => RuleKind::Recurring { weekdays },
                    };
                    Some(rule(kind, ordinal, RuleTime::Fixed { start }, minutes))
                })
                .collect()
        }
    }
}

/// Counters from [`upsert_rules`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RuleUpsertStats {
    pub inserted: usize,
    pub updated: usize,
    pub deactivated: usize,
}

/// Upsert `derived` into `rules` by source key.
///
/// Existing rules keep their id and `created_at`; the schedule content,
/// `updated_at` and the active flag follow the derived rule. For every
/// action present in `derived`, its active rules whose source key was not
/// derived again are deactivated. Actions deriving nothing keep their rules.
/// Returns the action ids whose rules changed.
pub fn upsert_rules<'a>(
    rules: &'a [RecurrenceRule],
    derived: Vec<RecurrenceRule>,
) -> (Cow<'a, [RecurrenceRule]>, RuleUpsertStats, Vec<String>) {
    let mut result = Cow::Borrowed(rules);
    let mut stats = RuleUpsertStats::default();
    let mut touched: Vec<String> = Vec::new();

    // action id -> (derived source keys, stamp)
    let mut current_keys: BTreeMap<String, (HashSet<String>, DateTime<Utc>)> = BTreeMap::new();
    for rule in &derived {
        let entry = current_keys
            .entry(rule.action_id.clone())
            .or_insert_with(|| (HashSet::new(), rule.updated_at));
        entry.0.insert(rule.source_key.clone());
    }

    for rule in derived {
        let existing = result.iter().position(|r| r.source_key == rule.source_key);
        match existing {
            Some(idx) => {
                let current = &result[idx];
                if current.same_content(&rule) {
                    continue;
                }
                let row = &mut result.to_mut()[idx];
                row.kind = rule.kind;
                row.time = rule.time;
                row.duration_minutes = rule.duration_minutes;
                row.active = true;
                row.updated_at = rule.updated_at;
                stats.updated += 1;
            }
            None => {
                result.to_mut().push(rule.clone());
                stats.inserted += 1;
            }
        }
        if !touched.contains(&rule.action_id) {
            touched.push(rule.action_id);
        }
    }

    let stale: Vec<usize> = result
        .iter()
        .enumerate()
        .filter(|(_, r)| {
            r.active
                && current_keys
                    .get(&r.action_id)
                    .is_some_and(|(keys, _)| !keys.contains(&r.source_key))
        })
        .map(|(idx, _)| idx)
        .collect();
    for idx in stale {
        let row = &mut result.to_mut()[idx];
        if let Some((_, stamp)) = current_keys.get(&row.action_id) {
            row.updated_at = *stamp;
        }
        row.active = false;
        tracing::debug!(rule = %row.id, action = %row.action_id, "stale derived rule deactivated");
        stats.deactivated += 1;
        if !touched.contains(&row.action_id) {
            touched.push(row.action_id.clone());
        }
    }

    (result, stats, touched)
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport<'a> {
    #[serde(skip)]
    pub snapshot: Cow<'a, Snapshot>,
    pub rules: RuleUpsertStats,
    /// Actions regenerated, in snapshot order.
    pub regenerated: Vec<String>,
    pub occurrences: MaterializeStats,
}

impl MigrationReport<'_> {
    pub fn changed(&self) -> bool {
        matches!(self.snapshot, Cow::Owned(_))
    }
}

/// Derive and upsert rules for every action, then regenerate each action
/// whose rules changed, from `start`.
pub fn migrate_snapshot<'a>(
    snapshot: &'a Snapshot,
    start: NaiveDate,
    now: NaiveDateTime,
    config: &EngineConfig,
) -> MigrationReport<'a> {
    let stamp = Utc.from_utc_datetime(&now);
    let derived: Vec<RecurrenceRule> = snapshot
        .actions
        .iter()
        .flat_map(|action| derive_rules(action, config, stamp))
        .collect();

    let (rules, rule_stats, touched) = upsert_rules(&snapshot.rules, derived);

    let mut occurrences = Cow::Borrowed(snapshot.occurrences.as_slice());
    let mut stats = MaterializeStats::default();
    let mut regenerated = Vec::new();

    for action in snapshot.actions.iter().filter(|a| touched.contains(&a.id)) {
        let outcome = regenerate_rules(&action.id, &rules, &occurrences, start, start, now, config);
        stats += outcome.stats;
        let rows = match outcome.occurrences {
            Cow::Owned(rows) => Some(rows),
            Cow::Borrowed(_) => None,
        };
        if let Some(rows) = rows {
            occurrences = Cow::Owned(rows);
        }
        regenerated.push(action.id.clone());
    }

    tracing::info!(
        rules_inserted = rule_stats.inserted,
        rules_updated = rule_stats.updated,
        rules_deactivated = rule_stats.deactivated,
        regenerated = regenerated.len(),
        "migration pass finished"
    );

    let snapshot = match (rules, occurrences) {
        (Cow::Borrowed(_), Cow::Borrowed(_)) => Cow::Borrowed(snapshot),
        (rules, occurrences) => Cow::Owned(Snapshot {
            actions: snapshot.actions.clone(),
            rules: rules.into_owned(),
            occurrences: occurrences.into_owned(),
        }),
    };

    MigrationReport {
        snapshot,
        rules: rule_stats,
        regenerated,
        occurrences: stats,
    }
}
