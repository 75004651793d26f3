//! Recurrence descriptor: one value type for "when and how an action repeats".
//!
//! Both schedule sources feed the same materialization pipeline:
//! - the inline schedule carried on an [`Action`] (legacy data model)
//! - first-class [`RecurrenceRule`]s
//!
//! Each is resolved into a [`Recurrence`], which yields candidate dates and
//! the slots to place on each date.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};

use crate::config::EngineConfig;
use crate::model::{Action, RecurrenceKind, RecurrenceRule, RuleKind, RuleTime, SlotSpec, TimePolicy};
use crate::time::{iso_weekday, parse_legacy_timestamp, ClockTime, WeekdaySet};

/// Which dates an action lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Once(NaiveDate),
    Weekly(WeekdaySet),
}

/// Which time(s) of day an occurrence is placed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Timing {
    Untimed,
    Window { start: ClockTime, end: ClockTime },
    /// Same slots on every candidate date.
    Fixed(Vec<SlotSpec>),
    /// Explicit slots per ISO weekday; dates without slots are skipped.
    PerWeekday(BTreeMap<u8, Vec<SlotSpec>>),
}

/// Conflict policy applied to timed slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementPolicy {
    /// Keep the chosen time, flag collisions.
    Exact,
    /// Move to the closest free start.
    Nearest,
}

/// One slot to place on a concrete date, with its duration resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannedSlot {
    Timed { start: ClockTime, minutes: u32 },
    Window { start: ClockTime, end: ClockTime, minutes: u32 },
    Untimed { minutes: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recurrence {
    pub cadence: Cadence,
    pub timing: Timing,
    /// Session duration; slot-implied durations take precedence.
    pub duration_minutes: Option<u32>,
    pub policy: PlacementPolicy,
}

/// Where a recurrence came from.
#[derive(Debug, Clone, Copy)]
pub enum ScheduleSource<'a> {
    Legacy(&'a Action),
    Rule(&'a RecurrenceRule),
}

impl ScheduleSource<'_> {
    pub fn action_id(&self) -> &str {
        match self {
            ScheduleSource::Legacy(action) => &action.id,
            ScheduleSource::Rule(rule) => &rule.action_id,
        }
    }

    pub fn rule_id(&self) -> Option<&str> {
        match self {
            ScheduleSource::Legacy(_) => None,
            ScheduleSource::Rule(rule) => Some(&rule.id),
        }
    }
}

impl Recurrence {
    /// Resolve the inline schedule of `action`.
    ///
    /// Returns `None` when the action is not schedulable: ANYTIME actions,
    /// one-offs without a date, and recurring actions with neither a
    /// weekday set nor a per-weekday slot table.
    ///
    /// Slot resolution order: per-weekday slot table, time-policy slots,
    /// schedule-level slots, legacy start timestamp, configured default.
    pub fn from_action(action: &Action, config: &EngineConfig) -> Option<Self> {
        let table = action
            .schedule
            .as_ref()
            .map(|s| {
                s.weekday_slots
                    .iter()
                    .filter(|(day, slots)| (1..=7).contains(*day) && !slots.is_empty())
                    .map(|(day, slots)| (*day, slots.clone()))
                    .collect::<BTreeMap<_, _>>()
            })
            .unwrap_or_default();

        let cadence = match action.kind {
            RecurrenceKind::Anytime => return None,
            RecurrenceKind::OneOff => Cadence::Once(action.one_off_date?),
            RecurrenceKind::Recurring => {
                if action.weekdays.is_empty() && table.is_empty() {
                    return None;
                }
                Cadence::Weekly(action.weekdays)
            }
        };

        if !table.is_empty() {
            return Some(Self {
                cadence,
                timing: Timing::PerWeekday(table),
                duration_minutes: action.duration_minutes,
                policy: PlacementPolicy::Exact,
            });
        }

        let timing = resolve_inline_timing(action, config);
        Some(Self {
            cadence,
            timing,
            duration_minutes: action.duration_minutes,
            policy: PlacementPolicy::Nearest,
        })
    }

    /// Resolve a first-class rule. Rule times are explicit, so timed rules
    /// use the Exact policy.
    pub fn from_rule(rule: &RecurrenceRule) -> Self {
        let cadence = match rule.kind {
            RuleKind::Recurring { weekdays } => Cadence::Weekly(weekdays),
            RuleKind::OneTime { date } => Cadence::Once(date),
        };
        let timing = match rule.time {
            RuleTime::Fixed { start } => Timing::Fixed(vec![SlotSpec::at(start)]),
            RuleTime::Window { start, end } => Timing::Window { start, end },
        };
        Self {
            cadence,
            timing,
            duration_minutes: Some(rule.duration_minutes),
            policy: PlacementPolicy::Exact,
        }
    }

    /// Candidate dates in `[start, start + window_days)`.
    ///
    /// A one-off date is returned whenever it is on or after `start`, even
    /// past the horizon.
    pub fn dates(&self, start: NaiveDate, window_days: u32) -> Vec<NaiveDate> {
        match self.cadence {
            Cadence::Once(date) => {
                if date >= start {
                    vec![date]
                } else {
                    Vec::new()
                }
            }
            Cadence::Weekly(weekdays) => (0..window_days as i64)
                .filter_map(|offset| start.checked_add_signed(Duration::days(offset)))
                .filter(|date| match &self.timing {
                    Timing::PerWeekday(table) => table.contains_key(&iso_weekday(*date)),
                    _ => weekdays.contains(date.weekday()),
                })
                .collect(),
        }
    }

    /// Slots to place on `date`, in declaration order.
    pub fn slots_on(&self, date: NaiveDate, default_minutes: u32) -> Vec<PlannedSlot> {
        let session = self.duration_minutes.unwrap_or(default_minutes);
        let timed = |slot: &SlotSpec| PlannedSlot::Timed {
            start: slot.start,
            minutes: slot.implied_minutes().unwrap_or(session),
        };

        match &self.timing {
            Timing::Untimed => vec![PlannedSlot::Untimed { minutes: session }],
            Timing::Window { start, end } => vec![PlannedSlot::Window {
                start: *start,
                end: *end,
                minutes: session,
            }],
            Timing::Fixed(slots) => slots.iter().map(timed).collect(),
            Timing::PerWeekday(table) => table
                .get(&iso_weekday(date))
                .map(|slots| slots.iter().map(timed).collect())
                .unwrap_or_default(),
        }
    }
}

fn resolve_inline_timing(action: &Action, config: &EngineConfig) -> Timing {
    let schedule = action.schedule.as_ref();
    let schedule_slots = schedule.map(|s| s.time_slots.as_slice()).unwrap_or_default();
    let legacy_start = schedule
        .and_then(|s| s.start_at.as_deref())
        .and_then(parse_legacy_timestamp);

    match action.time_policy {
        TimePolicy::Window => {
            if let (Some(start), Some(end)) = (action.preferred_start, action.window_end) {
                if start < end {
                    return Timing::Window { start, end };
                }
            }
        }
        TimePolicy::None => {
            // Untimed unless the legacy schedule still pins a time.
            if schedule_slots.is_empty() && legacy_start.is_none() {
                return Timing::Untimed;
            }
        }
        TimePolicy::Slots if !action.slots.is_empty() => {
            return Timing::Fixed(action.slots.clone());
        }
        TimePolicy::Fixed => {
            if let Some(start) = action.preferred_start {
                return Timing::Fixed(vec![SlotSpec::at(start)]);
            }
        }
        TimePolicy::Slots => {}
    }

    if !schedule_slots.is_empty() {
        return Timing::Fixed(schedule_slots.to_vec());
    }
    let start = legacy_start.unwrap_or(config.default_start);
    Timing::Fixed(vec![SlotSpec::at(start)])
}
