//! Action: a recurring or one-off obligation owned by a category.
//!
//! Actions are created and edited outside the engine. Identity never
//! changes; the recurrence fields do, and the materializer re-reads them on
//! every pass.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::time::{ClockTime, WeekdaySet};

/// How an action repeats.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecurrenceKind {
    /// Exactly one dated instance.
    OneOff,
    /// Repeats on a weekday set.
    Recurring,
    /// Never dated; done whenever. Not schedulable.
    Anytime,
}

impl Default for RecurrenceKind {
    fn default() -> Self {
        RecurrenceKind::Recurring
    }
}

/// Time-of-day policy selected for the action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimePolicy {
    /// No specific time of day.
    None,
    /// One preferred start time.
    Fixed,
    /// Flexible window `[preferred_start, window_end)`.
    Window,
    /// Explicit list of start slots.
    Slots,
}

impl Default for TimePolicy {
    fn default() -> Self {
        TimePolicy::None
    }
}

/// Presentation priority tier used by the "what's next" resolver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum PriorityTier {
    Primary,
    Secondary,
    Bonus,
}

impl Default for PriorityTier {
    fn default() -> Self {
        PriorityTier::Secondary
    }
}

/// A candidate start with an optional explicit end.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlotSpec {
    pub start: ClockTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<ClockTime>,
}

impl SlotSpec {
    pub fn at(start: ClockTime) -> Self {
        Self { start, end: None }
    }

    pub fn between(start: ClockTime, end: ClockTime) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    /// Minutes implied by `end - start`, if positive.
    pub fn implied_minutes(&self) -> Option<u32> {
        let end = self.end?;
        let minutes = self.start.minutes_until(end);
        (minutes > 0).then_some(minutes as u32)
    }
}

/// Schedule fields carried over from the inline (pre-rule) data model.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LegacySchedule {
    /// Explicit slots per ISO weekday (1 = Monday).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub weekday_slots: BTreeMap<u8, Vec<SlotSpec>>,
    /// Schedule-level slots applying to every candidate date.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub time_slots: Vec<SlotSpec>,
    /// Legacy start timestamp (RFC 3339 or `YYYY-MM-DDTHH:MM`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_at: Option<String>,
}

impl LegacySchedule {
    pub fn is_empty(&self) -> bool {
        self.weekday_slots.values().all(Vec::is_empty)
            && self.time_slots.is_empty()
            && self.start_at.is_none()
    }
}

/// An obligation the user intends to execute.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Action {
    /// Unique identifier (immutable)
    pub id: String,
    /// Owning category
    #[serde(default)]
    pub category_id: String,
    /// One-off, recurring or anytime
    #[serde(default)]
    pub kind: RecurrenceKind,
    /// Weekday set for recurring actions
    #[serde(default)]
    pub weekdays: WeekdaySet,
    /// Time-of-day policy
    #[serde(default)]
    pub time_policy: TimePolicy,
    /// Preferred start (FIXED) or window start (WINDOW)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_start: Option<ClockTime>,
    /// Window end (WINDOW)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_end: Option<ClockTime>,
    /// Start slots (SLOTS)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub slots: Vec<SlotSpec>,
    /// Session duration in minutes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    /// Date of a one-off action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_off_date: Option<NaiveDate>,
    /// Inline schedule from the legacy data model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<LegacySchedule>,
    #[serde(default)]
    pub priority: PriorityTier,
    /// Points credited per completed occurrence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<i64>,
}

impl Action {
    fn base(id: impl Into<String>, category_id: impl Into<String>, kind: RecurrenceKind) -> Self {
        Self {
            id: id.into(),
            category_id: category_id.into(),
            kind,
            weekdays: WeekdaySet::EMPTY,
            time_policy: TimePolicy::None,
            preferred_start: None,
            window_end: None,
            slots: Vec::new(),
            duration_minutes: None,
            one_off_date: None,
            schedule: None,
            priority: PriorityTier::default(),
            points: None,
        }
    }

    /// Recurring action on the given weekdays, untimed until a policy is set.
    pub fn recurring(id: impl Into<String>, category_id: impl Into<String>, weekdays: WeekdaySet) -> Self {
        Self {
            weekdays,
            ..Self::base(id, category_id, RecurrenceKind::Recurring)
        }
    }

    pub fn one_off(id: impl Into<String>, category_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            one_off_date: Some(date),
            ..Self::base(id, category_id, RecurrenceKind::OneOff)
        }
    }

    pub fn anytime(id: impl Into<String>, category_id: impl Into<String>) -> Self {
        Self::base(id, category_id, RecurrenceKind::Anytime)
    }

    pub fn fixed_at(mut self, start: ClockTime, minutes: u32) -> Self {
        self.time_policy = TimePolicy::Fixed;
        self.preferred_start = Some(start);
        self.duration_minutes = Some(minutes);
        self
    }

    pub fn within_window(mut self, start: ClockTime, end: ClockTime, minutes: u32) -> Self {
        self.time_policy = TimePolicy::Window;
        self.preferred_start = Some(start);
        self.window_end = Some(end);
        self.duration_minutes = Some(minutes);
        self
    }

    pub fn with_slots(mut self, slots: Vec<SlotSpec>) -> Self {
        self.time_policy = TimePolicy::Slots;
        self.slots = slots;
        self
    }

    /// Add an explicit slot for one ISO weekday to the legacy slot table.
    pub fn with_weekday_slot(mut self, iso_weekday: u8, slot: SlotSpec) -> Self {
        self.schedule
            .get_or_insert_with(LegacySchedule::default)
            .weekday_slots
            .entry(iso_weekday)
            .or_default()
            .push(slot);
        self
    }

    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }

    pub fn with_priority(mut self, priority: PriorityTier) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_points(mut self, points: i64) -> Self {
        self.points = Some(points);
        self
    }
}
