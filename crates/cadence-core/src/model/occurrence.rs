//! Occurrence: one dated, optionally timed instance of an action.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ValidationError;
use crate::time::{ClockTime, Interval};

/// Lifecycle status of an occurrence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OccurrenceStatus {
    Planned,
    Done,
    Skipped,
    Canceled,
    Missed,
    Rescheduled,
}

impl OccurrenceStatus {
    /// Everything except `planned` is terminal and never rewritten by
    /// re-materialization.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OccurrenceStatus::Planned)
    }

    /// Rank used when two rows compete for one slot.
    pub fn rank(&self) -> u8 {
        match self {
            OccurrenceStatus::Done => 3,
            OccurrenceStatus::Planned => 2,
            OccurrenceStatus::Skipped => 1,
            _ => 0,
        }
    }

    /// Whether a row with this status blocks its interval for placement.
    pub fn occupies_time(&self) -> bool {
        matches!(
            self,
            OccurrenceStatus::Planned | OccurrenceStatus::Done | OccurrenceStatus::Missed
        )
    }
}

impl fmt::Display for OccurrenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OccurrenceStatus::Planned => "planned",
            OccurrenceStatus::Done => "done",
            OccurrenceStatus::Skipped => "skipped",
            OccurrenceStatus::Canceled => "canceled",
            OccurrenceStatus::Missed => "missed",
            OccurrenceStatus::Rescheduled => "rescheduled",
        };
        f.write_str(s)
    }
}

impl FromStr for OccurrenceStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "planned" => Ok(OccurrenceStatus::Planned),
            "done" => Ok(OccurrenceStatus::Done),
            "skipped" => Ok(OccurrenceStatus::Skipped),
            "canceled" | "cancelled" => Ok(OccurrenceStatus::Canceled),
            "missed" => Ok(OccurrenceStatus::Missed),
            "rescheduled" => Ok(OccurrenceStatus::Rescheduled),
            other => Err(ValidationError::InvalidValue {
                field: "status".into(),
                message: format!("unknown status '{other}'"),
            }),
        }
    }
}

/// How the occurrence's time of day was chosen.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TimeType {
    Fixed,
    Window,
    Untimed,
}

/// Canonical time key of an occurrence within its day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SlotKey {
    /// Start, or resolved start for placed window items.
    Time(ClockTime),
    /// Window item without a resolved start.
    Window { start: ClockTime, end: ClockTime },
    /// No time and no window.
    Untimed,
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKey::Time(t) => write!(f, "{t}"),
            SlotKey::Window { start, end } => write!(f, "window:{start}-{end}"),
            SlotKey::Untimed => f.write_str("anytime"),
        }
    }
}

/// `(action id, date, effective slot)`: unique across a canonical collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OccurrenceKey {
    pub action_id: String,
    pub date: NaiveDate,
    pub slot: SlotKey,
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Occurrence {
    pub id: String,
    pub action_id: String,
    pub date: NaiveDate,
    /// Start time; `None` means no specific time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<ClockTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<ClockTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    pub status: OccurrenceStatus,
    /// Producing recurrence rule, for rule-sourced rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_type: Option<TimeType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_start: Option<ClockTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_end: Option<ClockTime>,
    /// Computed placement for window items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_start: Option<ClockTime>,
    /// Slot originally asked for when placement moved the start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_start: Option<ClockTime>,
    /// Placement could not satisfy the active policy.
    #[serde(default, skip_serializing_if = "is_false")]
    pub conflict: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<i64>,
}

impl Occurrence {
    /// A planned, untimed occurrence.
    pub fn planned(id: impl Into<String>, action_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            id: id.into(),
            action_id: action_id.into(),
            date,
            start: None,
            end: None,
            duration_minutes: None,
            status: OccurrenceStatus::Planned,
            rule_id: None,
            time_type: None,
            window_start: None,
            window_end: None,
            resolved_start: None,
            requested_start: None,
            conflict: false,
            points: None,
        }
    }

    /// Fixed start with a duration; `end` is derived when it fits the day.
    pub fn at(mut self, start: ClockTime, minutes: u32) -> Self {
        self.start = Some(start);
        self.end = start.checked_add_minutes(minutes as i64);
        self.duration_minutes = Some(minutes);
        self.time_type = Some(TimeType::Fixed);
        self
    }

    /// Window item `[start, end)` needing `minutes`.
    pub fn in_window(mut self, start: ClockTime, end: ClockTime, minutes: u32) -> Self {
        self.start = None;
        self.window_start = Some(start);
        self.window_end = Some(end);
        self.duration_minutes = Some(minutes);
        self.time_type = Some(TimeType::Window);
        self
    }

    pub fn with_status(mut self, status: OccurrenceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_rule(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }

    pub fn with_resolved_start(mut self, resolved: ClockTime) -> Self {
        self.resolved_start = Some(resolved);
        self
    }

    pub fn with_points(mut self, points: i64) -> Self {
        self.points = Some(points);
        self
    }

    /// Start if set, else the resolved start of a placed window item.
    pub fn effective_start(&self) -> Option<ClockTime> {
        self.start.or(self.resolved_start)
    }

    /// Duration from the explicit field, else `end - start`.
    pub fn duration(&self) -> Option<u32> {
        self.duration_minutes.or_else(|| {
            let minutes = self.start?.minutes_until(self.end?);
            (minutes > 0).then_some(minutes as u32)
        })
    }

    pub fn is_window_item(&self) -> bool {
        self.time_type == Some(TimeType::Window)
            || (self.start.is_none() && self.window_start.is_some() && self.window_end.is_some())
    }

    /// No explicit time and no window bounds, whatever the time-type tag.
    pub fn is_anytime(&self) -> bool {
        self.start.is_none()
            && self.resolved_start.is_none()
            && self.window_start.is_none()
            && self.window_end.is_none()
    }

    pub fn slot_key(&self) -> SlotKey {
        if let Some(t) = self.effective_start() {
            return SlotKey::Time(t);
        }
        match (self.window_start, self.window_end) {
            (Some(start), Some(end)) => SlotKey::Window { start, end },
            _ => SlotKey::Untimed,
        }
    }

    /// Composite uniqueness key; `None` for rows without an action id.
    pub fn key(&self) -> Option<OccurrenceKey> {
        if self.action_id.trim().is_empty() {
            return None;
        }
        Some(OccurrenceKey {
            action_id: self.action_id.clone(),
            date: self.date,
            slot: self.slot_key(),
        })
    }

    /// Occupied span, using `default_minutes` when no duration is known.
    pub fn interval(&self, default_minutes: u32) -> Option<Interval> {
        let start = self.effective_start()?;
        let minutes = self.duration().unwrap_or(default_minutes);
        Some(Interval::new(start, minutes as i64))
    }

    /// Instant the occurrence ends, when its placement is known.
    pub fn end_instant(&self, default_minutes: u32) -> Option<NaiveDateTime> {
        let interval = self.interval(default_minutes)?;
        Some(interval.start.on(self.date) + Duration::minutes(interval.minutes))
    }
}

/// Deterministic id for a materialized occurrence.
pub fn occurrence_id(action_id: &str, date: NaiveDate, slot: &SlotKey, rule_id: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(action_id.as_bytes());
    hasher.update(b"|");
    hasher.update(date.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(slot.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(rule_id.unwrap_or_default().as_bytes());
    format!("occ_{}", &hex::encode(hasher.finalize())[..16])
}
