//! Recurrence rules: first-class repeat patterns decoupled from actions.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::time::{ClockTime, WeekdaySet};

/// When the rule fires.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleKind {
    Recurring { weekdays: WeekdaySet },
    OneTime { date: NaiveDate },
}

/// Time of day the rule places its occurrences at.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleTime {
    Fixed { start: ClockTime },
    Window { start: ClockTime, end: ClockTime },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecurrenceRule {
    pub id: String,
    pub action_id: String,
    /// Stable content key for idempotent upsert.
    pub source_key: String,
    pub kind: RuleKind,
    pub time: RuleTime,
    pub duration_minutes: u32,
    #[serde(default = "default_active")]
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl RecurrenceRule {
    /// Create a rule whose id and source key derive from
    /// `(action_id, kind, ordinal)`.
    ///
    /// `ordinal` separates several rules sharing one kind (e.g. a morning
    /// and an evening slot on the same weekdays). Time and duration are not
    /// part of the key, so an edited time upserts onto the same rule.
    pub fn new(
        action_id: impl Into<String>,
        kind: RuleKind,
        ordinal: usize,
        time: RuleTime,
        duration_minutes: u32,
        now: DateTime<Utc>,
    ) -> Self {
        let action_id = action_id.into();
        let source_key = source_key(&action_id, &kind, ordinal);
        Self {
            id: format!("rule_{}", &source_key[3..]),
            action_id,
            source_key,
            kind,
            time,
            duration_minutes,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when the schedule-relevant content equals `other`'s.
    pub fn same_content(&self, other: &RecurrenceRule) -> bool {
        self.kind == other.kind
            && self.time == other.time
            && self.duration_minutes == other.duration_minutes
            && self.active == other.active
    }
}

/// `rk_` + first 16 hex chars of SHA-256 over the canonical rule identity.
pub fn source_key(action_id: &str, kind: &RuleKind, ordinal: usize) -> String {
    let canonical = match kind {
        RuleKind::Recurring { weekdays } => format!(
            "recurring:{}",
            weekdays
                .iso_days()
                .iter()
                .map(u8::to_string)
                .collect::<Vec<_>>()
                .join(",")
        ),
        RuleKind::OneTime { date } => format!("one_time:{date}"),
    };

    let mut hasher = Sha256::new();
    hasher.update(action_id.as_bytes());
    hasher.update(b"|");
    hasher.update(canonical.as_bytes());
    hasher.update(b"|");
    hasher.update(ordinal.to_string().as_bytes());
    format!("rk_{}", &hex::encode(hasher.finalize())[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn source_key_ignores_time_and_duration() {
        let kind = RuleKind::Recurring {
            weekdays: WeekdaySet::from_iso(&[1, 3]).unwrap(),
        };
        let a = RecurrenceRule::new("a1", kind, 0, RuleTime::Fixed { start: "09:00".parse().unwrap() }, 30, now());
        let b = RecurrenceRule::new("a1", kind, 0, RuleTime::Fixed { start: "18:00".parse().unwrap() }, 45, now());
        assert_eq!(a.source_key, b.source_key);
        assert_eq!(a.id, b.id);
        assert!(a.source_key.starts_with("rk_"));
        assert_eq!(a.source_key.len(), 19);
    }

    #[test]
    fn source_key_separates_actions_kinds_and_ordinals() {
        let weekly = RuleKind::Recurring {
            weekdays: WeekdaySet::from_iso(&[1]).unwrap(),
        };
        let once = RuleKind::OneTime {
            date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
        };
        assert_ne!(source_key("a1", &weekly, 0), source_key("a2", &weekly, 0));
        assert_ne!(source_key("a1", &weekly, 0), source_key("a1", &once, 0));
        assert_ne!(source_key("a1", &weekly, 0), source_key("a1", &weekly, 1));
    }

    #[test]
    fn rule_serializes_tagged_kinds() {
        let rule = RecurrenceRule::new(
            "a1",
            RuleKind::OneTime {
                date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            },
            0,
            RuleTime::Window {
                start: "10:00".parse().unwrap(),
                end: "12:00".parse().unwrap(),
            },
            30,
            now(),
        );
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["kind"]["type"], "one_time");
        assert_eq!(json["time"]["type"], "window");
        assert_eq!(json["time"]["end"], "12:00");
    }
}
