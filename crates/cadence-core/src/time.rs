//! Clock values, minute arithmetic, weekday sets and interval overlap.
//!
//! Occurrences live on a calendar date with an optional time of day. The
//! time of day is a [`ClockTime`] (minutes since midnight); "no specific
//! time" is always `Option::None`, never a reserved clock value.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValidationError;

/// A time of day with minute resolution, `00:00` through `23:59`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime(u16);

pub const MINUTES_PER_DAY: u16 = 24 * 60;

impl ClockTime {
    pub const MIDNIGHT: ClockTime = ClockTime(0);

    /// Compile-time constructor for known-good constants.
    pub(crate) const fn hm(hour: u16, minute: u16) -> Self {
        ClockTime(hour * 60 + minute)
    }

    /// Build from hour and minute, `None` when out of range.
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(ClockTime((hour * 60 + minute) as u16))
        } else {
            None
        }
    }

    /// Build from minutes since midnight, `None` past 23:59.
    pub fn from_minutes(minutes: i64) -> Option<Self> {
        if (0..MINUTES_PER_DAY as i64).contains(&minutes) {
            Some(ClockTime(minutes as u16))
        } else {
            None
        }
    }

    pub fn from_naive_time(time: NaiveTime) -> Self {
        ClockTime((time.hour() * 60 + time.minute()) as u16)
    }

    /// Minutes since midnight.
    pub fn minutes(self) -> i64 {
        self.0 as i64
    }

    pub fn hour(self) -> u32 {
        (self.0 / 60) as u32
    }

    pub fn minute(self) -> u32 {
        (self.0 % 60) as u32
    }

    /// Shift by a signed number of minutes; `None` if the result leaves the day.
    pub fn checked_add_minutes(self, minutes: i64) -> Option<Self> {
        Self::from_minutes(self.minutes() + minutes)
    }

    /// Signed distance in minutes from `self` to `other`.
    pub fn minutes_until(self, other: ClockTime) -> i64 {
        other.minutes() - self.minutes()
    }

    pub fn to_naive_time(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour(), self.minute(), 0).unwrap_or(NaiveTime::MIN)
    }

    /// The instant this clock value denotes on `date`.
    pub fn on(self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.to_naive_time())
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for ClockTime {
    type Err = ValidationError;

    /// Accepts `H:MM`, `HH:MM` and `HH:MM:SS` (seconds are dropped).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidTime(s.to_string());
        let trimmed = s.trim();
        let mut parts = trimmed.split(':');

        let hour = parts.next().ok_or_else(invalid)?;
        let minute = parts.next().ok_or_else(invalid)?;
        if let Some(seconds) = parts.next() {
            let secs: u32 = seconds.parse().map_err(|_| invalid())?;
            if secs >= 60 || parts.next().is_some() {
                return Err(invalid());
            }
        }
        if hour.is_empty() || hour.len() > 2 || minute.len() != 2 {
            return Err(invalid());
        }

        let hour: u32 = hour.parse().map_err(|_| invalid())?;
        let minute: u32 = minute.parse().map_err(|_| invalid())?;
        ClockTime::from_hm(hour, minute).ok_or_else(invalid)
    }
}

impl Serialize for ClockTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Half-open overlap test for `[s1, s1+d1)` and `[s2, s2+d2)` in minutes.
///
/// Touching endpoints do not overlap.
pub fn overlaps(s1: i64, d1: i64, s2: i64, d2: i64) -> bool {
    s1 < s2 + d2 && s2 < s1 + d1
}

/// A same-day span `[start, start + minutes)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: ClockTime,
    pub minutes: i64,
}

impl Interval {
    pub fn new(start: ClockTime, minutes: i64) -> Self {
        Self { start, minutes }
    }

    /// End in minutes since midnight. May exceed one day for late long items.
    pub fn end_minutes(&self) -> i64 {
        self.start.minutes() + self.minutes
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        overlaps(
            self.start.minutes(),
            self.minutes,
            other.start.minutes(),
            other.minutes,
        )
    }
}

/// Set of ISO weekdays (1 = Monday ... 7 = Sunday).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const EMPTY: WeekdaySet = WeekdaySet(0);
    pub const ALL: WeekdaySet = WeekdaySet(0b111_1111);

    pub fn from_weekdays(days: &[Weekday]) -> Self {
        days.iter().fold(Self::EMPTY, |set, d| set.with(*d))
    }

    /// Build from ISO numbers, rejecting anything outside 1..=7.
    pub fn from_iso(days: &[u8]) -> Result<Self, ValidationError> {
        let mut bits = 0u8;
        for &day in days {
            if !(1..=7).contains(&day) {
                return Err(ValidationError::InvalidWeekday(day));
            }
            bits |= 1 << (day - 1);
        }
        Ok(WeekdaySet(bits))
    }

    pub fn with(self, day: Weekday) -> Self {
        WeekdaySet(self.0 | 1 << day.num_days_from_monday())
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// ISO numbers in ascending order.
    pub fn iso_days(&self) -> Vec<u8> {
        (1..=7u8).filter(|d| self.0 & (1 << (d - 1)) != 0).collect()
    }
}

impl TryFrom<Vec<u8>> for WeekdaySet {
    type Error = ValidationError;

    fn try_from(days: Vec<u8>) -> Result<Self, Self::Error> {
        WeekdaySet::from_iso(&days)
    }
}

impl From<WeekdaySet> for Vec<u8> {
    fn from(set: WeekdaySet) -> Self {
        set.iso_days()
    }
}

/// ISO weekday number (1 = Monday) of a date.
pub fn iso_weekday(date: NaiveDate) -> u8 {
    use chrono::Datelike;
    date.weekday().number_from_monday() as u8
}

pub fn parse_date(s: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDate(s.to_string()))
}

/// Extract the time of day from a legacy start timestamp.
///
/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM[:SS]`, `YYYY-MM-DD HH:MM` and a bare
/// clock value. Midnight keeps its legacy "no time" meaning.
pub fn parse_legacy_timestamp(s: &str) -> Option<ClockTime> {
    let s = s.trim();
    let time = if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        Some(ClockTime::from_naive_time(dt.time()))
    } else {
        ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
            .map(|dt| ClockTime::from_naive_time(dt.time()))
            .or_else(|| s.parse().ok())
    };
    time.filter(|t| *t != ClockTime::MIDNIGHT)
}
