//! Metrics aggregation over occurrence status history.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::{Action, Occurrence, OccurrenceStatus};

/// Category assigned to rows whose action is unknown.
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// Filter for [`aggregate`]. Date bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
}

impl MetricsQuery {
    pub fn between(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            ..Self::default()
        }
    }

    pub fn for_action(mut self, action_id: impl Into<String>) -> Self {
        self.action_id = Some(action_id.into());
        self
    }

    pub fn for_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    fn admits(&self, occ: &Occurrence, category: &str) -> bool {
        self.from.map_or(true, |from| occ.date >= from)
            && self.to.map_or(true, |to| occ.date <= to)
            && self.action_id.as_deref().map_or(true, |id| occ.action_id == id)
            && self.category_id.as_deref().map_or(true, |id| category == id)
    }
}

/// Counts for one bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsBucket {
    pub expected: u32,
    pub done: u32,
    pub missed: u32,
    /// Canceled and skipped rows.
    pub canceled: u32,
    pub planned: u32,
    /// Rows neither done nor canceled.
    pub remaining: u32,
    /// Sum of points over done rows.
    pub score: i64,
    /// `done / expected`, 0 when nothing is expected.
    pub completion_rate: f64,
}

impl MetricsBucket {
    fn record(&mut self, status: OccurrenceStatus, points: i64) {
        self.expected += 1;
        match status {
            OccurrenceStatus::Done => {
                self.done += 1;
                self.score += points;
            }
            OccurrenceStatus::Missed => self.missed += 1,
            OccurrenceStatus::Canceled | OccurrenceStatus::Skipped => self.canceled += 1,
            OccurrenceStatus::Planned => self.planned += 1,
            OccurrenceStatus::Rescheduled => {}
        }
        if !matches!(
            status,
            OccurrenceStatus::Done | OccurrenceStatus::Canceled | OccurrenceStatus::Skipped
        ) {
            self.remaining += 1;
        }
        self.completion_rate = if self.expected == 0 {
            0.0
        } else {
            self.done as f64 / self.expected as f64
        };
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub total: MetricsBucket,
    pub by_day: BTreeMap<NaiveDate, MetricsBucket>,
    pub by_action: BTreeMap<String, MetricsBucket>,
    pub by_category: BTreeMap<String, MetricsBucket>,
}

/// Whether a row takes part in metrics at all.
///
/// Rows with no explicit time and no window bounds, and rescheduled rows
/// (superseded by their replacement), are left out of every bucket.
pub fn is_counted(occ: &Occurrence) -> bool {
    !occ.is_anytime() && occ.status != OccurrenceStatus::Rescheduled
}

/// Fold `occurrences` into per-day, per-action and per-category buckets.
///
/// Points come from the row, else from its action. Rows referencing an
/// unknown action land in the [`UNKNOWN_CATEGORY`] category.
pub fn aggregate(occurrences: &[Occurrence], actions: &[Action], query: &MetricsQuery) -> MetricsReport {
    let by_id: HashMap<&str, &Action> = actions.iter().map(|a| (a.id.as_str(), a)).collect();
    let mut report = MetricsReport::default();

    for occ in occurrences.iter().filter(|o| is_counted(o)) {
        let action = by_id.get(occ.action_id.as_str()).copied();
        let category = action.map_or(UNKNOWN_CATEGORY, |a| a.category_id.as_str());
        if !query.admits(occ, category) {
            continue;
        }
        let points = occ.points.or_else(|| action.and_then(|a| a.points)).unwrap_or(0);

        report.total.record(occ.status, points);
        report.by_day.entry(occ.date).or_default().record(occ.status, points);
        report
            .by_action
            .entry(occ.action_id.clone())
            .or_default()
            .record(occ.status, points);
        report
            .by_category
            .entry(category.to_string())
            .or_default()
            .record(occ.status, points);
    }

    tracing::debug!(
        expected = report.total.expected,
        done = report.total.done,
        days = report.by_day.len(),
        "aggregated metrics"
    );
    report
}
