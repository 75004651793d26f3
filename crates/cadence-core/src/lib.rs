//! # Cadence Core Library
//!
//! Scheduling engine that turns recurring and one-off actions into dated
//! occurrences, keeps same-day occurrences from colliding, and picks the
//! occurrence that is due now.
//!
//! Every entry point is a pure function of an explicit snapshot, an explicit
//! "now" and an [`EngineConfig`]. Results are `Cow`s that stay borrowed when
//! nothing changed.
//!
//! ## Architecture
//!
//! - **Time primitives**: clock values, weekday sets, half-open intervals
//! - **Recurrence**: one descriptor for inline schedules and first-class rules
//! - **Conflict resolver**: Exact, Nearest and window gap-fill placement
//! - **Deduplicator**: one row per `(action, date, slot)`
//! - **Materializer**: expands recurrences over a rolling horizon
//! - **Execution resolver**: "do this now" and "what's next"
//! - **Metrics**: per-day, per-action and per-category statistics
//!
//! ## Key Components
//!
//! - [`materialize_snapshot`]: bring a whole snapshot up to date
//! - [`resolve_execution`]: choose the occurrence to act on
//! - [`aggregate`]: fold status history into a [`MetricsReport`]
//! - [`migrate_snapshot`]: seed rules from inline schedules

pub mod config;
pub mod conflict;
pub mod dedupe;
pub mod diagnostics;
pub mod error;
pub mod execution;
pub mod materialize;
pub mod metrics;
pub mod migration;
pub mod model;
pub mod recurrence;
pub mod status;
pub mod time;

pub use config::{EngineConfig, PlacementConfig};
pub use conflict::{fill_window_gap, place_exact, place_nearest, resolve_window_items, Placement, WindowPlacement, WindowRequest};
pub use dedupe::{dedupe_occurrences, duplicate_keys};
pub use diagnostics::{audit, Finding, FindingKind, Severity};
pub use error::{ConfigError, CoreError, ValidationError};
pub use execution::{classify, next_up, resolve_execution, ExecutionClass, ExecutionOutcome, ExecutionResult, NextReason, NextUp};
pub use materialize::{
    mark_missed, materialize_action, materialize_rule, materialize_snapshot, regenerate_action, regenerate_rules,
    MaterializeOutcome, MaterializeStats, SnapshotOutcome,
};
pub use metrics::{aggregate, MetricsBucket, MetricsQuery, MetricsReport};
pub use migration::{derive_rules, migrate_snapshot, upsert_rules, MigrationReport, RuleUpsertStats};
pub use model::{
    Action, Occurrence, OccurrenceKey, OccurrenceStatus, PriorityTier, RecurrenceKind, RecurrenceRule, RuleKind, RuleTime,
    SlotKey, SlotSpec, Snapshot, TimePolicy, TimeType,
};
pub use recurrence::{Cadence, PlacementPolicy, Recurrence, Timing};
pub use status::{set_status_by_id, set_status_for_action_date, upsert_by_slot, SlotUpsert};
pub use time::{ClockTime, Interval, WeekdaySet};
