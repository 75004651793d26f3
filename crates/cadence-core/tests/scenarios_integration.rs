//! End-to-end scheduling scenarios across materialization, placement,
//! status updates and execution resolution.

use std::borrow::Cow;

use cadence_core::{
    aggregate, fill_window_gap, materialize_action, materialize_snapshot, migrate_snapshot, resolve_execution,
    set_status_by_id, upsert_by_slot, Action, ClockTime, EngineConfig, ExecutionOutcome, Interval, MetricsQuery,
    Occurrence, OccurrenceStatus, SlotUpsert, Snapshot, WeekdaySet, WindowRequest,
};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};

fn t(s: &str) -> ClockTime {
    s.parse().unwrap()
}

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
}

fn at(date: NaiveDate, hh: u32, mm: u32) -> NaiveDateTime {
    date.and_hms_opt(hh, mm, 0).unwrap()
}

fn week_config() -> EngineConfig {
    EngineConfig {
        window_days: 7,
        ..EngineConfig::default()
    }
}

#[test]
fn test_mon_wed_fri_fixed_action_over_one_week() {
    let weekdays = WeekdaySet::from_weekdays(&[Weekday::Mon, Weekday::Wed, Weekday::Fri]);
    let action = Action::recurring("run", "health", weekdays).fixed_at(t("09:00"), 30);

    let out = materialize_action(&action, &[], monday(), &week_config());
    assert_eq!(out.occurrences.len(), 3);
    for occ in out.occurrences.iter() {
        assert_eq!(occ.status, OccurrenceStatus::Planned);
        assert_eq!(occ.start, Some(t("09:00")));
        assert!(matches!(occ.date.weekday(), Weekday::Mon | Weekday::Wed | Weekday::Fri));
    }
}

#[test]
fn test_window_fits_between_fixed_items() {
    let fixed = [Interval::new(t("09:00"), 60), Interval::new(t("11:00"), 60)];
    let placement = fill_window_gap(
        &fixed,
        &WindowRequest {
            start: t("10:00"),
            end: t("12:00"),
            minutes: 30,
        },
    );
    assert_eq!(placement.resolved_start, Some(t("10:00")));
    assert!(!placement.conflict);
}

#[test]
fn test_window_covered_by_fixed_item_is_conflict() {
    let fixed = [Interval::new(t("09:00"), 180)];
    let placement = fill_window_gap(
        &fixed,
        &WindowRequest {
            start: t("10:00"),
            end: t("11:00"),
            minutes: 60,
        },
    );
    assert_eq!(placement.resolved_start, None);
    assert!(placement.conflict);
}

#[test]
fn test_repeated_skip_upsert_yields_one_row() {
    let draft = SlotUpsert::new("read", monday(), OccurrenceStatus::Skipped).at(t("21:00"));
    let first = upsert_by_slot(&[], &draft).into_owned();
    let second = upsert_by_slot(&first, &draft).into_owned();

    assert_eq!(second.len(), 1);
    assert_eq!(second[0].status, OccurrenceStatus::Skipped);
    assert_eq!(first, second);
}

#[test]
fn test_fixed_outranks_earlier_window_for_execution() {
    let rows = vec![
        Occurrence::planned("win", "stretch", monday())
            .in_window(t("08:00"), t("10:00"), 20)
            .with_resolved_start(t("08:30")),
        Occurrence::planned("fix", "standup", monday()).at(t("09:00"), 15),
    ];
    let result = resolve_execution(&rows, at(monday(), 8, 0), monday(), &["stretch", "standup"]);
    assert_eq!(result.outcome, ExecutionOutcome::Ok);
    assert_eq!(result.occurrence.map(|o| o.id.as_str()), Some("fix"));
}

#[test]
fn test_full_day_lifecycle() {
    let snapshot = Snapshot {
        actions: vec![
            Action::recurring("run", "health", WeekdaySet::ALL)
                .fixed_at(t("07:00"), 45)
                .with_points(10),
            Action::recurring("review", "work", WeekdaySet::ALL).within_window(t("07:00"), t("09:00"), 30),
            Action::recurring("journal", "self", WeekdaySet::ALL),
        ],
        rules: Vec::new(),
        occurrences: Vec::new(),
    };
    let config = EngineConfig {
        window_days: 1,
        ..EngineConfig::default()
    };

    let migrated = migrate_snapshot(&snapshot, monday(), at(monday(), 5, 0), &config);
    assert_eq!(migrated.rules.inserted, 2);
    let migrated = migrated.snapshot.into_owned();

    let materialized = materialize_snapshot(&migrated, monday(), at(monday(), 5, 0), &config);
    let state = materialized.snapshot.into_owned();
    assert_eq!(state.occurrences.len(), 3);

    let review = state.occurrences.iter().find(|o| o.action_id == "review").unwrap();
    assert_eq!(review.resolved_start, Some(t("07:45")));

    let run = state.occurrences.iter().find(|o| o.action_id == "run").unwrap();
    let done = set_status_by_id(&state.occurrences, &run.id, OccurrenceStatus::Done).into_owned();

    // Past the review window end, the rule path marks it missed.
    let state = Snapshot {
        occurrences: done,
        ..state.clone()
    };
    let evening = materialize_snapshot(&state, monday(), at(monday(), 20, 0), &config);
    assert!(evening.changed());
    assert_eq!(evening.stats.missed, 1);

    let report = aggregate(&evening.snapshot.occurrences, &evening.snapshot.actions, &MetricsQuery::default());
    // The untimed journal row is left out of metrics.
    assert_eq!(report.total.expected, 2);
    assert!(!report.by_action.contains_key("journal"));
    assert_eq!(report.total.done, 1);
    assert_eq!(report.total.missed, 1);
    assert_eq!(report.total.score, 10);
    assert_eq!(report.by_category["health"].done, 1);

    let again = materialize_snapshot(&evening.snapshot, monday(), at(monday(), 20, 0), &config);
    assert!(matches!(again.snapshot, Cow::Borrowed(_)));
}
