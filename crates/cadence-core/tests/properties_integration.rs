//! Property tests for placement, overlap and deduplication.

use std::borrow::Cow;

use cadence_core::time::overlaps;
use cadence_core::{
    dedupe_occurrences, fill_window_gap, materialize_action, place_exact, place_nearest, resolve_window_items, Action,
    ClockTime, EngineConfig, Interval, Occurrence, OccurrenceStatus, PlacementConfig, WeekdaySet, WindowRequest,
};
use chrono::NaiveDate;
use proptest::prelude::*;

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
}

fn arb_clock() -> impl Strategy<Value = ClockTime> {
    (0i64..24 * 60).prop_map(|m| ClockTime::from_minutes(m).unwrap())
}

fn arb_interval() -> impl Strategy<Value = Interval> {
    (arb_clock(), 1i64..240).prop_map(|(start, minutes)| Interval::new(start, minutes))
}

fn arb_status() -> impl Strategy<Value = OccurrenceStatus> {
    prop_oneof![
        Just(OccurrenceStatus::Planned),
        Just(OccurrenceStatus::Done),
        Just(OccurrenceStatus::Skipped),
        Just(OccurrenceStatus::Canceled),
        Just(OccurrenceStatus::Missed),
    ]
}

/// Rows over a small key space so collisions are common.
fn arb_rows() -> impl Strategy<Value = Vec<Occurrence>> {
    prop::collection::vec((0u8..3, 0u32..4, arb_status()), 0..12).prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (action, hour, status))| {
                let start = ClockTime::from_hm(8 + hour, 0).unwrap();
                Occurrence::planned(format!("o{i}"), format!("a{action}"), day())
                    .at(start, 30)
                    .with_status(status)
            })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_overlap_is_symmetric_and_touching_is_free(
        s1 in 0i64..1440, d1 in 1i64..300, s2 in 0i64..1440, d2 in 1i64..300
    ) {
        prop_assert_eq!(overlaps(s1, d1, s2, d2), overlaps(s2, d2, s1, d1));
        prop_assert_eq!(overlaps(s1, d1, s2, d2), s1 < s2 + d2 && s2 < s1 + d1);
        prop_assert!(!overlaps(s1, d1, s1 + d1, d2));
    }

    #[test]
    fn prop_exact_never_relocates(
        busy in prop::collection::vec(arb_interval(), 0..6),
        preferred in arb_clock(),
        minutes in 1i64..180
    ) {
        let placed = place_exact(&busy, preferred, minutes);
        prop_assert_eq!(placed.start, preferred);
        let candidate = Interval::new(preferred, minutes);
        prop_assert_eq!(placed.conflict, busy.iter().any(|b| b.overlaps(&candidate)));
    }

    #[test]
    fn prop_nearest_stays_in_bounds(
        busy in prop::collection::vec(arb_interval(), 0..6),
        preferred in arb_clock(),
        minutes in 1i64..120
    ) {
        let cfg = PlacementConfig::default();
        let placed = place_nearest(&busy, preferred, minutes, None, &cfg);
        if placed.start != preferred {
            prop_assert!(placed.start >= cfg.day_start && placed.start < cfg.day_end);
            prop_assert!(!placed.conflict);
        }
    }

    #[test]
    fn prop_blocked_start_relocates_inside_day_or_flags(
        busy in prop::collection::vec(arb_interval(), 0..6),
        preferred in arb_clock(),
        minutes in 1i64..120,
        candidates in prop::option::of(prop::collection::vec(arb_clock(), 1..8))
    ) {
        let cfg = PlacementConfig::default();
        let mut busy = busy;
        busy.push(Interval::new(preferred, minutes));
        let placed = place_nearest(&busy, preferred, minutes, candidates.as_deref(), &cfg);
        if placed.conflict {
            prop_assert_eq!(placed.start, preferred);
        } else {
            prop_assert!(placed.start >= cfg.day_start && placed.start < cfg.day_end);
            let taken = Interval::new(placed.start, minutes);
            prop_assert!(busy.iter().all(|b| !b.overlaps(&taken)));
        }
    }

    #[test]
    fn prop_nearest_only_picks_candidates(
        busy in prop::collection::vec(arb_interval(), 0..6),
        preferred in arb_clock(),
        candidates in prop::collection::vec(arb_clock(), 1..6)
    ) {
        let cfg = PlacementConfig::default();
        let placed = place_nearest(&busy, preferred, 30, Some(&candidates), &cfg);
        prop_assert!(placed.start == preferred || candidates.contains(&placed.start));
    }

    #[test]
    fn prop_gap_fill_is_deterministic_and_fits(
        fixed in prop::collection::vec(arb_interval(), 0..5),
        start in 300i64..900,
        width in 30i64..300,
        minutes in 10i64..120
    ) {
        let request = WindowRequest {
            start: ClockTime::from_minutes(start).unwrap(),
            end: ClockTime::from_minutes(start + width).unwrap(),
            minutes,
        };
        let a = fill_window_gap(&fixed, &request);
        let b = fill_window_gap(&fixed, &request);
        prop_assert_eq!(a, b);
        if let Some(resolved) = a.resolved_start {
            let placed = Interval::new(resolved, minutes);
            prop_assert!(fixed.iter().all(|f| !f.overlaps(&placed)));
            prop_assert!(placed.end_minutes() <= request.end.minutes());
        }
    }

    #[test]
    fn prop_window_resolution_is_idempotent(
        fixed in prop::collection::vec(arb_interval(), 0..4),
        minutes in 10u32..90
    ) {
        let mut rows: Vec<Occurrence> = fixed
            .iter()
            .enumerate()
            .map(|(i, iv)| Occurrence::planned(format!("f{i}"), "fixed", day()).at(iv.start, iv.minutes as u32))
            .collect();
        rows.push(
            Occurrence::planned("w0", "flex", day())
                .in_window(ClockTime::from_hm(8, 0).unwrap(), ClockTime::from_hm(18, 0).unwrap(), minutes),
        );
        let once = resolve_window_items(&rows, day(), 30).into_owned();
        let twice = resolve_window_items(&once, day(), 30);
        prop_assert!(matches!(twice, Cow::Borrowed(_)));
    }

    #[test]
    fn prop_dedupe_is_idempotent_and_unique(rows in arb_rows()) {
        let once = dedupe_occurrences(&rows).into_owned();
        let twice = dedupe_occurrences(&once);
        prop_assert!(matches!(twice, Cow::Borrowed(_)));

        let mut keys: Vec<_> = once.iter().filter_map(|o| o.key()).collect();
        let total = keys.len();
        keys.sort();
        keys.dedup();
        prop_assert_eq!(keys.len(), total);
    }

    #[test]
    fn prop_dedupe_keeps_done_over_planned(done_first in any::<bool>()) {
        let nine = ClockTime::from_hm(9, 0).unwrap();
        let planned = Occurrence::planned("p", "a", day()).at(nine, 30);
        let done = Occurrence::planned("d", "a", day()).at(nine, 30).with_status(OccurrenceStatus::Done);
        let rows = if done_first { vec![done, planned] } else { vec![planned, done] };
        let out = dedupe_occurrences(&rows);
        prop_assert_eq!(out.len(), 1);
        prop_assert_eq!(out[0].status, OccurrenceStatus::Done);
    }

    #[test]
    fn prop_rematerialization_is_a_noop(
        days in prop::collection::vec(1u8..=7, 1..7),
        hour in 5u32..21,
        minutes in 5u32..90
    ) {
        let weekdays = WeekdaySet::from_iso(&days).unwrap();
        let action = Action::recurring("a1", "c1", weekdays)
            .fixed_at(ClockTime::from_hm(hour, 0).unwrap(), minutes);
        let cfg = EngineConfig::default();

        let first = materialize_action(&action, &[], day(), &cfg).occurrences.into_owned();
        let second = materialize_action(&action, &first, day(), &cfg);
        prop_assert!(!second.changed());
        prop_assert_eq!(second.occurrences.as_ref(), first.as_slice());
    }
}
