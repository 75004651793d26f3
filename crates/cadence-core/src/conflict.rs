//! Same-day placement policies.
//!
//! Three policies operate over the intervals already placed on one day:
//! - [`place_exact`]: keep the chosen time, only flag conflicts
//! - [`place_nearest`]: move to the closest free start
//! - [`fill_window_gap`]: find the first gap inside a flexible window
//!
//! All of them are pure functions of their inputs.

use std::borrow::Cow;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::PlacementConfig;
use crate::model::Occurrence;
use crate::time::{ClockTime, Interval};

/// Outcome of placing a timed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub start: ClockTime,
    pub conflict: bool,
}

/// Outcome of placing a window item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowPlacement {
    /// `None` when no gap fits.
    pub resolved_start: Option<ClockTime>,
    pub conflict: bool,
}

/// A flexible item that must fit `minutes` inside `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRequest {
    pub start: ClockTime,
    pub end: ClockTime,
    pub minutes: i64,
}

/// True if `candidate` overlaps none of `busy`.
pub fn is_free(busy: &[Interval], candidate: &Interval) -> bool {
    busy.iter().all(|b| !b.overlaps(candidate))
}

/// Exact policy: the start never moves; occupancy only sets the flag.
pub fn place_exact(busy: &[Interval], preferred: ClockTime, minutes: i64) -> Placement {
    Placement {
        start: preferred,
        conflict: !is_free(busy, &Interval::new(preferred, minutes)),
    }
}

/// Nearest policy.
///
/// A free preferred start is kept. Otherwise, with `candidates`, the free
/// candidate closest to `preferred` wins (ties go to the later time).
/// Without candidates the scan steps outward by `config.step_minutes`,
/// trying later before earlier at each distance, within
/// `[day_start, day_end)`. Exhaustion returns `preferred` flagged.
pub fn place_nearest(
    busy: &[Interval],
    preferred: ClockTime,
    minutes: i64,
    candidates: Option<&[ClockTime]>,
    config: &PlacementConfig,
) -> Placement {
    let fits = |start: ClockTime| is_free(busy, &Interval::new(start, minutes));
    let in_bounds = |start: ClockTime| start >= config.day_start && start < config.day_end;

    if fits(preferred) {
        return Placement {
            start: preferred,
            conflict: false,
        };
    }

    let found = match candidates {
        Some(list) if !list.is_empty() => list
            .iter()
            .copied()
            .filter(|c| in_bounds(*c) && fits(*c))
            .min_by_key(|c| {
                let distance = preferred.minutes_until(*c).abs();
                // later wins ties: negate so larger minutes sort first
                (distance, -c.minutes())
            }),
        _ => scan_outward(preferred, config, |start| in_bounds(start) && fits(start)),
    };

    match found {
        Some(start) => Placement {
            start,
            conflict: false,
        },
        None => Placement {
            start: preferred,
            conflict: true,
        },
    }
}

fn scan_outward(
    preferred: ClockTime,
    config: &PlacementConfig,
    accept: impl Fn(ClockTime) -> bool,
) -> Option<ClockTime> {
    let step = config.step_minutes.max(1) as i64;
    let lower = config.day_start.minutes();
    let upper = config.day_end.minutes();

    let mut k = 1;
    loop {
        let later = preferred.minutes() + k * step;
        let earlier = preferred.minutes() - k * step;
        if later >= upper && earlier < lower {
            return None;
        }
        for offset in [later, earlier] {
            if let Some(start) = ClockTime::from_minutes(offset) {
                if accept(start) {
                    return Some(start);
                }
            }
        }
        k += 1;
    }
}

/// Window gap-fill: first gap in `[request.start, request.end)` that holds
/// `request.minutes` between the sorted `fixed` items.
///
/// Success sets `resolved_start`; failure leaves it `None` and flags a
/// conflict. The nominal start of the window item is never touched.
pub fn fill_window_gap(fixed: &[Interval], request: &WindowRequest) -> WindowPlacement {
    let mut sorted: Vec<Interval> = fixed.to_vec();
    sorted.sort_by_key(|i| (i.start, i.minutes));

    let window_end = request.end.minutes();
    let mut cursor = request.start.minutes();

    for item in &sorted {
        // Skip items that end before our current position
        if item.end_minutes() <= cursor {
            continue;
        }
        if item.start.minutes() >= window_end {
            break;
        }
        if item.start.minutes() - cursor >= request.minutes {
            break;
        }
        cursor = cursor.max(item.end_minutes());
    }

    let resolved = (window_end - cursor >= request.minutes)
        .then(|| ClockTime::from_minutes(cursor))
        .flatten();

    WindowPlacement {
        resolved_start: resolved,
        conflict: resolved.is_none(),
    }
}

/// Intervals blocked on `date`, skipping `exclude_id` and window items.
///
/// Window items are left out because their placement is derived from the
/// fixed layout, not the other way round.
pub fn fixed_intervals(
    occurrences: &[Occurrence],
    date: NaiveDate,
    default_minutes: u32,
    exclude_id: Option<&str>,
) -> Vec<Interval> {
    occurrences
        .iter()
        .filter(|o| o.date == date && o.status.occupies_time())
        .filter(|o| Some(o.id.as_str()) != exclude_id)
        .filter(|o| !o.is_window_item())
        .filter_map(|o| o.interval(default_minutes))
        .collect()
}

/// Re-run gap-fill for every planned window item on `date`.
///
/// Items are placed in id order; each sees the fixed layout plus the window
/// items placed before it. Existing `resolved_start` values are ignored
/// while computing, so applying this to its own output changes nothing.
pub fn resolve_window_items<'a>(
    occurrences: &'a [Occurrence],
    date: NaiveDate,
    default_minutes: u32,
) -> Cow<'a, [Occurrence]> {
    let mut window_idx: Vec<usize> = occurrences
        .iter()
        .enumerate()
        .filter(|(_, o)| {
            o.date == date
                && o.status == crate::model::OccurrenceStatus::Planned
                && o.is_window_item()
                && o.window_start.is_some()
                && o.window_end.is_some()
        })
        .map(|(i, _)| i)
        .collect();

    if window_idx.is_empty() {
        return Cow::Borrowed(occurrences);
    }
    window_idx.sort_by(|a, b| occurrences[*a].id.cmp(&occurrences[*b].id));

    let mut blocked = fixed_intervals(occurrences, date, default_minutes, None);
    // Terminal window items keep whatever placement they had.
    blocked.extend(
        occurrences
            .iter()
            .filter(|o| o.date == date && o.is_window_item() && o.status.is_terminal() && o.status.occupies_time())
            .filter_map(|o| o.interval(default_minutes)),
    );

    let mut result: Cow<'a, [Occurrence]> = Cow::Borrowed(occurrences);
    for idx in window_idx {
        let item = &occurrences[idx];
        let (Some(start), Some(end)) = (item.window_start, item.window_end) else {
            continue;
        };
        let minutes = item.duration().unwrap_or(default_minutes) as i64;
        let placement = fill_window_gap(&blocked, &WindowRequest { start, end, minutes });

        if let Some(resolved) = placement.resolved_start {
            blocked.push(Interval::new(resolved, minutes));
        }

        if item.resolved_start != placement.resolved_start || item.conflict != placement.conflict {
            tracing::trace!(
                occurrence = %item.id,
                resolved = ?placement.resolved_start,
                conflict = placement.conflict,
                "window item re-placed"
            );
            let row = &mut result.to_mut()[idx];
            row.resolved_start = placement.resolved_start;
            row.conflict = placement.conflict;
        }
    }

    result
}
