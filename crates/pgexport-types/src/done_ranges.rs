use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::window::Window;

/// A closed interval `[a, b]` of the export window that has been durably
/// COPY'd (and, for mergeable models, merged).
pub type DateRange = (DateTime<Utc>, DateTime<Utc>);

/// A monotone-growing (within one attempt), coalesced set of done ranges.
/// Kept sorted by start and with no two entries overlapping or touching, so
/// `track_done_range` can always merge in O(n).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoneRanges(Vec<DateRange>);

impl DoneRanges {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_ranges(mut ranges: Vec<DateRange>) -> Self {
        ranges.sort_by_key(|r| r.0);
        let mut out = Self(Vec::new());
        for r in ranges {
            out.insert_coalescing(r);
        }
        out
    }

    pub fn ranges(&self) -> &[DateRange] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merges `(start, end)` into the set, coalescing with any range it
    /// overlaps or touches. `start` of `None` means an open left edge (the
    /// producer hasn't established a lower bound yet, i.e. earliest-backfill
    /// mode); in that case `fallback_start` - the export window's
    /// `data_interval_start` if present, else the earliest batch watermark
    /// observed so far - is used as the clamp (spec §9 open question).
    pub fn track_done_range(&mut self, start: Option<DateTime<Utc>>, end: DateTime<Utc>, fallback_start: DateTime<Utc>) {
        let start = start.unwrap_or(fallback_start);
        self.insert_coalescing((start, end));
    }

    fn insert_coalescing(&mut self, mut range: DateRange) {
        let mut merged = Vec::with_capacity(self.0.len() + 1);
        let mut inserted = false;
        for existing in self.0.drain(..) {
            if existing.1 < range.0 {
                merged.push(existing);
            } else if range.1 < existing.0 {
                if !inserted {
                    merged.push(range);
                    inserted = true;
                }
                merged.push(existing);
            } else {
                // Overlaps or touches: coalesce.
                range.0 = range.0.min(existing.0);
                range.1 = range.1.max(existing.1);
            }
        }
        if !inserted {
            merged.push(range);
        }
        self.0 = merged;
    }

    /// Total covered duration across all ranges.
    pub fn covered_duration(&self) -> chrono::Duration {
        self.0
            .iter()
            .fold(chrono::Duration::zero(), |acc, (a, b)| acc + (*b - *a))
    }

    pub fn is_subset_of(&self, window: &Window) -> bool {
        self.0.iter().all(|(start, end)| {
            *end <= window.end && window.start.map_or(true, |ws| *start >= ws)
        })
    }

    /// The sub-ranges of `window` not yet covered, in ascending order, for
    /// the producer to resume from (§4.6).
    pub fn remaining(&self, window: &Window) -> Vec<DateRange> {
        let Some(window_start) = window.start else {
            // Earliest-backfill: everything before the first done range
            // (if any) is still open-ended and must be resumed from
            // scratch by the producer's own discovery logic. Only the gap
            // after the first done range (if it doesn't yet reach the end)
            // is expressible as a concrete range here.
            return match self.0.first() {
                Some((_, first_end)) if *first_end < window.end => vec![(*first_end, window.end)],
                Some(_) => vec![],
                None => vec![],
            };
        };

        let mut remaining = Vec::new();
        let mut cursor = window_start;
        for (start, end) in &self.0 {
            if *start > cursor {
                remaining.push((cursor, *start));
            }
            if *end > cursor {
                cursor = *end;
            }
        }
        if cursor < window.end {
            remaining.push((cursor, window.end));
        }
        remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(h * 3600, 0).unwrap()
    }

    #[test]
    fn coalesces_overlapping_and_touching_ranges() {
        let mut d = DoneRanges::new();
        d.track_done_range(Some(t(0)), t(1), t(0));
        d.track_done_range(Some(t(1)), t(2), t(0));
        d.track_done_range(Some(t(3)), t(4), t(0));
        assert_eq!(d.ranges(), &[(t(0), t(2)), (t(3), t(4))]);
    }

    #[test]
    fn monotonic_growth_across_flushes() {
        let mut d = DoneRanges::new();
        let mut prev_covered = chrono::Duration::zero();
        for h in 0..5 {
            d.track_done_range(Some(t(h)), t(h + 1), t(0));
            let covered = d.covered_duration();
            assert!(covered >= prev_covered);
            prev_covered = covered;
        }
    }

    #[test]
    fn remaining_computes_gaps() {
        let mut d = DoneRanges::new();
        d.track_done_range(Some(t(0)), t(1), t(0));
        d.track_done_range(Some(t(3)), t(4), t(0));
        let window = Window::new(Some(t(0)), t(5)).unwrap();
        assert_eq!(d.remaining(&window), vec![(t(1), t(3)), (t(4), t(5))]);
    }

    #[test]
    fn backfill_open_left_edge_clamped() {
        let mut d = DoneRanges::new();
        d.track_done_range(None, t(2), t(0));
        assert_eq!(d.ranges(), &[(t(0), t(2))]);
    }
}
