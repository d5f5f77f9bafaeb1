// ── Sliding-window time series ──
//
// Append-only storage with a live window-start index. Points that fall out
// of the window stay in the buffer until the dead prefix is large enough
// that reclaiming it costs O(1) amortized per insert.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::model::SeriesPoint;

/// Default dead-prefix length below which compaction never runs.
pub const DEFAULT_COMPACT_FLOOR: usize = 256;

/// Per-entity series bounded by a trailing time window.
///
/// Points are kept in arrival order. Timestamps are expected to be
/// non-decreasing per entity; out-of-order points are stored as they come.
#[derive(Debug, Clone)]
pub struct BoundedSeries {
    points: Vec<SeriesPoint>,
    /// Index of the first point still inside the window.
    start: usize,
    window: TimeDelta,
    compact_floor: usize,
}

impl BoundedSeries {
    pub fn new(window: Duration) -> Self {
        Self::with_compact_floor(window, DEFAULT_COMPACT_FLOOR)
    }

    pub fn with_compact_floor(window: Duration, compact_floor: usize) -> Self {
        Self {
            points: Vec::new(),
            start: 0,
            window: TimeDelta::from_std(window).unwrap_or_else(|_| TimeDelta::days(365)),
            compact_floor,
        }
    }

    /// Append a point and slide the window up to its timestamp.
    pub fn append(&mut self, point: SeriesPoint) {
        self.points.push(point);
        self.advance(point.t);
        self.compact();
    }

    /// Points inside `[now - window, now]`, in arrival order.
    ///
    /// The iterator borrows the series and can be cloned to walk the same
    /// view again.
    pub fn window(
        &self,
        now: DateTime<Utc>,
    ) -> impl Iterator<Item = &SeriesPoint> + Clone + '_ {
        let cutoff = self.cutoff(now);
        self.points[self.start..]
            .iter()
            .filter(move |p| p.t >= cutoff && p.t <= now)
    }

    /// Drop the dead prefix if it exceeds both the floor and half the
    /// buffer. Returns `true` when storage was reclaimed.
    pub fn compact(&mut self) -> bool {
        let dead = self.start;
        if dead <= self.compact_floor || dead <= self.points.len() / 2 {
            return false;
        }
        self.points.drain(..dead);
        self.start = 0;
        true
    }

    /// Most recently appended point.
    pub fn last(&self) -> Option<&SeriesPoint> {
        self.points.last()
    }

    /// Points still considered live (not yet slid out of the window).
    pub fn live_len(&self) -> usize {
        self.points.len() - self.start
    }

    /// Points physically stored, including the dead prefix.
    pub fn stored_len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live_len() == 0
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.start = 0;
    }

    fn advance(&mut self, now: DateTime<Utc>) {
        let cutoff = self.cutoff(now);
        while self.start < self.points.len() && self.points[self.start].t < cutoff {
            self.start += 1;
        }
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[allow(clippy::cast_precision_loss)]
    fn at(base: DateTime<Utc>, millis: i64) -> SeriesPoint {
        SeriesPoint {
            t: base + TimeDelta::milliseconds(millis),
            v: millis as f64,
        }
    }

    fn base() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-19T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn window_excludes_points_older_than_window() {
        let t0 = base();
        let mut series = BoundedSeries::new(Duration::from_secs(60));
        for i in 0..300 {
            series.append(at(t0, i * 1_000));
        }

        let now = series.last().unwrap().t;
        let cutoff = now - TimeDelta::seconds(60);
        let window: Vec<_> = series.window(now).collect();

        assert!(!window.is_empty());
        assert!(window.iter().all(|p| p.t >= cutoff && p.t <= now));
        assert_eq!(window.len(), 61);
        assert_eq!(window.first().unwrap().t, cutoff);
    }

    #[test]
    fn window_is_restartable() {
        let t0 = base();
        let mut series = BoundedSeries::new(Duration::from_secs(10));
        for i in 0..5 {
            series.append(at(t0, i * 1_000));
        }
        let now = t0 + TimeDelta::seconds(4);
        let view = series.window(now);
        let first: Vec<_> = view.clone().copied().collect();
        let second: Vec<_> = view.copied().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 5);
    }

    #[test]
    fn compaction_is_observationally_transparent() {
        let t0 = base();
        let mut compacting = BoundedSeries::with_compact_floor(Duration::from_secs(5), 16);
        let mut hoarding = BoundedSeries::with_compact_floor(Duration::from_secs(5), usize::MAX);

        for i in 0..2_000 {
            let p = at(t0, i * 100);
            compacting.append(p);
            hoarding.append(p);

            if i % 97 == 0 {
                let now = p.t;
                let a: Vec<_> = compacting.window(now).copied().collect();
                let b: Vec<_> = hoarding.window(now).copied().collect();
                assert_eq!(a, b, "diverged at i = {i}");
            }
        }

        assert!(compacting.stored_len() < hoarding.stored_len());
        assert_eq!(hoarding.stored_len(), 2_000);
        assert_eq!(compacting.live_len(), hoarding.live_len());
    }

    #[test]
    fn compaction_waits_for_floor_and_half() {
        let t0 = base();
        let mut series = BoundedSeries::with_compact_floor(Duration::from_secs(1), 4);

        // 10 points 1s apart: each append slides everything older out.
        for i in 0..10 {
            series.append(at(t0, i * 1_000));
        }
        // The dead prefix crosses the floor at 7 stored points and is reclaimed.
        assert!(series.stored_len() < 10);
        assert!(series.live_len() <= 2);

        let mut quiet = BoundedSeries::with_compact_floor(Duration::from_secs(1), 256);
        for i in 0..10 {
            quiet.append(at(t0, i * 1_000));
        }
        assert_eq!(quiet.stored_len(), 10, "below the floor nothing is reclaimed");
        assert!(!quiet.compact());
    }

    #[test]
    fn out_of_order_points_are_kept_in_arrival_order() {
        let t0 = base();
        let mut series = BoundedSeries::new(Duration::from_secs(60));
        series.append(at(t0, 2_000));
        series.append(at(t0, 1_000));
        series.append(at(t0, 3_000));

        let now = t0 + TimeDelta::seconds(3);
        let values: Vec<f64> = series.window(now).map(|p| p.v).collect();
        assert_eq!(values, vec![2_000.0, 1_000.0, 3_000.0]);
    }

    #[test]
    fn clear_resets_everything() {
        let t0 = base();
        let mut series = BoundedSeries::new(Duration::from_secs(60));
        series.append(at(t0, 0));
        series.clear();
        assert!(series.is_empty());
        assert_eq!(series.stored_len(), 0);
        assert!(series.last().is_none());
    }
}
