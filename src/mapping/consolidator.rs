//! Consolidates bump dots into axis-aligned wall segments and decides when
//! the map is finished.
//!
//! Every bump becomes a dot. A periodic housekeeping pass merges dots that
//! lie on a common row or column with gaps under the minimum feature size
//! into maximal segments, absorbs dots that fall on a segment, and joins
//! touching collinear segments. The map is complete once no loose dots
//! remain and every segment belongs to a closed loop of near-touching
//! segments; completion stops the run.
//!
//! All identity is in integer millimeters; world I/O is in meters.

use crate::core::{Point, MIN_FEATURE_SIZE_M};
use crate::engine::SchedulerHandle;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub type MapHandle = Arc<MapConsolidator>;

/// Merge gap threshold in millimeters. Gaps strictly below merge.
const GAP_MM: i64 = (MIN_FEATURE_SIZE_M * 1000.0) as i64;

/// Endpoint closeness for loop walking, in millimeters.
const CLOSE_MM: i64 = GAP_MM / 2;

/// Axis-aligned segment, endpoints in millimeters, normalized `a <= b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct Segment {
    a: (i64, i64),
    b: (i64, i64),
}

impl Segment {
    fn horizontal(y: i64, x1: i64, x2: i64) -> Segment {
        Segment {
            a: (x1.min(x2), y),
            b: (x1.max(x2), y),
        }
    }

    fn vertical(x: i64, y1: i64, y2: i64) -> Segment {
        Segment {
            a: (x, y1.min(y2)),
            b: (x, y1.max(y2)),
        }
    }

    fn is_horizontal(&self) -> bool {
        self.a.1 == self.b.1
    }

    fn contains_dot(&self, dot: (i64, i64)) -> bool {
        if self.is_horizontal() {
            dot.1 == self.a.1 && self.a.0 <= dot.0 && dot.0 <= self.b.0
        } else {
            dot.0 == self.a.0 && self.a.1 <= dot.1 && dot.1 <= self.b.1
        }
    }

    /// Any endpoint of `self` within the loop-walking distance of any
    /// endpoint of `other`.
    fn is_close_to(&self, other: &Segment) -> bool {
        for p in [self.a, self.b] {
            for q in [other.a, other.b] {
                let dx = (p.0 - q.0) as f64;
                let dy = (p.1 - q.1) as f64;
                if (dx * dx + dy * dy).sqrt() < CLOSE_MM as f64 {
                    return true;
                }
            }
        }
        false
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MapSnapshot {
    pub dots: Vec<Point>,
    pub segments: Vec<(Point, Point)>,
    pub complete: bool,
}

#[derive(Default)]
struct MapState {
    dots: BTreeSet<(i64, i64)>,
    segments: BTreeSet<Segment>,
    complete: bool,
    consolidations: u64,
}

pub struct MapConsolidator {
    state: Mutex<MapState>,
    engine: SchedulerHandle,
    period_s: f64,
}

impl MapConsolidator {
    pub fn new(engine: SchedulerHandle, period_s: f64) -> MapHandle {
        Arc::new(MapConsolidator {
            state: Mutex::new(MapState::default()),
            engine,
            period_s,
        })
    }

    /// Arm the periodic housekeeping pass.
    pub fn start(self: &Arc<Self>) {
        self.reschedule();
    }

    /// Record a bump dot. Repeated reports of the same position are
    /// absorbed.
    pub fn notify_bump(&self, position: Point) {
        let dot = position.to_mm();
        let mut state = self.state.lock();
        if state.dots.insert(dot) {
            log::debug!("[Map] new dot at ({:.3}, {:.3})", position.x, position.y);
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state.lock().complete
    }

    pub fn snapshot(&self) -> MapSnapshot {
        let state = self.state.lock();
        MapSnapshot {
            dots: state
                .dots
                .iter()
                .map(|&(x, y)| Point::new(x as f64 / 1000.0, y as f64 / 1000.0))
                .collect(),
            segments: state
                .segments
                .iter()
                .map(|s| {
                    (
                        Point::new(s.a.0 as f64 / 1000.0, s.a.1 as f64 / 1000.0),
                        Point::new(s.b.0 as f64 / 1000.0, s.b.1 as f64 / 1000.0),
                    )
                })
                .collect(),
            complete: state.complete,
        }
    }

    /// One consolidation pass. Idempotent. Public so tests and the
    /// housekeeping event share one path.
    pub fn consolidate(&self) {
        let mut state = self.state.lock();
        Self::consolidate_state(&mut state);
        state.complete = Self::closed_loop(&state);
        state.consolidations += 1;
        log::debug!(
            "[Map] consolidated: {} dots, {} segments, complete={}",
            state.dots.len(),
            state.segments.len(),
            state.complete
        );
    }

    /// Housekeeping event: consolidate, finish the run on a closed map,
    /// otherwise re-arm.
    pub fn house_keeping(self: &Arc<Self>) {
        self.consolidate();
        if self.is_complete() {
            log::info!("[Map] map closed, completing run");
            self.engine.complete_run();
        } else {
            self.reschedule();
        }
    }

    fn reschedule(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let at = self.engine.current_time() + self.period_s;
        if let Err(e) = self
            .engine
            .schedule(at, Some("map-housekeeping"), move || this.house_keeping())
        {
            log::error!("[Map] failed to arm housekeeping: {}", e);
        }
    }

    fn consolidate_state(state: &mut MapState) {
        // Candidate points: loose dots plus every segment endpoint, so a
        // wall can grow from the end of a perpendicular one.
        let mut points: BTreeSet<(i64, i64)> = state.dots.clone();
        for seg in &state.segments {
            points.insert(seg.a);
            points.insert(seg.b);
        }

        let horizontal = Self::merge_axis(
            state.segments.iter().filter(|s| s.is_horizontal()),
            points.iter().map(|&(x, y)| (y, x)),
            Segment::horizontal,
        );
        let vertical = Self::merge_axis(
            state.segments.iter().filter(|s| !s.is_horizontal()),
            points.iter().map(|&(x, y)| (x, y)),
            Segment::vertical,
        );

        state.segments = horizontal.into_iter().chain(vertical).collect();
        let segments = state.segments.clone();
        state
            .dots
            .retain(|&dot| !segments.iter().any(|s| s.contains_dot(dot)));
    }

    /// Merge one orientation: group intervals by the shared coordinate,
    /// then chain intervals whose gap is strictly under the feature size.
    /// Zero-length results are lone dots, not segments.
    fn merge_axis<'a>(
        segments: impl Iterator<Item = &'a Segment>,
        points: impl Iterator<Item = (i64, i64)>,
        make: fn(i64, i64, i64) -> Segment,
    ) -> Vec<Segment> {
        let mut groups: BTreeMap<i64, Vec<(i64, i64)>> = BTreeMap::new();
        for seg in segments {
            if seg.is_horizontal() {
                groups.entry(seg.a.1).or_default().push((seg.a.0, seg.b.0));
            } else {
                groups.entry(seg.a.0).or_default().push((seg.a.1, seg.b.1));
            }
        }
        for (reference, v) in points {
            groups.entry(reference).or_default().push((v, v));
        }

        let mut result = Vec::new();
        for (reference, mut intervals) in groups {
            intervals.sort_unstable();
            let mut current: Option<(i64, i64)> = None;
            for (lo, hi) in intervals {
                match current {
                    Some((clo, chi)) if lo - chi < GAP_MM => {
                        current = Some((clo, chi.max(hi)));
                    }
                    Some((clo, chi)) => {
                        if clo < chi {
                            result.push(make(reference, clo, chi));
                        }
                        current = Some((lo, hi));
                    }
                    None => current = Some((lo, hi)),
                }
            }
            if let Some((clo, chi)) = current {
                if clo < chi {
                    result.push(make(reference, clo, chi));
                }
            }
        }
        result
    }

    /// True when no loose dots remain and every segment can be consumed
    /// into closed loops of near-touching segments. An open chain is
    /// simply not complete yet.
    fn closed_loop(state: &MapState) -> bool {
        if !state.dots.is_empty() || state.segments.is_empty() {
            return false;
        }
        let mut remaining: Vec<Segment> = state.segments.iter().copied().collect();
        while let Some(&start) = remaining.first() {
            match Self::walk_loop(&remaining, start) {
                Some(found) => remaining.retain(|s| !found.contains(s)),
                None => return false,
            }
        }
        true
    }

    /// Greedy walk over near-touching segments; a loop closes when, with
    /// more than two members, the latest segment touches the first again.
    fn walk_loop(all: &[Segment], start: Segment) -> Option<Vec<Segment>> {
        let mut walked = vec![start];
        loop {
            let last = walked[walked.len() - 1];
            let next = all
                .iter()
                .find(|s| !walked.contains(s) && last.is_close_to(s))?;
            walked.push(*next);
            if walked.len() > 2 && walked[walked.len() - 1].is_close_to(&walked[0]) {
                return Some(walked);
            }
        }
    }
}
