//! Capture-time allocation.
//!
//! Timestamps are raw seconds counted from midnight of the folder's date and
//! may exceed a day; callers convert them with
//! [`normalize`](crate::core::timestamp::normalize).
//!
//! Gaps between consecutive photographs of the main activity window are
//! proportional to how different the two pictures look, so a near-identical
//! pair gets a short gap and a change of scene gets a long one.

use crate::core::difference::{pairwise, DifferenceMetric};
use crate::core::grouper::Shot;
use crate::core::incident::{self, IncidentError, IncidentPolicy, StagedShots};
use crate::core::jitter::Jitter;
use crate::core::timestamp::{parse_hms, TimeParseError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configured anchor points of a work session, all in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Arrival, as seconds of day.
    pub start: i64,
    /// Gap between arrival and the before-work photo.
    pub duration_before: i64,
    /// Width of the main activity window.
    pub duration: i64,
}

impl Schedule {
    pub fn from_hms(start: &str, duration_before: &str, duration: &str) -> Result<Self, TimeParseError> {
        Ok(Self {
            start: parse_hms(start)?,
            duration_before: parse_hms(duration_before)?,
            duration: parse_hms(duration)?,
        })
    }

    /// `[start, start + duration)`, the window used by single-photo days.
    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            start: self.start,
            duration: self.duration,
        }
    }
}

/// Half-open interval of seconds of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: i64,
    pub duration: i64,
}

impl TimeWindow {
    pub fn end(&self) -> i64 {
        self.start + self.duration
    }

    pub fn contains(&self, t: i64) -> bool {
        t >= self.start && t < self.end()
    }
}

/// Timestamps for an incident, in timeline order.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub entries: Vec<(Shot, i64)>,
    /// Shots that were deliberately left without a timestamp.
    pub skipped: Vec<Shot>,
}

pub struct Allocator {
    schedule: Schedule,
}

impl Allocator {
    pub fn new(schedule: Schedule) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Timestamps for a leaf folder, ascending, one per shot.
    ///
    /// The first shot is anchored at `start`, the second `duration_before`
    /// later, and the rest spread over `duration`. Both anchors carry jitter,
    /// so the result may fall outside the nominal window.
    pub fn flat<M, J>(&self, shots: &[Shot], metric: &M, jitter: &mut J) -> Vec<i64>
    where
        M: DifferenceMetric + ?Sized,
        J: Jitter + ?Sized,
    {
        let n = shots.len();
        if n == 0 {
            return Vec::new();
        }

        let t1 = self.schedule.start + jitter.offset();
        if n == 1 {
            return vec![t1];
        }

        let t2 = t1 + self.schedule.duration_before + jitter.offset();
        let mut times = vec![t1, t2];
        if n > 2 {
            let diffs = pairwise(metric, &paths(&shots[1..]));
            let gaps = weighted_gaps(&diffs, self.schedule.duration);
            times.extend(walk(t2, &gaps));
        }

        // anchors may invert under jitter
        times.sort_unstable();
        times
    }

    /// Timestamps for stage-typed shots, ascending, aligned with
    /// [`StagedShots::ordered`].
    ///
    /// The main window nominally opens at the before-work photo and both of
    /// its edges carry their own jitter, independent of the anchors. Edges
    /// are never clamped; a window that opens early is only reordered by the
    /// final sort.
    pub fn staged<M, J>(&self, staged: &StagedShots, metric: &M, jitter: &mut J) -> Vec<i64>
    where
        M: DifferenceMetric + ?Sized,
        J: Jitter + ?Sized,
    {
        let t_start = self.schedule.start + jitter.offset();
        let t_before = t_start + self.schedule.duration_before + jitter.offset();
        let mut times = vec![t_start, t_before];

        let m = staged.main.len();
        if m > 0 {
            let window_start = t_before + jitter.offset();
            let window_end = t_before + self.schedule.duration + jitter.offset();

            if m == 1 {
                times.push(window_end);
            } else {
                let diffs = pairwise(metric, &paths(&staged.main));
                let gaps = weighted_gaps(&diffs, (window_end - window_start).max(0));
                times.push(window_start);
                times.extend(walk(window_start, &gaps));
            }
        }

        times.sort_unstable();
        times
    }

    /// Allocate an incident under `policy`. `stages` must be grouped and
    /// sorted per stage, in stage order.
    pub fn incident<M, J>(
        &self,
        stages: Vec<Vec<Shot>>,
        policy: IncidentPolicy,
        metric: &M,
        jitter: &mut J,
    ) -> Result<Allocation, IncidentError>
    where
        M: DifferenceMetric + ?Sized,
        J: Jitter + ?Sized,
    {
        match policy {
            IncidentPolicy::StageTyped => {
                let staged = incident::classify(stages)?;
                let times = self.staged(&staged, metric, jitter);
                Ok(Allocation {
                    entries: staged.ordered().into_iter().zip(times).collect(),
                    skipped: staged.skipped,
                })
            }
            IncidentPolicy::FlatConcatenation => {
                let shots = incident::concatenate(stages);
                let times = self.flat(&shots, metric, jitter);
                Ok(Allocation {
                    entries: shots.into_iter().zip(times).collect(),
                    skipped: Vec::new(),
                })
            }
        }
    }
}

fn paths(shots: &[Shot]) -> Vec<PathBuf> {
    shots.iter().map(|s| s.path.clone()).collect()
}

/// Split `span` into one gap per difference, proportional to the
/// differences. Falls back to equal gaps when the differences sum to zero.
/// Every gap is at least one second.
pub fn weighted_gaps(diffs: &[f64], span: i64) -> Vec<i64> {
    if diffs.is_empty() {
        return Vec::new();
    }

    let weights: Vec<f64> = diffs
        .iter()
        .map(|d| if d.is_finite() && *d > 0.0 { *d } else { 0.0 })
        .collect();
    let total: f64 = weights.iter().sum();
    let span = span as f64;

    if total <= 0.0 {
        log::debug!("All {} differences are zero, using equal gaps", diffs.len());
        let gap = ((span / diffs.len() as f64).floor() as i64).max(1);
        return vec![gap; diffs.len()];
    }

    weights
        .iter()
        .map(|w| ((span * w / total).floor() as i64).max(1))
        .collect()
}

/// Cumulative sums of `gaps` starting after `from`.
fn walk(from: i64, gaps: &[i64]) -> Vec<i64> {
    gaps.iter()
        .scan(from, |current, gap| {
            *current += gap;
            Some(*current)
        })
        .collect()
}
