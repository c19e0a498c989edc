//! # Trajectory Segmentation
//!
//! Splits one subject's chronologically ordered point stream into
//! temporally contiguous trajectories.
//!
//! ## Algorithm
//! 1. The first point seeds the current trajectory
//! 2. Each following point is appended while its gap to the latest point is
//!    strictly below the gap threshold
//! 3. A point whose gap reaches the threshold closes the current trajectory,
//!    which is emitted, and seeds the next one
//! 4. The last, possibly partial, trajectory is flushed when the input ends
//!
//! Every emitted trajectory is non-empty and satisfies
//! `b.timestamp - a.timestamp < gap_threshold` for all adjacent `(a, b)`.

use std::fmt;
use std::slice;

use chrono::{DateTime, Duration, Utc};
use log::debug;

use crate::geo_utils::{self, DistanceMetric};
use crate::staypoint::{StayPointConfig, StayPointDetector, StayPoints};
use crate::{Error, GeoPoint, Result};

/// Configuration for trajectory segmentation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "json", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "json", serde(default))]
pub struct SegmentationConfig {
    /// Gap between consecutive points that starts a new trajectory.
    /// Default: 20 minutes
    #[cfg_attr(feature = "json", serde(with = "crate::duration_secs"))]
    pub gap_threshold: Duration,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            gap_threshold: Duration::minutes(20),
        }
    }
}

impl SegmentationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.gap_threshold <= Duration::zero() {
            return Err(Error::InvalidConfig(format!(
                "gap threshold must be positive, got {}s",
                self.gap_threshold.num_seconds()
            )));
        }
        Ok(())
    }
}

/// Outcome of offering a point to a [`Trajectory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Admission {
    /// The point was appended.
    Accepted,
    /// The gap to the latest point reached the threshold; the point was not
    /// appended and should seed a new trajectory.
    Rejected,
}

/// A temporally contiguous run of GPS points for one subject.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    subject_id: String,
    gap_threshold: Duration,
    points: Vec<GeoPoint>,
}

impl Trajectory {
    /// Create an empty trajectory.
    pub fn new(subject_id: impl Into<String>, config: &SegmentationConfig) -> Self {
        Self {
            subject_id: subject_id.into(),
            gap_threshold: config.gap_threshold,
            points: Vec::new(),
        }
    }

    /// Create a trajectory seeded with one point.
    pub fn with_seed(subject_id: impl Into<String>, config: &SegmentationConfig, seed: GeoPoint) -> Self {
        let mut trajectory = Self::new(subject_id, config);
        trajectory.points.push(seed);
        trajectory
    }

    /// Offer the next point of the stream.
    ///
    /// An empty trajectory accepts unconditionally. Otherwise the point is
    /// appended iff its gap to [`latest_time`](Self::latest_time) is strictly
    /// less than the gap threshold.
    ///
    /// Returns [`Error::OutOfOrderInput`] if the point is older than the
    /// latest point.
    ///
    /// # Example
    /// ```
    /// use staypoint_miner::{Admission, GeoPoint, SegmentationConfig, Trajectory};
    /// use chrono::{Duration, TimeZone, Utc};
    ///
    /// let t0 = Utc.with_ymd_and_hms(2009, 4, 22, 10, 0, 0).unwrap();
    /// let mut trajectory = Trajectory::new("000", &SegmentationConfig::default());
    ///
    /// let a = GeoPoint::new(39.98, 116.31, t0);
    /// let b = GeoPoint::new(39.98, 116.31, t0 + Duration::minutes(25));
    /// assert_eq!(trajectory.add_point(a).unwrap(), Admission::Accepted);
    /// assert_eq!(trajectory.add_point(b).unwrap(), Admission::Rejected);
    /// assert_eq!(trajectory.len(), 1);
    /// ```
    pub fn add_point(&mut self, point: GeoPoint) -> Result<Admission> {
        let Some(latest) = self.points.last() else {
            self.points.push(point);
            return Ok(Admission::Accepted);
        };

        let gap = point.timestamp - latest.timestamp;
        if gap < Duration::zero() {
            return Err(Error::OutOfOrderInput {
                previous: latest.timestamp,
                current: point.timestamp,
            });
        }

        if gap >= self.gap_threshold {
            return Ok(Admission::Rejected);
        }

        self.points.push(point);
        Ok(Admission::Accepted)
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn gap_threshold(&self) -> Duration {
        self.gap_threshold
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    pub fn iter(&self) -> slice::Iter<'_, GeoPoint> {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Timestamp of the first point.
    pub fn earliest_time(&self) -> Option<DateTime<Utc>> {
        self.points.first().map(|p| p.timestamp)
    }

    /// Timestamp of the last point.
    pub fn latest_time(&self) -> Option<DateTime<Utc>> {
        self.points.last().map(|p| p.timestamp)
    }

    /// Time between the first and last point; zero when empty.
    pub fn duration(&self) -> Duration {
        match (self.earliest_time(), self.latest_time()) {
            (Some(start), Some(end)) => end - start,
            _ => Duration::zero(),
        }
    }

    /// Path length in meters.
    pub fn path_length(&self, metric: DistanceMetric) -> f64 {
        geo_utils::polyline_length(&self.points, metric)
    }

    /// Detect stay points on this trajectory.
    pub fn stay_points(&self, config: &StayPointConfig, metric: DistanceMetric) -> StayPoints<std::iter::Copied<slice::Iter<'_, GeoPoint>>> {
        StayPointDetector::new(config.clone(), metric).detect(self)
    }

    pub fn into_points(self) -> Vec<GeoPoint> {
        self.points
    }
}

impl<'a> IntoIterator for &'a Trajectory {
    type Item = &'a GeoPoint;
    type IntoIter = slice::Iter<'a, GeoPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

impl fmt::Display for Trajectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.earliest_time(), self.latest_time()) {
            (Some(start), Some(end)) => write!(
                f,
                "{:>4} points, {} to {} ({}s)",
                self.points.len(),
                start,
                end,
                (end - start).num_seconds()
            ),
            _ => write!(f, "   0 points"),
        }
    }
}

// =============================================================================
// Segmenter
// =============================================================================

/// Push-based trajectory segmenter for one subject.
///
/// Feed points in chronological order with [`push`](Self::push); a completed
/// trajectory is returned whenever a point breaks the gap invariant. Call
/// [`finish`](Self::finish) at end of input to flush the last trajectory.
#[derive(Debug, Clone)]
pub struct TrajectorySegmenter {
    subject_id: String,
    config: SegmentationConfig,
    metric: DistanceMetric,
    current: Trajectory,
}

impl TrajectorySegmenter {
    pub fn new(subject_id: impl Into<String>, config: SegmentationConfig) -> Self {
        let subject_id = subject_id.into();
        let current = Trajectory::new(subject_id.clone(), &config);
        Self {
            subject_id,
            config,
            metric: DistanceMetric::default(),
            current,
        }
    }

    /// Metric used for the break diagnostics logged at debug level.
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Offer the next point. Returns the finalised trajectory when `point`
    /// starts a new one.
    pub fn push(&mut self, point: GeoPoint) -> Result<Option<Trajectory>> {
        match self.current.add_point(point)? {
            Admission::Accepted => Ok(None),
            Admission::Rejected => {
                let next = Trajectory::with_seed(self.subject_id.clone(), &self.config, point);
                let finished = std::mem::replace(&mut self.current, next);
                if let Some(last) = finished.points.last() {
                    debug!(
                        "[Segmenter {}] Trajectory: {}; break of {}s over {:.2}m to {}",
                        self.subject_id,
                        finished,
                        (point.timestamp - last.timestamp).num_seconds(),
                        self.metric.distance(last, &point),
                        point
                    );
                }
                Ok(Some(finished))
            }
        }
    }

    /// Flush the trailing trajectory, if any points were pushed since the
    /// last emission.
    pub fn finish(self) -> Option<Trajectory> {
        if self.current.is_empty() {
            None
        } else {
            Some(self.current)
        }
    }

    /// Lazily segment a point stream.
    ///
    /// The returned iterator yields trajectories in order. An `Err` item from
    /// the input, or an out-of-order point, is yielded once and ends the
    /// iteration; the trajectory in progress is discarded.
    pub fn segment<I>(self, points: I) -> Trajectories<I::IntoIter>
    where
        I: IntoIterator<Item = Result<GeoPoint>>,
    {
        Trajectories {
            points: points.into_iter(),
            segmenter: Some(self),
        }
    }
}

/// Lazy sequence of trajectories, see [`TrajectorySegmenter::segment`].
pub struct Trajectories<I> {
    points: I,
    segmenter: Option<TrajectorySegmenter>,
}

impl<I> Iterator for Trajectories<I>
where
    I: Iterator<Item = Result<GeoPoint>>,
{
    type Item = Result<Trajectory>;

    fn next(&mut self) -> Option<Self::Item> {
        let segmenter = self.segmenter.as_mut()?;

        for point in self.points.by_ref() {
            let pushed = point.and_then(|p| segmenter.push(p));
            match pushed {
                Ok(None) => continue,
                Ok(Some(trajectory)) => return Some(Ok(trajectory)),
                Err(e) => {
                    self.segmenter = None;
                    return Some(Err(e));
                }
            }
        }

        self.segmenter.take()?.finish().map(Ok)
    }
}

impl<I> std::iter::FusedIterator for Trajectories<I> where I: Iterator<Item = Result<GeoPoint>> {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2009, 4, 22, 10, 0, 0).unwrap()
    }

    fn at(minutes: i64) -> GeoPoint {
        GeoPoint::new(39.9843, 116.3186, t0() + Duration::minutes(minutes))
    }

    fn segment(points: Vec<GeoPoint>) -> Vec<Trajectory> {
        TrajectorySegmenter::new("000", SegmentationConfig::default())
            .segment(points.into_iter().map(Ok))
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_empty_input_yields_no_trajectories() {
        assert!(segment(vec![]).is_empty());
    }

    #[test]
    fn test_gap_at_threshold_splits() {
        // 25 min gap >= 20 min threshold
        let trajectories = segment(vec![at(0), at(25)]);
        assert_eq!(trajectories.len(), 2);
        assert_eq!(trajectories[0].len(), 1);
        assert_eq!(trajectories[1].len(), 1);

        // exactly 20 min also splits
        assert_eq!(segment(vec![at(0), at(20)]).len(), 2);
    }

    #[test]
    fn test_gap_below_threshold_joins() {
        let trajectories = segment(vec![at(0), at(19), at(38), at(57)]);
        assert_eq!(trajectories.len(), 1);
        assert_eq!(trajectories[0].len(), 4);
        assert_eq!(trajectories[0].duration(), Duration::minutes(57));
    }

    #[test]
    fn test_gap_invariant_and_coverage() {
        let minutes = [0, 1, 2, 30, 31, 60, 61, 62, 63, 100];
        let input: Vec<GeoPoint> = minutes.iter().map(|&m| at(m)).collect();
        let trajectories = segment(input.clone());
        assert_eq!(trajectories.len(), 4);

        let threshold = SegmentationConfig::default().gap_threshold;
        for (i, trajectory) in trajectories.iter().enumerate() {
            for w in trajectory.points().windows(2) {
                assert!(w[1].timestamp - w[0].timestamp < threshold);
            }
            if let Some(next) = trajectories.get(i + 1) {
                let gap = next.earliest_time().unwrap() - trajectory.latest_time().unwrap();
                assert!(gap >= threshold);
            }
        }

        // No point lost, duplicated or reordered
        let flattened: Vec<GeoPoint> = trajectories.into_iter().flat_map(Trajectory::into_points).collect();
        assert_eq!(flattened, input);
    }

    #[test]
    fn test_trajectory_emitted_at_break_without_draining_input() {
        let head = vec![Ok(at(0)), Ok(at(5)), Ok(at(40))];
        let rest = std::iter::from_fn(|| -> Option<Result<GeoPoint>> { panic!("input pulled past the break") });
        let mut results = TrajectorySegmenter::new("000", SegmentationConfig::default()).segment(head.into_iter().chain(rest));

        let first = results.next().unwrap().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first.latest_time(), Some(t0() + Duration::minutes(5)));
    }

    #[test]
    fn test_out_of_order_fails_fast() {
        let mut results = TrajectorySegmenter::new("000", SegmentationConfig::default())
            .segment(vec![Ok(at(10)), Ok(at(5)), Ok(at(40))]);
        assert!(matches!(results.next(), Some(Err(Error::OutOfOrderInput { .. }))));
        assert!(results.next().is_none());
    }

    #[test]
    fn test_equal_timestamps_are_accepted() {
        let trajectories = segment(vec![at(0), at(0), at(0)]);
        assert_eq!(trajectories.len(), 1);
        assert_eq!(trajectories[0].len(), 3);
    }

    #[test]
    fn test_input_error_is_propagated() {
        let input = vec![Ok(at(0)), Err(Error::malformed("a.plt", 7, "bad")), Ok(at(1))];
        let results: Vec<_> = TrajectorySegmenter::new("000", SegmentationConfig::default())
            .segment(input)
            .collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(Error::MalformedRecord { line: 7, .. })));
    }

    #[test]
    fn test_push_and_finish() {
        let mut segmenter = TrajectorySegmenter::new("042", SegmentationConfig::default());
        assert!(segmenter.push(at(0)).unwrap().is_none());
        assert!(segmenter.push(at(5)).unwrap().is_none());
        let first = segmenter.push(at(60)).unwrap().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first.subject_id(), "042");
        let last = segmenter.finish().unwrap();
        assert_eq!(last.points(), &[at(60)]);
    }

    #[test]
    fn test_finish_without_points() {
        let segmenter = TrajectorySegmenter::new("000", SegmentationConfig::default());
        assert!(segmenter.finish().is_none());
    }

    #[test]
    fn test_custom_threshold() {
        let config = SegmentationConfig { gap_threshold: Duration::minutes(5) };
        let trajectories: Vec<_> = TrajectorySegmenter::new("000", config)
            .segment(vec![Ok(at(0)), Ok(at(4)), Ok(at(9)), Ok(at(10))])
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(trajectories.len(), 2);
        assert_eq!(trajectories[0].gap_threshold(), Duration::minutes(5));
    }

    #[test]
    fn test_trajectory_display() {
        let mut trajectory = Trajectory::new("000", &SegmentationConfig::default());
        assert_eq!(trajectory.to_string(), "   0 points");
        assert_eq!(trajectory.add_point(at(0)).unwrap(), Admission::Accepted);
        assert_eq!(trajectory.add_point(at(2)).unwrap(), Admission::Accepted);
        assert_eq!(
            trajectory.to_string(),
            "   2 points, 2009-04-22 10:00:00 UTC to 2009-04-22 10:02:00 UTC (120s)"
        );
    }
}
