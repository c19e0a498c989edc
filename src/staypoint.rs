//! # Stay Point Detection
//!
//! Single-pass incremental clustering of a trajectory into stay points,
//! following Li et al., "Mining user similarity based on location history"
//! (SIGSPATIAL 2008).
//!
//! ## Algorithm
//! 1. Open a candidate anchored at the first point
//! 2. For each following point, measure its distance to the candidate's
//!    anchor (the first member, not the running centroid)
//! 3. Within `distance_threshold`: append the point to the candidate
//! 4. Otherwise close the candidate. It is reported iff
//!    `departure - arrival >= time_threshold`, else it is skipped. A new
//!    candidate is anchored at the rejected point
//! 5. At end of input the open candidate is handled per [`TailPolicy`]
//!
//! Each point is measured against exactly one anchor, so detection is O(n)
//! distance computations for n points.

use std::fmt;
use std::iter::Copied;
use std::slice;

use chrono::{DateTime, Duration, Utc};
use log::debug;

use crate::geo_utils::{self, DistanceMetric};
use crate::{Error, GeoPoint, Result, Trajectory};

/// What to do with the candidate still open when a trajectory ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "json", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "json", serde(rename_all = "lowercase"))]
pub enum TailPolicy {
    /// Apply the validity rule to the trailing candidate and report it if valid.
    #[default]
    Evaluate,
    /// Discard the trailing candidate unconditionally.
    Drop,
}

/// Configuration for stay point detection.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "json", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "json", serde(default))]
pub struct StayPointConfig {
    /// Maximum distance from the anchor point for a point to join a candidate (meters).
    /// Default: 200.0
    pub distance_threshold: f64,
    /// Minimum time between arrival and departure for a valid stay point.
    /// Default: 20 minutes
    #[cfg_attr(feature = "json", serde(with = "crate::duration_secs"))]
    pub time_threshold: Duration,
    /// Handling of the candidate open at end of input.
    /// Default: [`TailPolicy::Evaluate`]
    pub tail_policy: TailPolicy,
}

impl Default for StayPointConfig {
    fn default() -> Self {
        Self {
            distance_threshold: 200.0,
            time_threshold: Duration::minutes(20),
            tail_policy: TailPolicy::Evaluate,
        }
    }
}

impl StayPointConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.distance_threshold.is_finite() || self.distance_threshold <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "distance threshold must be a positive number of meters, got {}",
                self.distance_threshold
            )));
        }
        if self.time_threshold <= Duration::zero() {
            return Err(Error::InvalidConfig(format!(
                "time threshold must be positive, got {}s",
                self.time_threshold.num_seconds()
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Stay Point Entity
// =============================================================================

/// A validated stay point: consecutive points that all lie within the
/// distance threshold of the first one and span at least the time threshold.
///
/// Read-only once constructed.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub struct StayPoint {
    latitude: f64,
    longitude: f64,
    points: Vec<GeoPoint>,
    distance_threshold: f64,
    #[cfg_attr(feature = "json", serde(with = "crate::duration_secs"))]
    time_threshold: Duration,
}

impl StayPoint {
    fn from_candidate(candidate: Candidate, config: &StayPointConfig) -> Self {
        // candidates always hold their anchor
        let (latitude, longitude) = geo_utils::compute_center(&candidate.points).unwrap_or_default();
        Self {
            latitude,
            longitude,
            points: candidate.points,
            distance_threshold: config.distance_threshold,
            time_threshold: config.time_threshold,
        }
    }

    /// Mean latitude and mean longitude of the members.
    pub fn centroid(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Timestamp of the first member.
    pub fn arrival(&self) -> DateTime<Utc> {
        self.anchor().timestamp
    }

    /// Timestamp of the last member.
    pub fn departure(&self) -> DateTime<Utc> {
        self.points[self.points.len() - 1].timestamp
    }

    pub fn duration(&self) -> Duration {
        self.departure() - self.arrival()
    }

    pub fn arrival_epoch(&self) -> i64 {
        self.arrival().timestamp()
    }

    pub fn departure_epoch(&self) -> i64 {
        self.departure().timestamp()
    }

    /// The first member; all members are within the distance threshold of it.
    pub fn anchor(&self) -> &GeoPoint {
        &self.points[0]
    }

    pub fn member_count(&self) -> usize {
        self.points.len()
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    pub fn distance_threshold(&self) -> f64 {
        self.distance_threshold
    }

    pub fn time_threshold(&self) -> Duration {
        self.time_threshold
    }

    /// Whole meters from the centroid to the farthest member, plus one.
    pub fn radius(&self, metric: DistanceMetric) -> f64 {
        geo_utils::max_distance_from(self.centroid(), &self.points, metric).floor() + 1.0
    }
}

impl fmt::Display for StayPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.6}, {:.6}) from {} to {} ({}s, {} points)",
            self.latitude,
            self.longitude,
            self.arrival(),
            self.departure(),
            self.duration().num_seconds(),
            self.points.len()
        )
    }
}

/// Open cluster under construction.
#[derive(Debug)]
struct Candidate {
    points: Vec<GeoPoint>,
}

impl Candidate {
    fn anchored_at(point: GeoPoint) -> Self {
        Self { points: vec![point] }
    }

    /// Append `point` if it is within `threshold` meters of the anchor.
    fn add_point(&mut self, point: GeoPoint, threshold: f64, metric: DistanceMetric) -> bool {
        let distance = metric.distance(&self.points[0], &point);
        if distance > threshold {
            return false;
        }
        self.points.push(point);
        true
    }

    fn is_valid(&self, time_threshold: Duration) -> bool {
        let first = &self.points[0];
        let last = &self.points[self.points.len() - 1];
        self.points.len() >= 2 && last.timestamp - first.timestamp >= time_threshold
    }
}

// =============================================================================
// Detector
// =============================================================================

/// Counts of closed candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectionStats {
    /// Candidates reported as stay points.
    pub detected: usize,
    /// Candidates discarded, either for falling short of the time threshold
    /// or as a dropped trailing candidate.
    pub skipped: usize,
}

impl std::ops::AddAssign for DetectionStats {
    fn add_assign(&mut self, other: Self) {
        self.detected += other.detected;
        self.skipped += other.skipped;
    }
}

/// Stay point detector with fixed thresholds and earth model.
///
/// # Example
/// ```
/// use staypoint_miner::{GeoPoint, StayPointConfig, StayPointDetector, DistanceMetric};
/// use chrono::{Duration, TimeZone, Utc};
///
/// let t0 = Utc.with_ymd_and_hms(2009, 4, 22, 10, 0, 0).unwrap();
/// let points: Vec<GeoPoint> = [0, 10, 25]
///     .iter()
///     .map(|&m| GeoPoint::new(39.9843, 116.3186, t0 + Duration::minutes(m)))
///     .collect();
///
/// let detector = StayPointDetector::new(StayPointConfig::default(), DistanceMetric::Geodesic);
/// let stay_points: Vec<_> = detector.detect_points(points).collect::<Result<_, _>>().unwrap();
/// assert_eq!(stay_points.len(), 1);
/// assert_eq!(stay_points[0].duration(), Duration::minutes(25));
/// ```
#[derive(Debug, Clone)]
pub struct StayPointDetector {
    config: StayPointConfig,
    metric: DistanceMetric,
}

impl StayPointDetector {
    pub fn new(config: StayPointConfig, metric: DistanceMetric) -> Self {
        Self { config, metric }
    }

    pub fn config(&self) -> &StayPointConfig {
        &self.config
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Lazily detect stay points on a trajectory.
    pub fn detect<'a>(&self, trajectory: &'a Trajectory) -> StayPoints<Copied<slice::Iter<'a, GeoPoint>>> {
        self.detect_points(trajectory.iter().copied())
    }

    /// Lazily detect stay points on any chronologically ordered point
    /// sequence.
    ///
    /// A point earlier than its predecessor yields
    /// [`Error::OutOfOrderInput`] once and ends the iteration.
    pub fn detect_points<I>(&self, points: I) -> StayPoints<I::IntoIter>
    where
        I: IntoIterator<Item = GeoPoint>,
    {
        StayPoints {
            points: points.into_iter(),
            config: self.config.clone(),
            metric: self.metric,
            candidate: None,
            previous: None,
            stats: DetectionStats::default(),
            exhausted: false,
        }
    }

    /// Detect all stay points on a trajectory, returning them with the stats.
    pub fn detect_all(&self, trajectory: &Trajectory) -> Result<(Vec<StayPoint>, DetectionStats)> {
        let mut stay_points = self.detect(trajectory);
        let found = stay_points.by_ref().collect::<Result<Vec<_>>>()?;
        Ok((found, stay_points.stats()))
    }
}

/// Lazy sequence of validated stay points, see [`StayPointDetector::detect_points`].
pub struct StayPoints<I> {
    points: I,
    config: StayPointConfig,
    metric: DistanceMetric,
    candidate: Option<Candidate>,
    previous: Option<DateTime<Utc>>,
    stats: DetectionStats,
    exhausted: bool,
}

impl<I> StayPoints<I> {
    /// Counts of candidates closed so far.
    pub fn stats(&self) -> DetectionStats {
        self.stats
    }

    /// Record a closed candidate, returning it if it is a valid stay point.
    fn close(&mut self, candidate: Candidate) -> Option<StayPoint> {
        if candidate.is_valid(self.config.time_threshold) {
            self.stats.detected += 1;
            Some(StayPoint::from_candidate(candidate, &self.config))
        } else {
            self.stats.skipped += 1;
            None
        }
    }
}

impl<I> Iterator for StayPoints<I>
where
    I: Iterator<Item = GeoPoint>,
{
    type Item = Result<StayPoint>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        while let Some(point) = self.points.next() {
            if let Some(previous) = self.previous {
                if point.timestamp < previous {
                    self.exhausted = true;
                    self.candidate = None;
                    return Some(Err(Error::OutOfOrderInput { previous, current: point.timestamp }));
                }
            }
            self.previous = Some(point.timestamp);

            let Some(candidate) = self.candidate.as_mut() else {
                self.candidate = Some(Candidate::anchored_at(point));
                continue;
            };

            if candidate.add_point(point, self.config.distance_threshold, self.metric) {
                continue;
            }

            let closed = std::mem::replace(candidate, Candidate::anchored_at(point));
            if let Some(stay_point) = self.close(closed) {
                return Some(Ok(stay_point));
            }
        }

        self.exhausted = true;
        let tail = self.candidate.take().and_then(|candidate| match self.config.tail_policy {
            TailPolicy::Evaluate => self.close(candidate),
            TailPolicy::Drop => {
                self.stats.skipped += 1;
                None
            }
        });

        if self.stats.detected + self.stats.skipped > 0 {
            debug!(
                "{:>4} detected stay points, {:>4} skipped candidates",
                self.stats.detected, self.stats.skipped
            );
        }

        tail.map(Ok)
    }
}

impl<I> std::iter::FusedIterator for StayPoints<I> where I: Iterator<Item = GeoPoint> {}
