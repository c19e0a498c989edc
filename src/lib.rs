//! # Stay Point Miner
//!
//! Trajectory segmentation and stay point detection for raw GPS logs.
//!
//! This library provides:
//! - Splitting a chronologically ordered point stream into trajectories on time gaps
//! - Single-pass stay point detection (Li et al., SIGSPATIAL 2008)
//! - A GeoLife `.plt` record source, per-subject grouping and CSV export
//!
//! ## Features
//!
//! - **`parallel`** - Process independent subjects in parallel with rayon
//! - **`json`** - Serde derives and JSON configuration files
//! - **`cli`** - The `staypoints` command-line binary
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use staypoint_miner::{GeoPoint, PipelineConfig, TrajectorySegmenter, StayPointDetector};
//! use chrono::{Duration, TimeZone, Utc};
//!
//! let t0 = Utc.with_ymd_and_hms(2009, 4, 22, 10, 0, 0).unwrap();
//! let points: Vec<GeoPoint> = (0..6)
//!     .map(|i| GeoPoint::new(39.9843, 116.3186, t0 + Duration::minutes(5 * i)))
//!     .collect();
//!
//! let config = PipelineConfig::default();
//! let segmenter = TrajectorySegmenter::new("000", config.segmentation.clone());
//! let detector = StayPointDetector::new(config.stay_points.clone(), config.metric);
//!
//! for trajectory in segmenter.segment(points.into_iter().map(Ok)) {
//!     let trajectory = trajectory.unwrap();
//!     for stay_point in detector.detect(&trajectory) {
//!         println!("{}", stay_point.unwrap());
//!     }
//! }
//! ```

use std::fmt;

use chrono::{DateTime, Utc};

pub mod error;
pub use error::{Error, Result};

pub mod geo_utils;
pub use geo_utils::DistanceMetric;

pub mod trajectory;
pub use trajectory::{Admission, SegmentationConfig, Trajectories, Trajectory, TrajectorySegmenter};

pub mod staypoint;
pub use staypoint::{DetectionStats, StayPoint, StayPointConfig, StayPointDetector, StayPoints, TailPolicy};

pub mod reader;
pub use reader::{PltFile, PltRecords};

pub mod subject;
pub use subject::{discover_plt_files, group_by_subject, load_subjects, Subject, SubjectLoadFailure};

pub mod pipeline;
pub use pipeline::{process_subject, process_subjects, SubjectReport};

#[cfg(feature = "parallel")]
pub use pipeline::process_subjects_parallel;

pub mod export;
pub use export::{save_stay_points_csv, write_stay_points_csv};

// ============================================================================
// Core Types
// ============================================================================

/// A timestamped GPS coordinate.
///
/// # Example
/// ```
/// use staypoint_miner::GeoPoint;
/// use chrono::{TimeZone, Utc};
///
/// let t = Utc.with_ymd_and_hms(2009, 4, 22, 10, 46, 0).unwrap();
/// let point = GeoPoint::new(39.890275, 116.453691, t);
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "json", derive(serde::Serialize, serde::Deserialize))]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
}

impl GeoPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64, timestamp: DateTime<Utc>) -> Self {
        Self { latitude, longitude, timestamp }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }

    /// `(latitude, longitude)` pair.
    pub fn location(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    /// Distance to another point in meters under the given earth model.
    pub fn distance_to(&self, other: &GeoPoint, metric: DistanceMetric) -> f64 {
        metric.distance(self, other)
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}) @{}", self.latitude, self.longitude, self.timestamp)
    }
}

/// Configuration for a full segmentation + detection run.
///
/// One config carries one [`DistanceMetric`]; every distance measured in a
/// run uses it.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "json", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "json", serde(default))]
pub struct PipelineConfig {
    pub segmentation: SegmentationConfig,
    pub stay_points: StayPointConfig,
    pub metric: DistanceMetric,
}

impl PipelineConfig {
    /// Reject thresholds the algorithms cannot work with.
    pub fn validate(&self) -> Result<()> {
        self.segmentation.validate()?;
        self.stay_points.validate()
    }

    /// Load a config from a JSON file. Missing fields take their defaults.
    #[cfg(feature = "json")]
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
        let config: PipelineConfig = serde_json::from_reader(std::io::BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }
}

/// Serde adapter storing a `chrono::Duration` as whole seconds.
#[cfg(feature = "json")]
pub(crate) mod duration_secs {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(d.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = i64::deserialize(d)?;
        Duration::try_seconds(secs).ok_or_else(|| serde::de::Error::custom("duration out of range"))
    }
}

// ============================================================================
// Tests
// ============================================================================
