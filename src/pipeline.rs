//! Per-subject orchestration: segment a subject's point stream, then detect
//! stay points on every trajectory.
//!
//! Subjects share no state, so [`process_subjects_parallel`] may run them on
//! the rayon pool. Within a subject, points are always consumed in order.

use std::time::Instant;

use log::{debug, info};

use crate::staypoint::{DetectionStats, StayPoint, StayPointDetector};
use crate::subject::Subject;
use crate::trajectory::TrajectorySegmenter;
use crate::{PipelineConfig, Result};

/// Stay points found for one subject.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub struct SubjectReport {
    pub subject_id: String,
    pub point_count: usize,
    pub trajectory_count: usize,
    /// Validated stay points of all trajectories, in chronological order.
    pub stay_points: Vec<StayPoint>,
    /// Candidates discarded across all trajectories.
    pub skipped_candidates: usize,
}

/// Run segmentation and detection over one subject.
///
/// Fails with [`Error::OutOfOrderInput`](crate::Error::OutOfOrderInput) if
/// the subject's logs overlap in time, or [`Error::InvalidConfig`](crate::Error::InvalidConfig).
pub fn process_subject(subject: &Subject, config: &PipelineConfig) -> Result<SubjectReport> {
    config.validate()?;
    let start = Instant::now();

    let segmenter = TrajectorySegmenter::new(subject.id(), config.segmentation.clone()).with_metric(config.metric);
    let detector = StayPointDetector::new(config.stay_points.clone(), config.metric);

    let mut trajectory_count = 0;
    let mut stay_points = Vec::new();
    let mut stats = DetectionStats::default();

    for trajectory in segmenter.segment(subject.points().copied().map(Ok)) {
        let trajectory = trajectory?;
        trajectory_count += 1;

        let (found, trajectory_stats) = detector.detect_all(&trajectory)?;
        debug!("[Subject {}] {} -> {} stay points", subject.id(), trajectory, found.len());
        stay_points.extend(found);
        stats += trajectory_stats;
    }

    info!(
        "[Subject {}] {} points, {} trajectories, {} stay points ({} skipped) in {:?}",
        subject.id(),
        subject.point_count(),
        trajectory_count,
        stats.detected,
        stats.skipped,
        start.elapsed()
    );

    Ok(SubjectReport {
        subject_id: subject.id().to_string(),
        point_count: subject.point_count(),
        trajectory_count,
        stay_points,
        skipped_candidates: stats.skipped,
    })
}

/// Process subjects one after another. One result per subject, in input order;
/// a failing subject does not stop the others.
pub fn process_subjects(subjects: &[Subject], config: &PipelineConfig) -> Vec<(String, Result<SubjectReport>)> {
    subjects
        .iter()
        .map(|s| (s.id().to_string(), process_subject(s, config)))
        .collect()
}

/// Process subjects in parallel using rayon. Same output as [`process_subjects`].
#[cfg(feature = "parallel")]
pub fn process_subjects_parallel(subjects: &[Subject], config: &PipelineConfig) -> Vec<(String, Result<SubjectReport>)> {
    use rayon::prelude::*;

    info!("Processing {} subjects on {} threads", subjects.len(), rayon::current_num_threads());
    subjects
        .par_iter()
        .map(|s| (s.id().to_string(), process_subject(s, config)))
        .collect()
}
