//! Basic example of segmenting a GPS stream and detecting stay points.
//!
//! Run with: cargo run --example detect_staypoints

use chrono::{Duration, TimeZone, Utc};
use staypoint_miner::{DistanceMetric, GeoPoint, SegmentationConfig, StayPointConfig, StayPointDetector, TrajectorySegmenter};

fn main() {
    let t0 = Utc.with_ymd_and_hms(2008, 10, 23, 8, 0, 0).unwrap();
    let at = |lat: f64, lon: f64, minutes: i64| GeoPoint::new(lat, lon, t0 + Duration::minutes(minutes));

    let points = vec![
        // Home (Beijing, Haidian)
        at(39.98430, 116.31860, 0),
        at(39.98435, 116.31862, 10),
        at(39.98428, 116.31858, 19),
        at(39.98431, 116.31861, 30),
        // Commute
        at(39.99000, 116.32500, 35),
        at(39.99800, 116.33200, 40),
        // Office, after the receiver lost signal for 45 minutes
        at(40.00500, 116.34000, 85),
        at(40.00502, 116.34003, 100),
        at(40.00498, 116.33998, 115),
    ];

    let segmentation = SegmentationConfig::default();
    let stay_config = StayPointConfig::default();
    let metric = DistanceMetric::Geodesic;

    println!("Stay Point Detection Example\n");
    println!(
        "Config: distance_threshold={}m, time_threshold={}min, gap_threshold={}min, metric={}\n",
        stay_config.distance_threshold,
        stay_config.time_threshold.num_minutes(),
        segmentation.gap_threshold.num_minutes(),
        metric
    );

    let segmenter = TrajectorySegmenter::new("demo", segmentation).with_metric(metric);
    let detector = StayPointDetector::new(stay_config, metric);

    for (i, trajectory) in segmenter.segment(points.into_iter().map(Ok)).enumerate() {
        let trajectory = trajectory.unwrap();
        println!("Trajectory {}: {}", i + 1, trajectory);
        println!("  path length: {:.0}m", trajectory.path_length(metric));

        let mut stay_points = detector.detect(&trajectory);
        for stay_point in stay_points.by_ref() {
            let stay_point = stay_point.unwrap();
            println!("  {}", stay_point);
            println!("    radius: {:.0}m", stay_point.radius(metric));
        }
        let stats = stay_points.stats();
        println!("  {} stay points, {} candidates skipped\n", stats.detected, stats.skipped);
    }
}
