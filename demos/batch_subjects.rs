//! Example of processing many subjects in parallel.
//!
//! Run with: cargo run --example batch_subjects --features parallel

use chrono::{Duration, TimeZone, Utc};
use staypoint_miner::{group_by_subject, process_subjects_parallel, PipelineConfig, PltFile};
use std::io::Cursor;
use std::time::Instant;

const HEADER: &str = "Geolife trajectory\nWGS 84\nAltitude is in Feet\nReserved 3\n0,2,255,My Track,0,0,2,8421376\n0\n";

fn main() {
    println!("Batch Subject Processing Example\n");

    let places = [
        ("beijing", 39.9843, 116.3186),
        ("shanghai", 31.2304, 121.4737),
        ("hong-kong", 22.3193, 114.1694),
    ];

    let mut logs = Vec::new();
    for (s, (name, lat, lon)) in places.iter().enumerate() {
        for day in 0..3 {
            let path = format!("Data/{:03}/Trajectory/{}-{}.plt", s, name, day);
            let body = synthetic_day(*lat, *lon, day);
            logs.push(PltFile::from_reader(Cursor::new(body), path).unwrap());
        }
    }

    let subjects: Vec<_> = group_by_subject(logs)
        .into_values()
        .map(|mut s| {
            s.sort_logs_by_start_time();
            s
        })
        .collect();

    let config = PipelineConfig::default();
    let start = Instant::now();
    let results = process_subjects_parallel(&subjects, &config);
    let elapsed = start.elapsed();

    for (subject_id, result) in &results {
        match result {
            Ok(report) => {
                println!(
                    "Subject {}: {} points, {} trajectories, {} stay points",
                    subject_id,
                    report.point_count,
                    report.trajectory_count,
                    report.stay_points.len()
                );
                for stay_point in &report.stay_points {
                    println!("  {}", stay_point);
                }
            }
            Err(e) => println!("Subject {}: failed: {}", subject_id, e),
        }
    }

    println!("\nProcessed {} subjects in {:?}", results.len(), elapsed);
}

/// One log per day: an hour near `(lat, lon)` sampled every 5 minutes, then a short walk away.
fn synthetic_day(lat: f64, lon: f64, day: i64) -> String {
    let t0 = Utc.with_ymd_and_hms(2008, 10, 23, 8, 0, 0).unwrap() + Duration::days(day);
    let mut body = String::from(HEADER);
    for i in 0..16 {
        let (dlat, minutes) = if i < 12 {
            (0.00001 * (i % 3) as f64, 5 * i)
        } else {
            (0.002 * (i - 11) as f64, 60 + 2 * (i - 11))
        };
        let t = t0 + Duration::minutes(minutes);
        body.push_str(&format!(
            "{:.6},{:.6},0,0,0,{},{}\n",
            lat + dlat,
            lon,
            t.format("%Y-%m-%d"),
            t.format("%H:%M:%S")
        ));
    }
    body
}
