//! CSV stay point sink.
//!
//! One row per stay point: centroid latitude and longitude, then arrival and
//! departure as Unix epoch seconds.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use log::info;

use crate::staypoint::StayPoint;
use crate::{Error, Result};

/// Column names of the exported table.
pub const CSV_HEADER: [&str; 4] = ["latitude", "longitude", "arrival_time", "departure_time"];

/// Write stay points as CSV, header first.
///
/// # Example
/// ```
/// use staypoint_miner::write_stay_points_csv;
///
/// let mut out = Vec::new();
/// write_stay_points_csv(&mut out, &[]).unwrap();
/// assert_eq!(String::from_utf8(out).unwrap(), "latitude,longitude,arrival_time,departure_time\n");
/// ```
pub fn write_stay_points_csv<W: Write>(writer: W, stay_points: &[StayPoint]) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(CSV_HEADER)?;

    for stay_point in stay_points {
        csv.write_record([
            stay_point.latitude().to_string(),
            stay_point.longitude().to_string(),
            stay_point.arrival_epoch().to_string(),
            stay_point.departure_epoch().to_string(),
        ])?;
    }

    csv.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Write stay points to a CSV file, creating parent directories as needed.
pub fn save_stay_points_csv(path: impl AsRef<Path>, stay_points: &[StayPoint]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    write_stay_points_csv(file, stay_points)?;
    info!("Saved {} stay points to {}", stay_points.len(), path.display());
    Ok(())
}
