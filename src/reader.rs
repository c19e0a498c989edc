//! GeoLife `.plt` record source.
//!
//! A `.plt` file starts with six header lines, followed by one record per line:
//!
//! ```text
//! 39.984702,116.318417,0,492,39744.1201851852,2008-10-23,02:53:04
//! ```
//!
//! Only latitude (field 0), longitude (field 1), date (second to last field)
//! and time (last field) are used. Timestamps carry no zone and are read as UTC.
//! A record that cannot be parsed is reported as [`Error::MalformedRecord`];
//! nothing is skipped silently.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::{Error, GeoPoint, Result};

/// Header/metadata lines preceding the first record.
pub const HEADER_LINES: usize = 6;

const LATITUDE_INDEX: usize = 0;
const LONGITUDE_INDEX: usize = 1;
const MIN_FIELDS: usize = 4;

/// Parse one data line into a point. The error is a human-readable reason.
pub fn parse_record(line: &str) -> std::result::Result<GeoPoint, String> {
    let fields: Vec<&str> = line.trim_end().split(',').map(str::trim).collect();
    if fields.len() < MIN_FIELDS {
        return Err(format!("expected at least {} fields, found {}", MIN_FIELDS, fields.len()));
    }

    let latitude: f64 = fields[LATITUDE_INDEX]
        .parse()
        .map_err(|_| format!("non-numeric latitude '{}'", fields[LATITUDE_INDEX]))?;
    let longitude: f64 = fields[LONGITUDE_INDEX]
        .parse()
        .map_err(|_| format!("non-numeric longitude '{}'", fields[LONGITUDE_INDEX]))?;

    let date_field = fields[fields.len() - 2];
    let time_field = fields[fields.len() - 1];
    let date = NaiveDate::parse_from_str(date_field, "%Y-%m-%d")
        .map_err(|e| format!("unparseable date '{}': {}", date_field, e))?;
    let time = NaiveTime::parse_from_str(time_field, "%H:%M:%S")
        .map_err(|e| format!("unparseable time '{}': {}", time_field, e))?;
    let timestamp = NaiveDateTime::new(date, time).and_utc();

    let point = GeoPoint::new(latitude, longitude, timestamp);
    if !point.is_valid() {
        return Err(format!("coordinate out of range ({}, {})", latitude, longitude));
    }
    Ok(point)
}

/// Lazy iterator over the records of a `.plt` stream.
///
/// Skips the header and blank lines. Yields the first error it meets and
/// then stops. A data line that is not valid UTF-8 is a malformed record.
pub struct PltRecords<R> {
    reader: R,
    buf: Vec<u8>,
    path: PathBuf,
    line_no: usize,
    failed: bool,
}

impl<R: BufRead> PltRecords<R> {
    /// `path` is only used to label errors.
    pub fn new(reader: R, path: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            path: path.into(),
            line_no: 0,
            failed: false,
        }
    }
}

impl PltRecords<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        Ok(Self::new(BufReader::new(file), path))
    }
}

impl<R: BufRead> Iterator for PltRecords<R> {
    type Item = Result<GeoPoint>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => self.line_no += 1,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(Error::io(&self.path, e)));
                }
            }

            if self.line_no <= HEADER_LINES {
                continue;
            }

            let parsed = match std::str::from_utf8(&self.buf) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => parse_record(line),
                Err(e) => Err(format!("invalid UTF-8: {}", e)),
            };

            return match parsed {
                Ok(point) => Some(Ok(point)),
                Err(reason) => {
                    self.failed = true;
                    Some(Err(Error::malformed(&self.path, self.line_no, reason)))
                }
            };
        }
    }
}

/// A fully read `.plt` file.
#[derive(Debug, Clone)]
pub struct PltFile {
    path: PathBuf,
    subject_id: String,
    points: Vec<GeoPoint>,
}

impl PltFile {
    /// Read and parse a `.plt` file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let points = PltRecords::open(path)?.collect::<Result<Vec<_>>>()?;
        Ok(Self::from_points(path, points))
    }

    /// Parse a `.plt` stream; `path` determines the subject id.
    pub fn from_reader<R: BufRead>(reader: R, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let points = PltRecords::new(reader, path).collect::<Result<Vec<_>>>()?;
        Ok(Self::from_points(path, points))
    }

    fn from_points(path: &Path, points: Vec<GeoPoint>) -> Self {
        Self {
            path: path.to_path_buf(),
            subject_id: subject_id_from_path(path),
            points,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Timestamp of the first record.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.points.first().map(|p| p.timestamp)
    }
}

/// Subject identifier for a GeoLife path.
///
/// GeoLife stores logs as `Data/<subject>/Trajectory/<file>.plt`; the
/// directory above `Trajectory` is the subject. Other layouts use the
/// file's parent directory name.
pub fn subject_id_from_path(path: &Path) -> String {
    let parent = path.parent();
    let dir = match parent.and_then(Path::file_name) {
        Some(name) if name.eq_ignore_ascii_case("trajectory") => parent.and_then(Path::parent),
        _ => parent,
    };

    dir.and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Cursor;

    const HEADER: &str = "Geolife trajectory\nWGS 84\nAltitude is in Feet\nReserved 3\n0,2,255,My Track,0,0,2,8421376\n0\n";

    fn plt(body: &str) -> Cursor<String> {
        Cursor::new(format!("{}{}", HEADER, body))
    }

    #[test]
    fn test_parse_record() {
        let p = parse_record("39.984702,116.318417,0,492,39744.1201851852,2008-10-23,02:53:04").unwrap();
        assert_eq!(p.latitude, 39.984702);
        assert_eq!(p.longitude, 116.318417);
        assert_eq!(p.timestamp, Utc.with_ymd_and_hms(2008, 10, 23, 2, 53, 4).unwrap());
    }

    #[test]
    fn test_parse_record_trailing_carriage_return() {
        let p = parse_record("39.9,116.3,0,492,39744.12,2008-10-23,02:53:04\r").unwrap();
        assert_eq!(p.timestamp, Utc.with_ymd_and_hms(2008, 10, 23, 2, 53, 4).unwrap());
    }

    #[test]
    fn test_parse_record_errors() {
        assert!(parse_record("39.9,116.3,2008-10-23").unwrap_err().contains("fields"));
        assert!(parse_record("abc,116.3,0,2008-10-23,02:53:04").unwrap_err().contains("latitude"));
        assert!(parse_record("39.9,x,0,2008-10-23,02:53:04").unwrap_err().contains("longitude"));
        assert!(parse_record("39.9,116.3,0,2008-13-45,02:53:04").unwrap_err().contains("date"));
        assert!(parse_record("39.9,116.3,0,2008-10-23,25:99").unwrap_err().contains("time"));
        assert!(parse_record("99.9,116.3,0,2008-10-23,02:53:04").unwrap_err().contains("range"));
    }

    #[test]
    fn test_records_skip_header_and_blank_lines() {
        let body = "39.1,116.1,0,0,0,2008-10-23,02:53:04\n\n39.2,116.2,0,0,0,2008-10-23,02:53:09\n";
        let points: Vec<GeoPoint> = PltRecords::new(plt(body), "x.plt").collect::<Result<_>>().unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].latitude, 39.2);
    }

    #[test]
    fn test_invalid_utf8_record_reports_line() {
        let mut bytes = HEADER.as_bytes().to_vec();
        bytes.extend_from_slice(b"39.1,116.1,0,0,0,2008-10-23,02:53:04\n39.2,116.\xff,0,0,0,2008-10-23,02:53:09\n");
        let mut records = PltRecords::new(Cursor::new(bytes), "Data/000/Trajectory/a.plt");

        assert!(records.next().unwrap().is_ok());
        match records.next() {
            Some(Err(Error::MalformedRecord { line, reason, .. })) => {
                assert_eq!(line, 8);
                assert!(reason.contains("UTF-8"));
            }
            other => panic!("expected malformed record, got {:?}", other),
        }
        assert!(records.next().is_none());
    }

    #[test]
    fn test_non_utf8_header_is_skipped() {
        let mut bytes = b"Geolife \xe9\n".to_vec();
        bytes.extend_from_slice(b"WGS 84\nAltitude is in Feet\nReserved 3\n0,2,255,My Track,0,0,2,8421376\n0\n");
        bytes.extend_from_slice(b"39.1,116.1,0,0,0,2008-10-23,02:53:04\r\n");
        let points: Vec<GeoPoint> = PltRecords::new(Cursor::new(bytes), "x.plt").collect::<Result<_>>().unwrap();
        assert_eq!(points.len(), 1);
    }

    #[test]
    fn test_header_only_file_is_empty() {
        let file = PltFile::from_reader(plt(""), "Data/000/Trajectory/a.plt").unwrap();
        assert!(file.is_empty());
        assert!(file.start_time().is_none());
    }

    #[test]
    fn test_malformed_record_reports_line() {
        let body = "39.1,116.1,0,0,0,2008-10-23,02:53:04\n39.2,oops,0,0,0,2008-10-23,02:53:09\n39.3,116.3,0,0,0,2008-10-23,02:53:14\n";
        let mut records = PltRecords::new(plt(body), "Data/000/Trajectory/a.plt");
        assert!(records.next().unwrap().is_ok());
        match records.next() {
            Some(Err(Error::MalformedRecord { line, path, .. })) => {
                assert_eq!(line, 8);
                assert!(path.ends_with("a.plt"));
            }
            other => panic!("expected malformed record, got {:?}", other),
        }
        assert!(records.next().is_none());
    }

    #[test]
    fn test_plt_file_from_reader() {
        let body = "39.1,116.1,0,0,0,2008-10-23,02:53:04\n39.2,116.2,0,0,0,2008-10-23,02:53:09\n";
        let file = PltFile::from_reader(plt(body), "Data/017/Trajectory/20081023025304.plt").unwrap();
        assert_eq!(file.subject_id(), "017");
        assert_eq!(file.len(), 2);
        assert_eq!(file.start_time(), Some(Utc.with_ymd_and_hms(2008, 10, 23, 2, 53, 4).unwrap()));
    }

    #[test]
    fn test_subject_id_from_path() {
        assert_eq!(subject_id_from_path(Path::new("Data/000/Trajectory/a.plt")), "000");
        assert_eq!(subject_id_from_path(Path::new("logs/alice/a.plt")), "alice");
        assert_eq!(subject_id_from_path(Path::new("a.plt")), "");
    }
}
