//! File discovery and per-subject grouping.
//!
//! A subject's logs are ordered by their first timestamp and concatenated
//! into one point stream, which is what the segmenter expects.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::reader::PltFile;
use crate::{Error, GeoPoint, Result};

/// Directories containing this marker hold previous output and are skipped.
const OUTPUT_DIR_MARKER: &str = "StayPoint";

/// All GPS logs recorded by one subject.
#[derive(Debug, Clone, Default)]
pub struct Subject {
    id: String,
    logs: Vec<PltFile>,
}

impl Subject {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), logs: Vec::new() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn add_log(&mut self, log: PltFile) {
        self.logs.push(log);
    }

    pub fn logs(&self) -> &[PltFile] {
        &self.logs
    }

    /// Order logs by the time of their first record. Empty logs sort first;
    /// ties keep discovery order.
    pub fn sort_logs_by_start_time(&mut self) {
        self.logs.sort_by_key(|log| log.start_time());
    }

    /// All points of all logs, in log order.
    pub fn points(&self) -> impl Iterator<Item = &GeoPoint> + '_ {
        self.logs.iter().flat_map(|log| log.points().iter())
    }

    pub fn point_count(&self) -> usize {
        self.logs.iter().map(PltFile::len).sum()
    }
}

/// A subject whose logs could not be loaded.
#[derive(Debug)]
pub struct SubjectLoadFailure {
    pub subject_id: String,
    pub error: Error,
}

/// Recursively collect `.plt` files below `root`, sorted by path.
///
/// Directories whose name contains `StayPoint` are not entered.
pub fn discover_plt_files(root: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.as_ref().to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir).map_err(|e| Error::io(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(&dir, e))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| Error::io(&path, e))?;

            if file_type.is_dir() {
                if entry.file_name().to_string_lossy().contains(OUTPUT_DIR_MARKER) {
                    debug!("Skipping output directory {}", path.display());
                    continue;
                }
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("plt")) {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Partition logs by subject id.
pub fn group_by_subject(logs: impl IntoIterator<Item = PltFile>) -> BTreeMap<String, Subject> {
    let mut subjects: BTreeMap<String, Subject> = BTreeMap::new();
    for log in logs {
        subjects
            .entry(log.subject_id().to_string())
            .or_insert_with_key(|id| Subject::new(id.clone()))
            .add_log(log);
    }
    subjects
}

/// Discover, read and group every `.plt` file below `root`.
///
/// Each subject's logs are sorted by start time. A file that fails to read
/// fails its whole subject; the remaining subjects are still returned.
pub fn load_subjects(root: impl AsRef<Path>) -> Result<(Vec<Subject>, Vec<SubjectLoadFailure>)> {
    let root = root.as_ref();
    info!("Locating GPS files in {}", root.display());
    let paths = discover_plt_files(root)?;
    info!("Found {} .plt files", paths.len());

    let mut logs = Vec::with_capacity(paths.len());
    let mut failures: BTreeMap<String, Error> = BTreeMap::new();

    for path in paths {
        let subject_id = crate::reader::subject_id_from_path(&path);
        if failures.contains_key(&subject_id) {
            continue;
        }
        match PltFile::open(&path) {
            Ok(log) => logs.push(log),
            Err(e) => {
                warn!("Subject {} abandoned: {}", subject_id, e);
                failures.insert(subject_id, e);
            }
        }
    }

    let mut subjects: Vec<Subject> = group_by_subject(logs)
        .into_values()
        .filter(|s| !failures.contains_key(s.id()))
        .collect();

    for subject in &mut subjects {
        subject.sort_logs_by_start_time();
        debug!("Subject {}: {} logs, {} points", subject.id(), subject.logs().len(), subject.point_count());
    }

    let failures = failures
        .into_iter()
        .map(|(subject_id, error)| SubjectLoadFailure { subject_id, error })
        .collect();

    Ok((subjects, failures))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::{tempdir, TempDir};

    const HEADER: &str = "Geolife trajectory\nWGS 84\nAltitude is in Feet\nReserved 3\n0,2,255,My Track,0,0,2,8421376\n0\n";

    fn log(path: &str, records: &[&str]) -> PltFile {
        let body = format!("{}{}\n", HEADER, records.join("\n"));
        PltFile::from_reader(Cursor::new(body), path).unwrap()
    }

    fn write_plt(dir: &TempDir, relative: &str, records: &[&str]) {
        let path = dir.path().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, format!("{}{}\n", HEADER, records.join("\n"))).unwrap();
    }

    #[test]
    fn test_group_and_sort_by_start_time() {
        let later = log("Data/000/Trajectory/b.plt", &["39.2,116.2,0,0,0,2008-10-24,08:00:00"]);
        let earlier = log("Data/000/Trajectory/a.plt", &["39.1,116.1,0,0,0,2008-10-23,08:00:00"]);
        let other = log("Data/001/Trajectory/c.plt", &["40.0,116.0,0,0,0,2008-10-23,09:00:00"]);

        let mut subjects = group_by_subject(vec![later, earlier, other]);
        assert_eq!(subjects.len(), 2);

        let subject = subjects.get_mut("000").unwrap();
        assert_eq!(subject.point_count(), 2);
        subject.sort_logs_by_start_time();
        let lats: Vec<f64> = subject.points().map(|p| p.latitude).collect();
        assert_eq!(lats, vec![39.1, 39.2]);
    }

    #[test]
    fn test_discover_skips_output_directories() {
        let dir = tempdir().unwrap();
        write_plt(&dir, "Data/000/Trajectory/a.plt", &[]);
        write_plt(&dir, "Data/001/Trajectory/b.PLT", &[]);
        write_plt(&dir, "Data/000/Trajectory/notes.txt", &[]);
        write_plt(&dir, "StayPoint/000/a.plt", &[]);

        let files = discover_plt_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("Data/000/Trajectory/a.plt"));
        assert!(files[1].ends_with("Data/001/Trajectory/b.PLT"));
    }

    #[test]
    fn test_load_subjects_isolates_malformed_subject() {
        let dir = tempdir().unwrap();
        write_plt(&dir, "Data/000/Trajectory/a.plt", &["39.1,116.1,0,0,0,2008-10-23,08:00:00"]);
        write_plt(&dir, "Data/001/Trajectory/a.plt", &["39.1,116.1,0,0,0,2008-10-23,08:00:00"]);
        write_plt(&dir, "Data/001/Trajectory/b.plt", &["not,a,valid,record"]);

        let (subjects, failures) = load_subjects(dir.path()).unwrap();
        assert_eq!(subjects.len(), 1);
        assert_eq!(subjects[0].id(), "000");
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].subject_id, "001");
        assert!(matches!(failures[0].error, Error::MalformedRecord { line: 7, .. }));
    }

    #[test]
    fn test_discover_missing_root_is_io_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        assert!(matches!(discover_plt_files(missing), Err(Error::Io { .. })));
    }
}
