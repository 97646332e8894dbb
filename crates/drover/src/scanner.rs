//! Source-tree discovery of copy-eligible capture records.
//!
//! A scan walks the source root and keeps, per record directory, the single
//! best candidate primary file: the largest one whose siblings are all in
//! place. The resulting mapping is a per-cycle value handed to the copy
//! pipeline; nothing survives between cycles.

use crate::paths;
use chrono::{DateTime, Duration, Local, NaiveTime};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// One candidate primary file chosen for a record directory.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// File name of the chosen primary, e.g. `Prep_s2018102922221914708.dat`.
    pub file_name: String,
    pub size: u64,
    pub modified: SystemTime,
}

/// Group key (the record's `P` directory) to its chosen candidate.
pub type RecordMap = HashMap<PathBuf, Candidate>;

/// Midnight at the start of the day `hold_days` ago, local time. The scan
/// floor never drops below this, so files the sweeper would reclaim are
/// never picked up again.
pub fn hold_floor(now: DateTime<Local>, hold_days: u32) -> DateTime<Local> {
    let day = (now - Duration::days(i64::from(hold_days))).date_naive();
    match day.and_time(NaiveTime::MIN).and_local_timezone(Local) {
        chrono::LocalResult::Single(t) | chrono::LocalResult::Ambiguous(t, _) => t,
        chrono::LocalResult::None => now - Duration::days(i64::from(hold_days)),
    }
}

/// Effective scan floor: the later of the operator-supplied `since` and the
/// retention hold floor.
pub fn effective_floor(since: Option<DateTime<Local>>, hold: DateTime<Local>) -> DateTime<Local> {
    match since {
        Some(since) => since.max(hold),
        None => hold,
    }
}

/// Walks a source tree and collects eligible records.
pub struct RecordScanner {
    floor: SystemTime,
}

impl RecordScanner {
    pub fn new(floor: SystemTime) -> Self {
        Self { floor }
    }

    /// Collect the best candidate per record directory under `root`.
    ///
    /// Per-entry failures are logged and treated as "no record"; the scan
    /// always returns whatever it collected.
    pub fn scan(&self, root: &Path) -> RecordMap {
        let mut records = RecordMap::new();
        for entry in WalkDir::new(root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("skipping unreadable entry: {err}");
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                continue;
            }
            if let Some(candidate) = self.inspect(entry.path()) {
                let parent = match entry.path().parent() {
                    Some(parent) => parent.to_path_buf(),
                    None => continue,
                };
                match records.entry(parent) {
                    Entry::Vacant(slot) => {
                        slot.insert(candidate);
                    }
                    Entry::Occupied(mut slot) => {
                        // ties keep the first candidate seen
                        if slot.get().size < candidate.size {
                            slot.insert(candidate);
                        }
                    }
                }
            }
        }
        records
    }

    /// Apply the eligibility chain to one file; `None` means skip.
    fn inspect(&self, path: &Path) -> Option<Candidate> {
        if !paths::is_under_marker(path, paths::PRIMARY_MARKER) {
            return None;
        }
        let metadata = match path.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!("cannot stat {}: {err}", path.display());
                return None;
            }
        };
        let modified = match metadata.modified() {
            Ok(modified) => modified,
            Err(err) => {
                warn!("no modification time for {}: {err}", path.display());
                return None;
            }
        };
        if modified < self.floor {
            return None;
        }
        let file_name = path.file_name()?.to_str()?;
        let name = paths::record_name(file_name, paths::RECORD_PREFIX, paths::DATA_SUFFIX)?;
        let parent = path.parent()?;

        let header = parent.join(paths::header_file_name(name));
        if !header.is_file() {
            warn!("{} missing, skipping {}", header.display(), path.display());
            return None;
        }
        let metadata_xml = paths::metadata_dir(parent, name)?.join(paths::metadata_xml_name(name));
        if !metadata_xml.is_file() {
            warn!("{} missing, skipping {}", metadata_xml.display(), path.display());
            return None;
        }

        debug!(
            "candidate {} ({} bytes) in {}",
            file_name,
            metadata.len(),
            parent.display()
        );
        Some(Candidate {
            file_name: file_name.to_string(),
            size: metadata.len(),
            modified,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use filetime::{set_file_mtime, FileTime};
    use std::fs;
    use tempfile::TempDir;

    const EPOCH: SystemTime = SystemTime::UNIX_EPOCH;

    /// Lay out one record: `<root>/<unit>/P/Prep_<name>.dat` + `.hdr` and
    /// `<root>/<unit>/M/<name>/<name>.xml`.
    fn make_record(root: &Path, unit: &str, name: &str, data_len: usize) -> PathBuf {
        let primary_dir = root.join(unit).join("P");
        fs::create_dir_all(&primary_dir).unwrap();
        fs::write(
            primary_dir.join(format!("Prep_{name}.dat")),
            vec![b'x'; data_len],
        )
        .unwrap();
        fs::write(primary_dir.join(format!("Prep_{name}.hdr")), b"hdr").unwrap();
        let metadata_dir = root.join(unit).join("M").join(name);
        fs::create_dir_all(&metadata_dir).unwrap();
        fs::write(metadata_dir.join(format!("{name}.xml")), b"<record/>").unwrap();
        primary_dir
    }

    #[test]
    fn discovers_a_complete_record() {
        let root = TempDir::new().unwrap();
        let primary_dir = make_record(root.path(), "u1", "s20230101120000", 10);

        let records = RecordScanner::new(EPOCH).scan(root.path());
        assert_eq!(records.len(), 1);
        let candidate = &records[&primary_dir];
        assert_eq!(candidate.file_name, "Prep_s20230101120000.dat");
        assert_eq!(candidate.size, 10);
    }

    #[test]
    fn skips_records_outside_the_primary_branch() {
        let root = TempDir::new().unwrap();
        let primary_dir = root.path().join("u1").join("Q");
        fs::create_dir_all(&primary_dir).unwrap();
        fs::write(primary_dir.join("Prep_s1.dat"), b"data").unwrap();
        fs::write(primary_dir.join("Prep_s1.hdr"), b"hdr").unwrap();

        assert!(RecordScanner::new(EPOCH).scan(root.path()).is_empty());
    }

    #[test]
    fn skips_records_missing_the_header_sibling() {
        let root = TempDir::new().unwrap();
        make_record(root.path(), "u1", "s1", 4);
        fs::remove_file(root.path().join("u1/P/Prep_s1.hdr")).unwrap();

        assert!(RecordScanner::new(EPOCH).scan(root.path()).is_empty());
    }

    #[test]
    fn skips_records_missing_the_metadata_xml() {
        let root = TempDir::new().unwrap();
        make_record(root.path(), "u1", "s1", 4);
        fs::remove_file(root.path().join("u1/M/s1/s1.xml")).unwrap();

        assert!(RecordScanner::new(EPOCH).scan(root.path()).is_empty());
    }

    #[test]
    fn skips_files_older_than_the_floor() {
        let root = TempDir::new().unwrap();
        let primary_dir = make_record(root.path(), "u1", "s1", 4);
        set_file_mtime(
            primary_dir.join("Prep_s1.dat"),
            FileTime::from_unix_time(1_000_000, 0),
        )
        .unwrap();

        let records = RecordScanner::new(SystemTime::now()).scan(root.path());
        assert!(records.is_empty());
    }

    #[test]
    fn keeps_the_largest_candidate_per_directory() {
        let root = TempDir::new().unwrap();
        let primary_dir = make_record(root.path(), "u1", "small", 5);
        make_record(root.path(), "u1", "large", 50);

        let records = RecordScanner::new(EPOCH).scan(root.path());
        assert_eq!(records.len(), 1);
        assert_eq!(records[&primary_dir].file_name, "Prep_large.dat");
        assert_eq!(records[&primary_dir].size, 50);
    }

    #[test]
    fn effective_floor_never_drops_below_the_hold_cutoff() {
        let hold = Local.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let early = Local.with_ymd_and_hms(2022, 6, 1, 0, 0, 0).unwrap();
        let late = Local.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();

        assert_eq!(effective_floor(None, hold), hold);
        assert_eq!(effective_floor(Some(early), hold), hold);
        assert_eq!(effective_floor(Some(late), hold), late);
    }

    #[test]
    fn hold_floor_is_midnight_truncated() {
        let now = Local.with_ymd_and_hms(2023, 1, 31, 15, 30, 45).unwrap();
        let floor = hold_floor(now, 30);
        assert_eq!(floor.naive_local().to_string(), "2023-01-01 00:00:00");
    }
}
