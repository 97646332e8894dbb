//! Age-based retention sweep of the destination tree.
//!
//! Copied record directories are named `s` + `YYYYMMDD` + the rest of the
//! record name, so their age can be read straight off the name. A sweep
//! deletes every immediate subdirectory of the destination root dated
//! strictly before the cutoff.

use chrono::{DateTime, Duration, Local, NaiveDate};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// One-character prefix ahead of the encoded date.
const DATE_PREFIX: char = 's';

/// Per-sweep totals.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    /// Entries whose names carried a parseable date.
    pub dated: usize,
    pub deleted: usize,
}

/// Calendar cutoff: the day `hold_days` before `now`, truncated to midnight.
/// Entries dated strictly before it are reclaimed.
pub fn retention_cutoff(now: DateTime<Local>, hold_days: u32) -> NaiveDate {
    (now - Duration::days(i64::from(hold_days))).date_naive()
}

/// Parse the fixed-width `YYYYMMDD` date following the prefix of a
/// destination directory name. Non-conforming names yield `None`.
pub fn encoded_date(name: &str) -> Option<NaiveDate> {
    let rest = name.strip_prefix(DATE_PREFIX)?;
    let digits = rest.get(..8)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = digits[..4].parse().ok()?;
    let month: u32 = digits[4..6].parse().ok()?;
    let day: u32 = digits[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Deletes aged record directories under the destination root.
pub struct RetentionSweeper {
    output_root: PathBuf,
    hold_days: u32,
}

impl RetentionSweeper {
    pub fn new(output_root: PathBuf, hold_days: u32) -> Self {
        Self {
            output_root,
            hold_days,
        }
    }

    /// Run one sweep with the cutoff computed from the current time.
    pub fn sweep(&self) -> SweepSummary {
        self.sweep_before(retention_cutoff(Local::now(), self.hold_days))
    }

    /// Delete every immediate dated subdirectory older than `cutoff`.
    ///
    /// Deletion is recursive and best-effort per entry; a failure is logged
    /// and the sweep continues.
    pub fn sweep_before(&self, cutoff: NaiveDate) -> SweepSummary {
        info!(
            "dir => {}, clearing entries dated before {cutoff}",
            self.output_root.display()
        );
        let mut summary = SweepSummary::default();
        let entries = match fs::read_dir(&self.output_root) {
            Ok(entries) => entries,
            Err(err) => {
                error!("cannot read {}: {err}", self.output_root.display());
                return summary;
            }
        };
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("skipping unreadable entry: {err}");
                    continue;
                }
            };
            match entry.file_type() {
                Ok(file_type) if file_type.is_dir() => {}
                Ok(_) => continue,
                Err(err) => {
                    warn!("cannot stat {}: {err}", entry.path().display());
                    continue;
                }
            }
            let name = entry.file_name();
            let date = match name.to_str().and_then(encoded_date) {
                Some(date) => date,
                None => {
                    debug!("{} carries no encoded date, keeping", entry.path().display());
                    continue;
                }
            };
            summary.dated += 1;
            if date >= cutoff {
                continue;
            }
            match fs::remove_dir_all(entry.path()) {
                Ok(()) => {
                    info!("removed directory => {}", entry.path().display());
                    summary.deleted += 1;
                }
                Err(err) => {
                    error!("cannot remove {}: {err}", entry.path().display());
                }
            }
        }
        info!(
            "dir => {}, sweep done, removed => {}",
            self.output_root.display(),
            summary.deleted
        );
        summary
    }
}
