//! Write-stability probing for record directories.
//!
//! Producers drop multi-file records over a window of time, so a directory
//! is only safe to copy once it has stopped changing. The probe polls the
//! directory's own mtime, every contained file's mtime, and the recursive
//! size total; any of them moving forward means a writer is still active.

use std::path::Path;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Outcome of one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The directory changed while being watched; do not copy this cycle.
    Writing,
    /// A full quiet window elapsed with no observed change.
    Quiet,
}

/// Polling probe that blocks its caller until a verdict is reached.
#[derive(Debug, Clone)]
pub struct DirProbe {
    sample_interval: Duration,
    quiet_window: Duration,
    max_wait: Duration,
}

enum Sample {
    /// Some file's mtime moved past the probe start.
    Changed,
    /// Recursive size total of all contained files.
    Total(u64),
}

impl DirProbe {
    pub fn new(sample_interval: Duration, quiet_window: Duration, max_wait: Duration) -> Self {
        Self {
            sample_interval,
            quiet_window,
            max_wait,
        }
    }

    /// Watch `dir` until it is judged quiet or seen changing.
    ///
    /// Sampling failures are logged and skipped; they never decide the
    /// verdict on their own. `max_wait` bounds the total polling time, and
    /// exceeding it counts as `Writing` so the record is retried next cycle.
    pub fn wait_until_quiet(&self, dir: &Path) -> Verdict {
        let started_wall = SystemTime::now();
        let started = Instant::now();
        let mut prev_total: Option<u64> = None;
        loop {
            std::thread::sleep(self.sample_interval);
            debug!("checking directory {}", dir.display());

            // checked before sampling so a persistently failing stat cannot
            // keep the probe alive past its bound
            if started.elapsed() >= self.max_wait {
                warn!(
                    "directory {} still unsettled after {:?}, giving up until next cycle",
                    dir.display(),
                    self.max_wait
                );
                return Verdict::Writing;
            }

            match std::fs::metadata(dir) {
                Ok(metadata) => match metadata.modified() {
                    Ok(modified) if modified > started_wall => {
                        info!(
                            "directory {} is being written, mtime moved forward",
                            dir.display()
                        );
                        return Verdict::Writing;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!("no modification time for {}: {err}", dir.display());
                        continue;
                    }
                },
                Err(err) => {
                    warn!("cannot stat {}: {err}", dir.display());
                    continue;
                }
            }

            match self.sample(dir, started_wall) {
                Sample::Changed => return Verdict::Writing,
                Sample::Total(total) => {
                    if prev_total.is_some_and(|prev| total > prev) {
                        info!(
                            "directory {} is being written, size grew {} => {}",
                            dir.display(),
                            prev_total.unwrap_or(0),
                            total
                        );
                        return Verdict::Writing;
                    }
                    prev_total = Some(total);
                }
            }

            if started.elapsed() >= self.quiet_window {
                debug!(
                    "directory {} unchanged for {:?}, safe to copy",
                    dir.display(),
                    self.quiet_window
                );
                return Verdict::Quiet;
            }
        }
    }

    fn sample(&self, dir: &Path, started: SystemTime) -> Sample {
        let mut total = 0u64;
        for entry in WalkDir::new(dir) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("skipping unreadable entry under {}: {err}", dir.display());
                    continue;
                }
            };
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(err) => {
                    warn!("cannot stat {}: {err}", entry.path().display());
                    continue;
                }
            };
            if let Ok(modified) = metadata.modified() {
                if modified > started {
                    info!("file {} is being written", entry.path().display());
                    return Sample::Changed;
                }
            }
            if metadata.is_file() {
                total += metadata.len();
            }
        }
        Sample::Total(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use std::fs;
    use std::io::Write;
    use std::time::SystemTime;
    use tempfile::TempDir;

    fn probe(sample_ms: u64, quiet_ms: u64, max_ms: u64) -> DirProbe {
        DirProbe::new(
            Duration::from_millis(sample_ms),
            Duration::from_millis(quiet_ms),
            Duration::from_millis(max_ms),
        )
    }

    /// Push every mtime safely into the past so fresh fixtures do not look
    /// like active writers.
    fn age_tree(dir: &Path) {
        let old = FileTime::from_unix_time(1_000_000, 0);
        for entry in WalkDir::new(dir) {
            let entry = entry.unwrap();
            set_file_mtime(entry.path(), old).unwrap();
        }
    }

    #[test]
    fn unchanged_directory_is_quiet() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.dat"), b"payload").unwrap();
        age_tree(dir.path());

        let verdict = probe(10, 50, 1_000).wait_until_quiet(dir.path());
        assert_eq!(verdict, Verdict::Quiet);
    }

    #[test]
    fn file_modified_after_probe_start_means_writing() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.dat");
        fs::write(&file, b"payload").unwrap();
        age_tree(dir.path());

        // an mtime in the future is always newer than the probe start
        let future = SystemTime::now() + Duration::from_secs(3600);
        set_file_mtime(&file, FileTime::from_system_time(future)).unwrap();

        let verdict = probe(10, 200, 1_000).wait_until_quiet(dir.path());
        assert_eq!(verdict, Verdict::Writing);
    }

    #[test]
    fn growing_directory_means_writing() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.dat");
        fs::write(&file, b"start").unwrap();
        age_tree(dir.path());

        let writer_path = file.clone();
        let writer = std::thread::spawn(move || {
            let old = FileTime::from_unix_time(1_000_000, 0);
            for _ in 0..40 {
                let mut handle = fs::OpenOptions::new()
                    .append(true)
                    .open(&writer_path)
                    .unwrap();
                handle.write_all(&[b'x'; 64]).unwrap();
                drop(handle);
                // keep mtimes old so only size growth can trip the probe
                set_file_mtime(&writer_path, old).unwrap();
                std::thread::sleep(Duration::from_millis(10));
            }
        });

        let verdict = probe(20, 2_000, 5_000).wait_until_quiet(dir.path());
        writer.join().unwrap();
        assert_eq!(verdict, Verdict::Writing);
    }

    #[test]
    fn exceeding_max_wait_means_writing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.dat"), b"payload").unwrap();
        age_tree(dir.path());

        // quiet window far beyond max wait, so the bound has to fire
        let verdict = probe(10, 60_000, 100).wait_until_quiet(dir.path());
        assert_eq!(verdict, Verdict::Writing);
    }
}
