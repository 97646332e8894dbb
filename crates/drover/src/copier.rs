//! Bounded-concurrency copy pipeline with idempotent per-file skip.
//!
//! One cycle turns the scanner's record map into jobs on a bounded queue,
//! runs them on `min(max_workers, jobs)` workers, and drains exactly one
//! result per job. Every step is blocking filesystem I/O, so the pipeline
//! is synchronous; the runtime shells a whole cycle into a blocking task.

use crate::error::{DroverError, Result};
use crate::paths;
use crate::scanner::{Candidate, RecordMap};
use crate::stability::{DirProbe, Verdict};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread;
use tracing::{debug, error, info, warn};

/// One unit of copy work; immutable once enqueued.
#[derive(Debug, Clone)]
pub struct CopyJob {
    /// The record's `P` directory (the scan group key).
    pub group_dir: PathBuf,
    /// The primary file chosen for that directory.
    pub candidate: Candidate,
}

/// Per-cycle copy totals.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    pub attempted: usize,
    pub succeeded: usize,
    /// Bytes actually written; an all-skip cycle copies nothing.
    pub bytes_copied: u64,
}

struct JobOutcome {
    ok: bool,
    bytes: u64,
}

/// Copies eligible records into the destination tree.
pub struct CopyPipeline {
    output_root: PathBuf,
    max_workers: usize,
    probe: DirProbe,
}

impl CopyPipeline {
    pub fn new(output_root: PathBuf, max_workers: usize, probe: DirProbe) -> Self {
        Self {
            output_root,
            max_workers,
            probe,
        }
    }

    /// Copy every record in `records`, four sibling files each.
    ///
    /// Job failures are logged and counted; they never abort sibling jobs
    /// or the pool.
    pub fn copy_all(&self, records: RecordMap) -> CycleSummary {
        let total = records.len();
        if total == 0 {
            info!("records to copy ===> 0");
            return CycleSummary::default();
        }
        let workers = self.max_workers.min(total);
        info!("records to copy ===> {total}, workers ===> {workers}");

        // both queues sized to the job count, so sends never block and the
        // drain below sees exactly one outcome per job
        let (job_tx, job_rx) = mpsc::sync_channel::<CopyJob>(total);
        let (outcome_tx, outcome_rx) = mpsc::sync_channel::<JobOutcome>(total);
        for (group_dir, candidate) in records {
            if job_tx
                .send(CopyJob {
                    group_dir,
                    candidate,
                })
                .is_err()
            {
                break;
            }
        }
        drop(job_tx);

        let job_rx = Mutex::new(job_rx);
        let summary = thread::scope(|scope| {
            for worker_id in 0..workers {
                let job_rx = &job_rx;
                let outcome_tx = outcome_tx.clone();
                scope.spawn(move || loop {
                    let job = {
                        let queue = match job_rx.lock() {
                            Ok(queue) => queue,
                            Err(_) => break,
                        };
                        match queue.recv() {
                            Ok(job) => job,
                            Err(_) => break,
                        }
                    };
                    let outcome = match self.run_job(worker_id, &job) {
                        Ok(bytes) => JobOutcome { ok: true, bytes },
                        Err(err @ DroverError::StillWriting(_)) => {
                            warn!("worker {worker_id}: {err}");
                            JobOutcome { ok: false, bytes: 0 }
                        }
                        Err(err) => {
                            error!(
                                "worker {worker_id}: record {} failed: {err}",
                                job.group_dir.display()
                            );
                            JobOutcome { ok: false, bytes: 0 }
                        }
                    };
                    if outcome_tx.send(outcome).is_err() {
                        break;
                    }
                });
            }
            drop(outcome_tx);

            let mut summary = CycleSummary {
                attempted: total,
                ..CycleSummary::default()
            };
            for _ in 0..total {
                match outcome_rx.recv() {
                    Ok(outcome) => {
                        if outcome.ok {
                            summary.succeeded += 1;
                        }
                        summary.bytes_copied += outcome.bytes;
                    }
                    Err(_) => break,
                }
            }
            summary
        });

        info!(
            "records to copy ===> {}, copied ===> {}",
            summary.attempted, summary.succeeded
        );
        summary
    }

    /// Copy one record's four sibling files, in fixed order: metadata XML,
    /// raw-data-record XML, primary data, header. The first failure aborts
    /// the remaining siblings for this job only.
    fn run_job(&self, worker_id: usize, job: &CopyJob) -> Result<u64> {
        if self.probe.wait_until_quiet(&job.group_dir) == Verdict::Writing {
            return Err(DroverError::StillWriting(job.group_dir.clone()));
        }
        let name =
            paths::record_name(&job.candidate.file_name, paths::RECORD_PREFIX, paths::DATA_SUFFIX)
                .ok_or_else(|| DroverError::BadRecordName(job.candidate.file_name.clone()))?;
        let metadata_dir = paths::metadata_dir(&job.group_dir, name)
            .ok_or_else(|| DroverError::NoBranchRoot(job.group_dir.clone()))?;

        let dest_dir = self.output_root.join(name);
        fs::create_dir_all(&dest_dir)?;

        let pairs = [
            (
                metadata_dir.join(paths::metadata_xml_name(name)),
                dest_dir.join(paths::metadata_xml_name(name)),
            ),
            (
                metadata_dir.join(paths::RAW_DATA_RECORD_XML),
                dest_dir.join(paths::RAW_DATA_RECORD_XML),
            ),
            (
                job.group_dir.join(&job.candidate.file_name),
                dest_dir.join(paths::data_file_name(name)),
            ),
            (
                job.group_dir.join(paths::header_file_name(name)),
                dest_dir.join(paths::header_file_name(name)),
            ),
        ];
        let mut bytes = 0;
        for (src, dst) in &pairs {
            bytes += self.copy_if_absent(worker_id, src, dst)?;
        }
        Ok(bytes)
    }

    /// Idempotent per-file copy: a missing source is a no-op success (some
    /// siblings are legitimately absent) and an existing destination is an
    /// already-done success. Copy is creation-only; nothing is overwritten.
    fn copy_if_absent(&self, worker_id: usize, src: &Path, dst: &Path) -> Result<u64> {
        if !src.exists() {
            info!("worker {worker_id}: {} absent, nothing to copy", src.display());
            return Ok(0);
        }
        if dst.exists() {
            debug!("worker {worker_id}: {} already copied", dst.display());
            return Ok(0);
        }
        match fs::copy(src, dst) {
            Ok(size) => {
                info!(
                    "worker {worker_id}: copied {} ===> {}, ~{} KB",
                    src.display(),
                    dst.display(),
                    size / 1024
                );
                Ok(size)
            }
            Err(err) => Err(DroverError::Copy {
                src: src.to_path_buf(),
                source: err,
            }),
        }
    }
}
