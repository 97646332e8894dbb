//! Periodic scheduling of harvest and retention cycles.
//!
//! The daemon runs two independent loops as tokio tasks: the harvest loop
//! (scan + copy) every `interval_secs`, and the retention sweep once at
//! startup and then at each local midnight. Both are bound to a watch
//! channel so they can be stopped deterministically.

use crate::config::Settings;
use crate::copier::CopyPipeline;
use crate::retention::RetentionSweeper;
use crate::scanner::{effective_floor, hold_floor, RecordScanner};
use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveTime};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time;
use tracing::{error, info};

/// The drover process: both periodic loops plus their shared settings.
pub struct Daemon {
    settings: Arc<Settings>,
}

impl Daemon {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }

    /// Run both loops until `shutdown` flips to true (or its sender drops).
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        let harvest = tokio::spawn(harvest_loop(Arc::clone(&self.settings), shutdown.clone()));
        let sweep = tokio::spawn(sweep_loop(Arc::clone(&self.settings), shutdown));
        let _ = harvest.await;
        let _ = sweep.await;
        info!("daemon stopped");
    }
}

/// One synchronous scan + copy pass over the source tree.
pub fn run_harvest_cycle(settings: &Settings) {
    info!("scanning directory ===> {}", settings.source.display());
    let now = Local::now();
    let floor = effective_floor(settings.since_floor(), hold_floor(now, settings.hold_days));
    let records = RecordScanner::new(floor.into()).scan(&settings.source);
    let pipeline = CopyPipeline::new(
        settings.output.clone(),
        settings.max_workers,
        settings.probe(),
    );
    pipeline.copy_all(records);
}

async fn harvest_loop(settings: Arc<Settings>, mut shutdown: watch::Receiver<bool>) {
    loop {
        let started = Instant::now();
        let cycle_settings = Arc::clone(&settings);
        let cycle = tokio::task::spawn_blocking(move || run_harvest_cycle(&cycle_settings));
        if let Err(err) = cycle.await {
            error!("harvest cycle aborted: {err}");
        }
        info!(
            "harvest cycle finished, elapsed ===> {:.3} s",
            started.elapsed().as_secs_f64()
        );
        tokio::select! {
            _ = time::sleep(Duration::from_secs(settings.interval_secs)) => {}
            _ = shutdown.changed() => return,
        }
    }
}

async fn sweep_loop(settings: Arc<Settings>, mut shutdown: watch::Receiver<bool>) {
    loop {
        let started = Instant::now();
        let cycle_settings = Arc::clone(&settings);
        let cycle = tokio::task::spawn_blocking(move || {
            RetentionSweeper::new(cycle_settings.output.clone(), cycle_settings.hold_days).sweep()
        });
        if let Err(err) = cycle.await {
            error!("retention sweep aborted: {err}");
        }
        info!(
            "retention sweep finished, elapsed ===> {:.3} s",
            started.elapsed().as_secs_f64()
        );
        tokio::select! {
            _ = time::sleep(until_next_midnight(Local::now())) => {}
            _ = shutdown.changed() => return,
        }
    }
}

/// Time left until the next local midnight, when the next sweep fires.
fn until_next_midnight(now: DateTime<Local>) -> Duration {
    let next_day = (now + ChronoDuration::days(1)).date_naive();
    let next = match next_day.and_time(NaiveTime::MIN).and_local_timezone(Local) {
        chrono::LocalResult::Single(t) | chrono::LocalResult::Ambiguous(t, _) => t,
        chrono::LocalResult::None => now + ChronoDuration::days(1),
    };
    (next - now).to_std().unwrap_or(Duration::from_secs(60))
}
