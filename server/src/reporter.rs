//! Periodic summary of newly received tokens
//!
//! The reporter runs as its own task and only reads the snapshots published by
//! the dedup store. It is started once when the server starts running and
//! stopped exactly once during shutdown through [`ReporterHandle::stop`].

use crate::dedup::StatsSnapshot;
use log::{error, info};
use std::fmt;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Deltas since the previous sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub new_unique: u64,
    pub new_duplicates: u64,
    pub unique_total: u64,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Received {} unique numbers, {} duplicates. Unique total: {}",
            self.new_unique, self.new_duplicates, self.unique_total
        )
    }
}

/// Remembers the last sampled snapshot to turn totals into deltas
#[derive(Debug, Default)]
pub struct ReportTracker {
    previous: StatsSnapshot,
    last_report: Option<Report>,
}

impl ReportTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes the deltas since the previous sample and remembers `current`
    ///
    /// Deltas saturate at zero.
    pub fn sample(&mut self, current: StatsSnapshot) -> Report {
        let report = Report {
            new_unique: current.unique.saturating_sub(self.previous.unique),
            new_duplicates: current.duplicates.saturating_sub(self.previous.duplicates),
            unique_total: current.unique,
        };
        self.previous = current;
        self.last_report = Some(report);
        report
    }

    pub fn last_report(&self) -> Option<Report> {
        self.last_report
    }
}

pub struct PeriodicReporter;

impl PeriodicReporter {
    /// Spawns the reporting task; the first report is logged one period after start
    pub fn spawn(stats: watch::Receiver<StatsSnapshot>, period: Duration) -> ReporterHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut tracker = ReportTracker::new();
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            // Skip the first tick since it fires immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let snapshot = *stats.borrow();
                        let report = tracker.sample(snapshot);
                        info!("{}", report);
                    }
                }
            }

            tracker
        });

        ReporterHandle { stop_tx, task }
    }
}

/// Owner of a running reporter task
pub struct ReporterHandle {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<ReportTracker>,
}

impl ReporterHandle {
    /// Stops the task and returns the last report it emitted, if any
    pub async fn stop(self) -> Option<Report> {
        // The task may already be gone if it panicked
        let _ = self.stop_tx.send(());

        match self.task.await {
            Ok(tracker) => tracker.last_report(),
            Err(e) => {
                error!("Reporter task failed: {}", e);
                None
            }
        }
    }
}
