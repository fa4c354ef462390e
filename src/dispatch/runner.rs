//! Polling loop.
//!
//! Drives [`Dispatcher::run_iteration`] from a fixed interval on a single
//! task. Each iteration is awaited before the next tick is taken, so passes
//! never overlap; ticks missed while a slow pass runs are dropped.

use crate::dispatch::{Dispatcher, IterationOutcome};
use crate::error::NotifyError;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Totals for a finished loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    pub iterations: u64,
    pub failures: u64,
}

pub struct PollLoop {
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
    cancel: CancellationToken,
}

impl PollLoop {
    pub fn new(dispatcher: Arc<Dispatcher>, interval: Duration, cancel: CancellationToken) -> Self {
        Self {
            dispatcher,
            interval: interval.max(Duration::from_millis(1)),
            cancel,
        }
    }

    /// Spawn the loop. The first iteration starts immediately.
    pub fn spawn(self) -> tokio::task::JoinHandle<PollStats> {
        tokio::spawn(self.run())
    }

    /// Run until cancelled. An in-flight iteration is allowed to finish.
    pub async fn run(self) -> PollStats {
        info!(interval_secs = self.interval.as_secs(), "poll loop started");
        let mut stats = PollStats::default();
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            stats.iterations += 1;
            match self.dispatcher.run_iteration().await {
                Ok(report) => match report.outcome {
                    IterationOutcome::Skipped => debug!("iteration skipped"),
                    IterationOutcome::EmptyTable | IterationOutcome::SchemaMigrated => {
                        debug!(outcome = ?report.outcome, "iteration finished early");
                    }
                    IterationOutcome::Completed => {
                        debug!(elapsed_ms = report.elapsed.as_millis(), "iteration finished");
                    }
                },
                Err(e @ NotifyError::Config(_)) => {
                    stats.failures += 1;
                    error!(error = %e, "iteration aborted; fix the configuration");
                }
                Err(e) if e.is_transient() => {
                    stats.failures += 1;
                    warn!(error = %e, "iteration failed; retrying next tick");
                }
                Err(e) => {
                    stats.failures += 1;
                    error!(error = %e, "iteration failed");
                }
            }
        }

        info!(
            iterations = stats.iterations,
            failures = stats.failures,
            "poll loop stopped"
        );
        stats
    }
}
