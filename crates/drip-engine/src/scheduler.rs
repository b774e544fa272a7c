use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use drip_core::current_unix_timestamp_ms;
use drip_store::RunStore;
use tokio::sync::Notify;

use crate::dispatcher::{DispatchOutcome, Dispatcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub poll_interval_ms: u64,
    /// Due runs picked up per poll.
    pub batch_limit: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            batch_limit: 16,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerPollReport {
    pub due: usize,
    pub advanced: usize,
    pub completed: usize,
    pub rate_limited: usize,
    pub deferred_hours: usize,
    pub retries: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub claim_lost: usize,
    pub errors: usize,
}

impl SchedulerPollReport {
    fn is_quiet(&self) -> bool {
        *self == Self::default()
    }
}

/// Polls the run store and feeds due runs to the dispatcher.
pub struct Scheduler {
    dispatcher: Dispatcher,
    runs: Arc<dyn RunStore>,
    config: SchedulerConfig,
    /// Poked by the trigger listener so fresh zero-delay runs fire without
    /// waiting out the poll interval.
    wake: Arc<Notify>,
}

impl Scheduler {
    pub fn new(
        dispatcher: Dispatcher,
        runs: Arc<dyn RunStore>,
        config: SchedulerConfig,
        wake: Arc<Notify>,
    ) -> Self {
        Self {
            dispatcher,
            runs,
            config,
            wake,
        }
    }

    pub async fn run(&self) -> Result<()> {
        loop {
            match self.poll_once(current_unix_timestamp_ms()).await {
                Ok(report) => {
                    if !report.is_quiet() {
                        println!(
                            "dispatch poll: due={} advanced={} completed={} rate_limited={} deferred_hours={} retries={} failed={} cancelled={} claim_lost={} errors={}",
                            report.due,
                            report.advanced,
                            report.completed,
                            report.rate_limited,
                            report.deferred_hours,
                            report.retries,
                            report.failed,
                            report.cancelled,
                            report.claim_lost,
                            report.errors
                        );
                    }
                }
                Err(error) => {
                    eprintln!("dispatch poll error: {error}");
                }
            }

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    println!("scheduler shutdown requested");
                    return Ok(());
                }
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)) => {}
            }
        }
    }

    pub async fn poll_once(&self, now_unix_ms: u64) -> Result<SchedulerPollReport> {
        let mut report = SchedulerPollReport::default();
        let due = self.runs.list_due(now_unix_ms, self.config.batch_limit.max(1));
        report.due = due.len();

        for snapshot in due {
            match self.dispatcher.dispatch_run(&snapshot, now_unix_ms).await {
                Ok(DispatchOutcome::Advanced { .. }) => report.advanced += 1,
                Ok(DispatchOutcome::Completed) => report.completed += 1,
                Ok(DispatchOutcome::RateLimited { .. }) => report.rate_limited += 1,
                Ok(DispatchOutcome::OutsideBusinessHours { .. }) => report.deferred_hours += 1,
                Ok(DispatchOutcome::RetryScheduled { .. }) => report.retries += 1,
                Ok(DispatchOutcome::RunFailed { .. }) => report.failed += 1,
                Ok(DispatchOutcome::RunCancelled { .. }) => report.cancelled += 1,
                Ok(DispatchOutcome::ClaimLost) => report.claim_lost += 1,
                Err(error) => {
                    report.errors += 1;
                    eprintln!(
                        "dispatch failed: run_id={} tenant={} error={error}",
                        snapshot.run_id, snapshot.tenant_id
                    );
                }
            }
        }
        Ok(report)
    }
}
