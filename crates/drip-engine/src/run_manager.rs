use std::sync::Arc;

use drip_contract::{
    BusinessHoursConfig, RunStatus, SequenceDefinition, SequenceRun, SequenceStep, TenantConfig,
};
use drip_core::{generate_id, hours_to_ms};
use drip_store::{RunStore, RunStoreError};
use thiserror::Error;

use crate::business_hours::ResolvedBusinessHours;

#[derive(Debug, Error)]
pub enum RunStartError {
    /// Benign: the lead is already inside this sequence.
    #[error("lead '{lead_id}' already has an active run of sequence '{sequence_id}'")]
    Conflict { lead_id: String, sequence_id: String },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Computes when a step should fire, measured from `from_unix_ms`.
///
/// The delay lands first; gated steps are then snapped forward into the
/// tenant's business hours.
pub fn compute_step_fire_at(
    step: &SequenceStep,
    business_hours: &BusinessHoursConfig,
    from_unix_ms: u64,
) -> anyhow::Result<u64> {
    let after_delay = from_unix_ms.saturating_add(hours_to_ms(step.delay_hours));
    if !step.business_hours_only {
        return Ok(after_delay);
    }
    ResolvedBusinessHours::resolve(business_hours)?.snap_forward(after_delay)
}

/// Lifecycle operations on sequence runs.
#[derive(Clone)]
pub struct RunManager {
    runs: Arc<dyn RunStore>,
}

impl RunManager {
    pub fn new(runs: Arc<dyn RunStore>) -> Self {
        Self { runs }
    }

    /// Starts a run at the sequence's first step. At most one active run per
    /// (lead, sequence) pair; a second start reports `Conflict` and leaves
    /// the existing run untouched.
    pub fn start_run(
        &self,
        sequence: &SequenceDefinition,
        tenant: &TenantConfig,
        lead_id: &str,
        now_unix_ms: u64,
    ) -> Result<SequenceRun, RunStartError> {
        let first_step = sequence
            .step_at(0)
            .ok_or_else(|| anyhow::anyhow!("sequence '{}' has no steps", sequence.sequence_id))?;
        let next_fire_at =
            compute_step_fire_at(first_step, &tenant.business_hours, now_unix_ms)?;
        let seed = format!(
            "{}:{}:{}",
            sequence.tenant_id, lead_id, sequence.sequence_id
        );
        let run = SequenceRun {
            run_id: generate_id("run", now_unix_ms, &seed),
            tenant_id: sequence.tenant_id.clone(),
            lead_id: lead_id.to_string(),
            sequence_id: sequence.sequence_id.clone(),
            current_step_index: 0,
            next_fire_at_unix_ms: Some(next_fire_at),
            status: RunStatus::Active,
            step_attempts: 0,
            version: 1,
            status_reason: None,
            created_unix_ms: now_unix_ms,
            updated_unix_ms: now_unix_ms,
        };
        match self.runs.create(run) {
            Ok(run) => Ok(run),
            Err(RunStoreError::ActiveRunExists { lead_id, sequence_id }) => {
                Err(RunStartError::Conflict { lead_id, sequence_id })
            }
            Err(error) => Err(RunStartError::Other(error.into())),
        }
    }

    /// Pauses every active run for the lead; returns how many were paused.
    pub fn pause_runs_for_lead(
        &self,
        tenant_id: &str,
        lead_id: &str,
        reason: &str,
        now_unix_ms: u64,
    ) -> usize {
        let mut paused = 0usize;
        for mut run in self.runs.list_active_for_lead(tenant_id, lead_id) {
            run.status = RunStatus::Paused;
            run.status_reason = Some(reason.to_string());
            if self.runs.update(run, now_unix_ms).is_ok() {
                paused += 1;
            }
        }
        paused
    }

    /// Resumes a paused run; a catch-up fire time in the past is pulled up
    /// to now so the scheduler picks it up on the next poll.
    pub fn resume_run(&self, run_id: &str, now_unix_ms: u64) -> anyhow::Result<SequenceRun> {
        let mut run = self
            .runs
            .get(run_id)
            .ok_or_else(|| anyhow::anyhow!("run '{run_id}' not found"))?;
        anyhow::ensure!(
            run.status == RunStatus::Paused,
            "run '{}' is {}, only paused runs can resume",
            run_id,
            run.status.as_str()
        );
        run.status = RunStatus::Active;
        run.status_reason = None;
        run.next_fire_at_unix_ms =
            Some(run.next_fire_at_unix_ms.unwrap_or(now_unix_ms).max(now_unix_ms));
        Ok(self.runs.update(run, now_unix_ms)?)
    }

    pub fn cancel_run(
        &self,
        run_id: &str,
        reason: &str,
        now_unix_ms: u64,
    ) -> anyhow::Result<SequenceRun> {
        let mut run = self
            .runs
            .get(run_id)
            .ok_or_else(|| anyhow::anyhow!("run '{run_id}' not found"))?;
        anyhow::ensure!(
            !run.status.is_terminal(),
            "run '{}' is already terminal ({})",
            run_id,
            run.status.as_str()
        );
        run.status = RunStatus::Cancelled;
        run.status_reason = Some(reason.to_string());
        run.next_fire_at_unix_ms = None;
        Ok(self.runs.update(run, now_unix_ms)?)
    }
}
