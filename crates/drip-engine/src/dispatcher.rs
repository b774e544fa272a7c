use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use drip_contract::{MessageLogEntry, RunStatus, SequenceRun};
use drip_core::generate_id;
use drip_provider::ProviderAdapter;
use drip_store::{
    LeadDirectory, MessageLogStore, RunStore, RunStoreError, SequenceCatalog, TemplateCatalog,
    TenantCatalog,
};

use crate::business_hours::ResolvedBusinessHours;
use crate::rate_limiter::RateLimiter;
use crate::retry::DispatchRetryPolicy;
use crate::run_manager::compute_step_fire_at;
use crate::template::{render_template, TemplateRenderError};

/// Minimum deferral when a rate ceiling denies a send.
const RATE_LIMIT_MIN_DEFER_MS: u64 = 1_000;

#[derive(Debug, Clone, PartialEq, Eq)]
/// What one dispatch attempt did to the run.
pub enum DispatchOutcome {
    /// Another worker claimed the run first; nothing happened.
    ClaimLost,
    /// The step was sent and the run moved to the next step.
    Advanced { next_fire_at_unix_ms: u64 },
    /// The step was sent and it was the last one.
    Completed,
    /// A rate ceiling denied the send; the run re-fires after the window.
    RateLimited { retry_after_ms: u64 },
    /// A gated step came due outside business hours and was pushed forward.
    OutsideBusinessHours { resume_at_unix_ms: u64 },
    /// The provider failed transiently; another attempt is scheduled.
    RetryScheduled { attempt: u32, delay_ms: u64 },
    RunFailed { reason_code: String },
    RunCancelled { reason_code: String },
}

/// Claims due runs and drives each current step through render, rate
/// limiting, and the provider send.
///
/// All state lives behind the store seams; the dispatcher itself is
/// stateless and safe to share across workers.
#[derive(Clone)]
pub struct Dispatcher {
    pub runs: Arc<dyn RunStore>,
    pub messages: Arc<dyn MessageLogStore>,
    pub sequences: Arc<SequenceCatalog>,
    pub templates: Arc<TemplateCatalog>,
    pub tenants: Arc<TenantCatalog>,
    pub leads: Arc<dyn LeadDirectory>,
    /// Adapters keyed by the provider label tenants reference.
    pub providers: BTreeMap<String, Arc<dyn ProviderAdapter>>,
    pub rate_limiter: RateLimiter,
    pub retry: DispatchRetryPolicy,
}

impl Dispatcher {
    /// Dispatches one due run from the snapshot the scheduler read.
    pub async fn dispatch_run(
        &self,
        snapshot: &SequenceRun,
        now_unix_ms: u64,
    ) -> Result<DispatchOutcome> {
        let mut run = match self
            .runs
            .claim_due(&snapshot.run_id, snapshot.version, now_unix_ms)
        {
            Ok(run) => run,
            Err(RunStoreError::ClaimLost(_)) | Err(RunStoreError::NotFound(_)) => {
                return Ok(DispatchOutcome::ClaimLost);
            }
            Err(error) => return Err(error.into()),
        };

        let Some(sequence) = self.sequences.get(&run.sequence_id) else {
            return self.cancel(&mut run, "sequence_missing", now_unix_ms);
        };
        if !sequence.active {
            return self.cancel(&mut run, "sequence_inactive", now_unix_ms);
        }
        let Some(step) = sequence.step_at(run.current_step_index) else {
            // Step index past the end only happens if the definition shrank
            // under a live run; treat it as completion.
            return self.complete(&mut run, now_unix_ms);
        };

        let Some(tenant) = self.tenants.get(&run.tenant_id) else {
            let detail = format!("tenant '{}' has no configuration", run.tenant_id);
            return self.fail_logged(
                &mut run,
                "",
                String::new(),
                "tenant_missing",
                &detail,
                now_unix_ms,
            );
        };
        let Some(lead) = self.leads.get(&run.tenant_id, &run.lead_id) else {
            return self.cancel(&mut run, "lead_missing", now_unix_ms);
        };

        if step.business_hours_only {
            let hours = ResolvedBusinessHours::resolve(&tenant.business_hours)?;
            if !hours.contains(now_unix_ms) {
                let resume_at = hours.snap_forward(now_unix_ms)?;
                run.next_fire_at_unix_ms = Some(resume_at);
                self.runs.update(run, now_unix_ms)?;
                return Ok(DispatchOutcome::OutsideBusinessHours {
                    resume_at_unix_ms: resume_at,
                });
            }
        }

        let Some(template) = self.templates.get(&step.template_id) else {
            let detail = format!("template '{}' not found", step.template_id);
            return self.fail_logged(
                &mut run,
                &tenant.provider,
                String::new(),
                "template_missing",
                &detail,
                now_unix_ms,
            );
        };
        let rendered = match render_template(&template, &lead.bindings) {
            Ok(rendered) => rendered,
            Err(error) => {
                let reason_code = match &error {
                    TemplateRenderError::MissingVariable { .. } => "template_variable_missing",
                    TemplateRenderError::Malformed { .. } => "template_malformed",
                };
                let detail = error.to_string();
                return self.fail_logged(
                    &mut run,
                    &tenant.provider,
                    String::new(),
                    reason_code,
                    &detail,
                    now_unix_ms,
                );
            }
        };
        let Some(provider) = self.providers.get(&tenant.provider) else {
            let detail = format!("no adapter registered for provider '{}'", tenant.provider);
            return self.fail_logged(
                &mut run,
                &tenant.provider,
                rendered,
                "provider_unconfigured",
                &detail,
                now_unix_ms,
            );
        };

        let attempt = run.step_attempts.saturating_add(1);
        let entry = match self
            .messages
            .find_attempt_entry(&run.run_id, run.current_step_index, attempt)
        {
            Some(entry) => entry,
            None => {
                let seed = format!("{}:{}:{}", run.run_id, run.current_step_index, attempt);
                self.messages.append(MessageLogEntry::outbound_attempt(
                    generate_id("msg", now_unix_ms, &seed),
                    run.tenant_id.clone(),
                    run.lead_id.clone(),
                    tenant.provider.clone(),
                    rendered.clone(),
                    run.run_id.clone(),
                    run.current_step_index,
                    attempt,
                    now_unix_ms,
                ))?
            }
        };

        let decision = self.rate_limiter.check_and_consume(
            &run.tenant_id,
            &tenant.provider,
            &tenant.rate_limits,
            now_unix_ms,
        );
        if !decision.granted {
            // Keep the entry queued; the deferred attempt reuses it.
            self.messages.mark_queued(&entry.entry_id)?;
            let retry_after_ms = decision.retry_after_ms.max(RATE_LIMIT_MIN_DEFER_MS);
            run.next_fire_at_unix_ms = Some(now_unix_ms.saturating_add(retry_after_ms));
            self.runs.update(run, now_unix_ms)?;
            return Ok(DispatchOutcome::RateLimited { retry_after_ms });
        }

        self.messages.mark_queued(&entry.entry_id)?;
        match provider.send_text(&lead.phone, &rendered).await {
            Ok(receipt) => {
                self.messages
                    .mark_sent(&entry.entry_id, &receipt.provider_message_id, now_unix_ms)?;
                run.current_step_index = run.current_step_index.saturating_add(1);
                run.step_attempts = 0;
                match sequence.step_at(run.current_step_index) {
                    Some(next_step) => {
                        let next_fire_at = compute_step_fire_at(
                            next_step,
                            &tenant.business_hours,
                            now_unix_ms,
                        )
                        .context("failed to schedule next step")?;
                        run.next_fire_at_unix_ms = Some(next_fire_at);
                        self.runs.update(run, now_unix_ms)?;
                        Ok(DispatchOutcome::Advanced {
                            next_fire_at_unix_ms: next_fire_at,
                        })
                    }
                    None => self.complete(&mut run, now_unix_ms),
                }
            }
            Err(error) => {
                self.messages
                    .mark_failed(&entry.entry_id, &error.reason_code, &error.detail)?;
                if error.retryable && attempt < self.retry.max_attempts {
                    let delay_ms = self.retry.delay_ms(attempt, &run.run_id);
                    run.step_attempts = attempt;
                    run.next_fire_at_unix_ms = Some(now_unix_ms.saturating_add(delay_ms));
                    self.runs.update(run, now_unix_ms)?;
                    Ok(DispatchOutcome::RetryScheduled { attempt, delay_ms })
                } else {
                    self.fail(&mut run, &error.reason_code, now_unix_ms)
                }
            }
        }
    }

    fn fail(
        &self,
        run: &mut SequenceRun,
        reason_code: &str,
        now_unix_ms: u64,
    ) -> Result<DispatchOutcome> {
        run.status = RunStatus::Failed;
        run.status_reason = Some(reason_code.to_string());
        run.next_fire_at_unix_ms = None;
        self.runs.update(run.clone(), now_unix_ms)?;
        Ok(DispatchOutcome::RunFailed {
            reason_code: reason_code.to_string(),
        })
    }

    /// Fails the run while leaving a failed log entry behind, so terminal
    /// decisions made before the provider call still show up in the
    /// message log. Reuses the attempt's queued entry when one exists.
    fn fail_logged(
        &self,
        run: &mut SequenceRun,
        provider: &str,
        rendered_text: String,
        reason_code: &str,
        detail: &str,
        now_unix_ms: u64,
    ) -> Result<DispatchOutcome> {
        let attempt = run.step_attempts.saturating_add(1);
        let entry = match self
            .messages
            .find_attempt_entry(&run.run_id, run.current_step_index, attempt)
        {
            Some(entry) => entry,
            None => {
                let seed = format!("{}:{}:{}", run.run_id, run.current_step_index, attempt);
                self.messages.append(MessageLogEntry::outbound_attempt(
                    generate_id("msg", now_unix_ms, &seed),
                    run.tenant_id.clone(),
                    run.lead_id.clone(),
                    provider.to_string(),
                    rendered_text,
                    run.run_id.clone(),
                    run.current_step_index,
                    attempt,
                    now_unix_ms,
                ))?
            }
        };
        self.messages.mark_failed(&entry.entry_id, reason_code, detail)?;
        self.fail(run, reason_code, now_unix_ms)
    }

    fn cancel(
        &self,
        run: &mut SequenceRun,
        reason_code: &str,
        now_unix_ms: u64,
    ) -> Result<DispatchOutcome> {
        run.status = RunStatus::Cancelled;
        run.status_reason = Some(reason_code.to_string());
        run.next_fire_at_unix_ms = None;
        self.runs.update(run.clone(), now_unix_ms)?;
        Ok(DispatchOutcome::RunCancelled {
            reason_code: reason_code.to_string(),
        })
    }

    fn complete(&self, run: &mut SequenceRun, now_unix_ms: u64) -> Result<DispatchOutcome> {
        run.status = RunStatus::Completed;
        run.next_fire_at_unix_ms = None;
        self.runs.update(run.clone(), now_unix_ms)?;
        Ok(DispatchOutcome::Completed)
    }
}
