use std::sync::Arc;

use drip_contract::TriggerEvent;
use drip_store::{SequenceCatalog, TenantCatalog};
use tokio::sync::Notify;

use crate::run_manager::{RunManager, RunStartError};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TriggerReport {
    /// Active sequences whose trigger matched the event.
    pub matched: usize,
    pub started: usize,
    /// Leads already inside a matched sequence; benign.
    pub conflicts: usize,
    pub errors: usize,
}

/// Starts sequence runs from lead-lifecycle events.
pub struct TriggerListener {
    sequences: Arc<SequenceCatalog>,
    tenants: Arc<TenantCatalog>,
    run_manager: RunManager,
    /// Pokes the scheduler so zero-delay first steps go out immediately.
    wake: Arc<Notify>,
}

impl TriggerListener {
    pub fn new(
        sequences: Arc<SequenceCatalog>,
        tenants: Arc<TenantCatalog>,
        run_manager: RunManager,
        wake: Arc<Notify>,
    ) -> Self {
        Self {
            sequences,
            tenants,
            run_manager,
            wake,
        }
    }

    pub fn handle_trigger(&self, event: &TriggerEvent, now_unix_ms: u64) -> TriggerReport {
        let mut report = TriggerReport::default();
        let Some(tenant) = self.tenants.get(&event.tenant_id) else {
            eprintln!(
                "trigger for unknown tenant: tenant={} trigger={}",
                event.tenant_id,
                event.trigger.as_str()
            );
            report.errors += 1;
            return report;
        };

        for sequence in self.sequences.list_active_for_tenant(&event.tenant_id) {
            if let Some(sequence_id) = &event.sequence_id {
                if sequence.sequence_id != *sequence_id {
                    continue;
                }
            }
            if !sequence.trigger.matches(&event.trigger) {
                continue;
            }
            report.matched += 1;
            match self
                .run_manager
                .start_run(&sequence, &tenant, &event.lead_id, now_unix_ms)
            {
                Ok(run) => {
                    report.started += 1;
                    println!(
                        "run started: run_id={} tenant={} lead={} sequence={}",
                        run.run_id, run.tenant_id, run.lead_id, run.sequence_id
                    );
                }
                Err(RunStartError::Conflict { .. }) => report.conflicts += 1,
                Err(error) => {
                    report.errors += 1;
                    eprintln!(
                        "run start failed: tenant={} lead={} sequence={} error={error}",
                        event.tenant_id, event.lead_id, sequence.sequence_id
                    );
                }
            }
        }
        if report.started > 0 {
            self.wake.notify_one();
        }
        report
    }
}
