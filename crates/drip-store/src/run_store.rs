use std::collections::BTreeMap;
use std::sync::Mutex;

use drip_contract::{RunStatus, SequenceRun};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RunStoreError {
    #[error("an active run already exists for lead '{lead_id}' and sequence '{sequence_id}'")]
    ActiveRunExists { lead_id: String, sequence_id: String },
    #[error("run not found: {0}")]
    NotFound(String),
    #[error("claim lost for run '{0}': another worker won the race")]
    ClaimLost(String),
    #[error("run store internal error: {0}")]
    Internal(String),
}

/// Durable home of sequence runs with optimistic-concurrency semantics.
///
/// `claim_due` and `update` are conditional writes keyed on the run
/// `version`; a stale version yields `ClaimLost` so callers abandon the tick
/// without side effects. There is no long-held lock to leak: a worker that
/// crashes mid-dispatch leaves the run claimable again at its next due time.
pub trait RunStore: Send + Sync {
    /// Persists a new run; rejects a second active run for the same
    /// (lead, sequence) pair.
    fn create(&self, run: SequenceRun) -> Result<SequenceRun, RunStoreError>;

    fn get(&self, run_id: &str) -> Option<SequenceRun>;

    /// Active runs whose fire time has passed, oldest first.
    fn list_due(&self, now_unix_ms: u64, limit: usize) -> Vec<SequenceRun>;

    /// Claims a due run when (and only when) its version still matches the
    /// snapshot the caller read. The winner receives the bumped snapshot.
    fn claim_due(
        &self,
        run_id: &str,
        expected_version: u64,
        now_unix_ms: u64,
    ) -> Result<SequenceRun, RunStoreError>;

    /// Conditional write: applies `run` only when the stored version equals
    /// `run.version`, storing it with the version bumped.
    fn update(&self, run: SequenceRun, now_unix_ms: u64) -> Result<SequenceRun, RunStoreError>;

    fn list_active_for_lead(&self, tenant_id: &str, lead_id: &str) -> Vec<SequenceRun>;
}

#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    inner: Mutex<BTreeMap<String, SequenceRun>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunStore for InMemoryRunStore {
    fn create(&self, run: SequenceRun) -> Result<SequenceRun, RunStoreError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| RunStoreError::Internal("run store lock poisoned".to_string()))?;
        let conflict = inner.values().any(|existing| {
            existing.status == RunStatus::Active
                && existing.lead_id == run.lead_id
                && existing.sequence_id == run.sequence_id
        });
        if conflict {
            return Err(RunStoreError::ActiveRunExists {
                lead_id: run.lead_id,
                sequence_id: run.sequence_id,
            });
        }
        inner.insert(run.run_id.clone(), run.clone());
        Ok(run)
    }

    fn get(&self, run_id: &str) -> Option<SequenceRun> {
        self.inner.lock().ok()?.get(run_id).cloned()
    }

    fn list_due(&self, now_unix_ms: u64, limit: usize) -> Vec<SequenceRun> {
        let Ok(inner) = self.inner.lock() else {
            return Vec::new();
        };
        let mut due: Vec<SequenceRun> = inner
            .values()
            .filter(|run| run.is_due(now_unix_ms))
            .cloned()
            .collect();
        due.sort_by_key(|run| (run.next_fire_at_unix_ms.unwrap_or(u64::MAX), run.run_id.clone()));
        due.truncate(limit.max(1));
        due
    }

    fn claim_due(
        &self,
        run_id: &str,
        expected_version: u64,
        now_unix_ms: u64,
    ) -> Result<SequenceRun, RunStoreError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| RunStoreError::Internal("run store lock poisoned".to_string()))?;
        let run = inner
            .get_mut(run_id)
            .ok_or_else(|| RunStoreError::NotFound(run_id.to_string()))?;
        if run.version != expected_version || !run.is_due(now_unix_ms) {
            return Err(RunStoreError::ClaimLost(run_id.to_string()));
        }
        run.version = run.version.saturating_add(1);
        run.updated_unix_ms = now_unix_ms;
        Ok(run.clone())
    }

    fn update(&self, run: SequenceRun, now_unix_ms: u64) -> Result<SequenceRun, RunStoreError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| RunStoreError::Internal("run store lock poisoned".to_string()))?;
        let stored = inner
            .get_mut(&run.run_id)
            .ok_or_else(|| RunStoreError::NotFound(run.run_id.clone()))?;
        if stored.version != run.version {
            return Err(RunStoreError::ClaimLost(run.run_id));
        }
        let mut next = run;
        next.version = next.version.saturating_add(1);
        next.updated_unix_ms = now_unix_ms;
        *stored = next.clone();
        Ok(next)
    }

    fn list_active_for_lead(&self, tenant_id: &str, lead_id: &str) -> Vec<SequenceRun> {
        let Ok(inner) = self.inner.lock() else {
            return Vec::new();
        };
        inner
            .values()
            .filter(|run| {
                run.status == RunStatus::Active
                    && run.tenant_id == tenant_id
                    && run.lead_id == lead_id
            })
            .cloned()
            .collect()
    }
}
