use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Lifecycle state of one sequence execution.
pub enum RunStatus {
    Active,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// Terminal states never return to scheduling.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// One execution instance of a sequence against one lead.
///
/// `version` is the optimistic-concurrency token: every store write bumps it,
/// and claims/updates carrying a stale version lose the race. At most one
/// active run may exist per (lead_id, sequence_id); the run store enforces
/// that at creation time.
pub struct SequenceRun {
    pub run_id: String,
    pub tenant_id: String,
    pub lead_id: String,
    pub sequence_id: String,
    /// 0-based index into the sequence's ordered steps.
    pub current_step_index: usize,
    /// None once completed or halted; otherwise the next due instant.
    pub next_fire_at_unix_ms: Option<u64>,
    pub status: RunStatus,
    /// Send attempts consumed for the current step; resets on advance.
    #[serde(default)]
    pub step_attempts: u32,
    pub version: u64,
    #[serde(default)]
    pub status_reason: Option<String>,
    pub created_unix_ms: u64,
    pub updated_unix_ms: u64,
}

impl SequenceRun {
    pub fn is_due(&self, now_unix_ms: u64) -> bool {
        self.status == RunStatus::Active
            && matches!(self.next_fire_at_unix_ms, Some(at) if at <= now_unix_ms)
    }
}
