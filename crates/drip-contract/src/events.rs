use serde::{Deserialize, Serialize};

use crate::sequence::TriggerKind;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Lead-lifecycle event consumed from the CRM collaborator.
pub struct TriggerEvent {
    pub tenant_id: String,
    pub lead_id: String,
    pub trigger: TriggerKind,
    /// When set, restricts the trigger to one sequence (manual starts).
    #[serde(default)]
    pub sequence_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Activity kinds emitted back to the CRM collaborator.
pub enum LeadActivity {
    Reply,
    StageAutoAdvance,
}

impl LeadActivity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reply => "reply",
            Self::StageAutoAdvance => "stage_auto_advance",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Domain event surfaced when inbound traffic changes a lead's state.
pub struct LeadActivityEvent {
    pub tenant_id: String,
    pub lead_id: String,
    pub activity: LeadActivity,
    pub occurred_unix_ms: u64,
}
