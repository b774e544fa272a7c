use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
/// Lead-lifecycle event kinds that can start a sequence.
pub enum TriggerKind {
    OnLeadCreated,
    OnStageChanged { stage: String },
    Manual,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnLeadCreated => "on_lead_created",
            Self::OnStageChanged { .. } => "on_stage_changed",
            Self::Manual => "manual",
        }
    }

    /// Whether a sequence configured with `self` should start for an
    /// observed trigger. Stage-change triggers match on the stage value.
    pub fn matches(&self, observed: &TriggerKind) -> bool {
        match (self, observed) {
            (Self::OnLeadCreated, Self::OnLeadCreated) => true,
            (Self::Manual, Self::Manual) => true,
            (Self::OnStageChanged { stage: configured }, Self::OnStageChanged { stage }) => {
                configured == stage
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// One templated message within a sequence.
pub struct SequenceStep {
    /// 1-based position, contiguous within the owning sequence.
    pub order: u32,
    pub template_id: String,
    /// Delay in whole hours measured from the previous step's dispatch time
    /// (or from the trigger for the first step).
    pub delay_hours: u32,
    /// When set, the fire time is snapped into the tenant's business hours.
    #[serde(default)]
    pub business_hours_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// A named, ordered list of message steps owned by one tenant.
pub struct SequenceDefinition {
    pub sequence_id: String,
    pub tenant_id: String,
    pub name: String,
    pub trigger: TriggerKind,
    pub steps: Vec<SequenceStep>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl SequenceDefinition {
    pub fn step_at(&self, index: usize) -> Option<&SequenceStep> {
        self.steps.get(index)
    }
}

pub fn validate_sequence_definition(definition: &SequenceDefinition) -> Result<()> {
    if definition.sequence_id.trim().is_empty() {
        bail!("sequence_id must be non-empty");
    }
    if definition.tenant_id.trim().is_empty() {
        bail!("sequence '{}' tenant_id must be non-empty", definition.sequence_id);
    }
    if definition.name.trim().is_empty() {
        bail!("sequence '{}' name must be non-empty", definition.sequence_id);
    }
    if let TriggerKind::OnStageChanged { stage } = &definition.trigger {
        if stage.trim().is_empty() {
            bail!(
                "sequence '{}' stage-change trigger requires a stage value",
                definition.sequence_id
            );
        }
    }
    if definition.steps.is_empty() {
        bail!("sequence '{}' must include at least one step", definition.sequence_id);
    }

    for (index, step) in definition.steps.iter().enumerate() {
        let expected = u32::try_from(index).unwrap_or(u32::MAX).saturating_add(1);
        if step.order != expected {
            bail!(
                "sequence '{}' step order must be contiguous from 1: found {} at position {}",
                definition.sequence_id,
                step.order,
                index
            );
        }
        if step.template_id.trim().is_empty() {
            bail!(
                "sequence '{}' step {} template_id must be non-empty",
                definition.sequence_id,
                step.order
            );
        }
    }
    Ok(())
}
