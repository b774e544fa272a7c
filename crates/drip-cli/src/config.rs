//! Workspace configuration for the drip runner.
//!
//! A single JSON file declares the tenants, templates, sequences, and lead
//! roster the runner serves. Everything is validated up front so a bad file
//! fails the process at startup instead of failing sends at dispatch time.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;

use drip_contract::sequence::SequenceDefinition;
use drip_contract::template::MessageTemplate;
use drip_contract::tenant::{LeadProfile, TenantConfig};
use drip_core::normalize_phone;
use drip_provider::WhatsappCloudConfig;
use drip_store::{InMemoryLeadDirectory, SequenceCatalog, TemplateCatalog, TenantCatalog};

#[derive(Debug, Clone, Deserialize)]
/// Root of the runner's JSON configuration file.
pub struct WorkspaceConfig {
    pub tenants: Vec<TenantConfig>,
    pub templates: Vec<MessageTemplate>,
    pub sequences: Vec<SequenceDefinition>,
    #[serde(default)]
    pub leads: Vec<LeadProfile>,
    /// Required only when the runner uses the real provider adapter.
    #[serde(default)]
    pub whatsapp: Option<WhatsappCredentials>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsappCredentials {
    #[serde(default)]
    pub api_base: Option<String>,
    pub access_token: String,
    pub phone_number_id: String,
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
}

fn default_http_timeout_ms() -> u64 {
    5_000
}

impl WhatsappCredentials {
    pub fn to_provider_config(&self) -> WhatsappCloudConfig {
        let mut config = WhatsappCloudConfig {
            access_token: self.access_token.clone(),
            phone_number_id: self.phone_number_id.clone(),
            http_timeout_ms: self.http_timeout_ms,
            ..WhatsappCloudConfig::default()
        };
        if let Some(api_base) = &self.api_base {
            config.api_base = api_base.clone();
        }
        config
    }
}

/// Validated catalogs ready to hand to the engine.
pub struct LoadedCatalogs {
    pub tenants: Arc<TenantCatalog>,
    pub templates: Arc<TemplateCatalog>,
    pub sequences: Arc<SequenceCatalog>,
    pub leads: Arc<InMemoryLeadDirectory>,
}

pub fn load_workspace_config(path: &Path) -> Result<WorkspaceConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: WorkspaceConfig = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Populates the in-memory catalogs, validating every record on the way in.
///
/// Lead phones are normalized here so webhook attribution and outbound sends
/// agree on the canonical form.
pub fn build_catalogs(config: &WorkspaceConfig) -> Result<LoadedCatalogs> {
    let tenants = Arc::new(TenantCatalog::new());
    for tenant in &config.tenants {
        tenants
            .upsert(tenant.clone())
            .with_context(|| format!("invalid tenant config: tenant={}", tenant.tenant_id))?;
    }

    let templates = Arc::new(TemplateCatalog::new());
    for template in &config.templates {
        templates
            .upsert(template.clone())
            .with_context(|| format!("invalid template: template={}", template.template_id))?;
    }

    let sequences = Arc::new(SequenceCatalog::new());
    for sequence in &config.sequences {
        anyhow::ensure!(
            tenants.get(&sequence.tenant_id).is_some(),
            "sequence references unknown tenant: sequence={} tenant={}",
            sequence.sequence_id,
            sequence.tenant_id
        );
        for step in &sequence.steps {
            anyhow::ensure!(
                templates.get(&step.template_id).is_some(),
                "sequence step references unknown template: sequence={} step={} template={}",
                sequence.sequence_id,
                step.order,
                step.template_id
            );
        }
        sequences
            .upsert(sequence.clone())
            .with_context(|| format!("invalid sequence: sequence={}", sequence.sequence_id))?;
    }

    let leads = Arc::new(InMemoryLeadDirectory::new());
    for lead in &config.leads {
        anyhow::ensure!(
            tenants.get(&lead.tenant_id).is_some(),
            "lead references unknown tenant: lead={} tenant={}",
            lead.lead_id,
            lead.tenant_id
        );
        let mut profile = lead.clone();
        profile.phone = normalize_phone(&lead.phone)
            .with_context(|| format!("invalid lead phone: lead={}", lead.lead_id))?;
        leads.upsert(profile);
    }

    Ok(LoadedCatalogs {
        tenants,
        templates,
        sequences,
        leads,
    })
}
