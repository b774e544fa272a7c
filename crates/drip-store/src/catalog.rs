use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::Result;
use drip_contract::{
    validate_business_hours, validate_sequence_definition, validate_template, LeadProfile,
    MessageTemplate, SequenceDefinition, TenantConfig,
};

/// Sequence definitions keyed by id, validated on the way in.
#[derive(Debug, Default)]
pub struct SequenceCatalog {
    inner: Mutex<BTreeMap<String, SequenceDefinition>>,
}

impl SequenceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, definition: SequenceDefinition) -> Result<()> {
        validate_sequence_definition(&definition)?;
        if let Ok(mut inner) = self.inner.lock() {
            inner.insert(definition.sequence_id.clone(), definition);
        }
        Ok(())
    }

    pub fn get(&self, sequence_id: &str) -> Option<SequenceDefinition> {
        self.inner.lock().ok()?.get(sequence_id).cloned()
    }

    pub fn list_active_for_tenant(&self, tenant_id: &str) -> Vec<SequenceDefinition> {
        let Ok(inner) = self.inner.lock() else {
            return Vec::new();
        };
        inner
            .values()
            .filter(|definition| definition.active && definition.tenant_id == tenant_id)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct TemplateCatalog {
    inner: Mutex<BTreeMap<String, MessageTemplate>>,
}

impl TemplateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, template: MessageTemplate) -> Result<()> {
        validate_template(&template)?;
        if let Ok(mut inner) = self.inner.lock() {
            inner.insert(template.template_id.clone(), template);
        }
        Ok(())
    }

    pub fn get(&self, template_id: &str) -> Option<MessageTemplate> {
        self.inner.lock().ok()?.get(template_id).cloned()
    }
}

#[derive(Debug, Default)]
pub struct TenantCatalog {
    inner: Mutex<BTreeMap<String, TenantConfig>>,
}

impl TenantCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, config: TenantConfig) -> Result<()> {
        validate_business_hours(&config.business_hours)?;
        if let Ok(mut inner) = self.inner.lock() {
            inner.insert(config.tenant_id.clone(), config);
        }
        Ok(())
    }

    pub fn get(&self, tenant_id: &str) -> Option<TenantConfig> {
        self.inner.lock().ok()?.get(tenant_id).cloned()
    }
}

/// Read side of the CRM's lead records.
///
/// The engine never writes leads; a lead missing here means the CRM deleted
/// it and any runs against it should be cancelled.
pub trait LeadDirectory: Send + Sync {
    fn get(&self, tenant_id: &str, lead_id: &str) -> Option<LeadProfile>;

    /// Reverse lookup for inbound webhooks, matching on the canonical phone.
    fn find_by_phone(&self, phone: &str) -> Option<LeadProfile>;
}

#[derive(Debug, Default)]
pub struct InMemoryLeadDirectory {
    // (tenant_id, lead_id) -> profile
    inner: Mutex<BTreeMap<(String, String), LeadProfile>>,
}

impl InMemoryLeadDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, profile: LeadProfile) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.insert((profile.tenant_id.clone(), profile.lead_id.clone()), profile);
        }
    }

    pub fn remove(&self, tenant_id: &str, lead_id: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.remove(&(tenant_id.to_string(), lead_id.to_string()));
        }
    }
}

impl LeadDirectory for InMemoryLeadDirectory {
    fn get(&self, tenant_id: &str, lead_id: &str) -> Option<LeadProfile> {
        self.inner
            .lock()
            .ok()?
            .get(&(tenant_id.to_string(), lead_id.to_string()))
            .cloned()
    }

    fn find_by_phone(&self, phone: &str) -> Option<LeadProfile> {
        let inner = self.inner.lock().ok()?;
        inner.values().find(|profile| profile.phone == phone).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drip_contract::{
        BusinessHoursConfig, RateLimitCeilings, SequenceStep, TriggerKind,
    };

    fn sample_sequence(sequence_id: &str, active: bool) -> SequenceDefinition {
        SequenceDefinition {
            sequence_id: sequence_id.to_string(),
            tenant_id: "tenant-a".to_string(),
            name: "Welcome".to_string(),
            trigger: TriggerKind::OnLeadCreated,
            steps: vec![SequenceStep {
                order: 1,
                template_id: "tpl-hello".to_string(),
                delay_hours: 0,
                business_hours_only: false,
            }],
            active,
        }
    }

    #[test]
    fn sequence_catalog_validates_and_filters_by_tenant() {
        let catalog = SequenceCatalog::new();
        catalog.upsert(sample_sequence("seq-1", true)).expect("upsert");
        catalog.upsert(sample_sequence("seq-2", false)).expect("upsert");

        let mut bad = sample_sequence("seq-broken", true);
        bad.steps[0].order = 2;
        assert!(catalog.upsert(bad).is_err());

        let active = catalog.list_active_for_tenant("tenant-a");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].sequence_id, "seq-1");
        assert!(catalog.list_active_for_tenant("tenant-b").is_empty());
    }

    #[test]
    fn template_catalog_rejects_undeclared_variables() {
        let catalog = TemplateCatalog::new();
        let template = MessageTemplate {
            template_id: "tpl-hello".to_string(),
            name: "Hello".to_string(),
            content: "Hi {{first_name}}".to_string(),
            variables: vec!["first_name".to_string()],
        };
        catalog.upsert(template.clone()).expect("upsert");
        assert!(catalog.get("tpl-hello").is_some());

        let broken = MessageTemplate {
            template_id: "tpl-broken".to_string(),
            variables: Vec::new(),
            ..template
        };
        assert!(catalog.upsert(broken).is_err());
        assert!(catalog.get("tpl-broken").is_none());
    }

    #[test]
    fn tenant_catalog_validates_business_hours() {
        let catalog = TenantCatalog::new();
        let mut config = TenantConfig {
            tenant_id: "tenant-a".to_string(),
            provider: "whatsapp_cloud".to_string(),
            rate_limits: RateLimitCeilings::default(),
            business_hours: BusinessHoursConfig {
                start_time: "09:00".to_string(),
                end_time: "18:00".to_string(),
                timezone: "America/Sao_Paulo".to_string(),
                active_days: vec!["mon".to_string(), "fri".to_string()],
            },
        };
        catalog.upsert(config.clone()).expect("upsert");

        config.business_hours.end_time = "08:00".to_string();
        assert!(catalog.upsert(config).is_err());
    }

    #[test]
    fn lead_directory_finds_by_id_and_phone() {
        let directory = InMemoryLeadDirectory::new();
        directory.upsert(LeadProfile {
            lead_id: "lead-1".to_string(),
            tenant_id: "tenant-a".to_string(),
            phone: "5511999990000".to_string(),
            bindings: BTreeMap::new(),
        });

        assert!(directory.get("tenant-a", "lead-1").is_some());
        assert!(directory.get("tenant-b", "lead-1").is_none());
        assert_eq!(
            directory
                .find_by_phone("5511999990000")
                .expect("lookup")
                .lead_id,
            "lead-1"
        );
        directory.remove("tenant-a", "lead-1");
        assert!(directory.get("tenant-a", "lead-1").is_none());
    }
}
