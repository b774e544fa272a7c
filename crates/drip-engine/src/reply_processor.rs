use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use drip_contract::{
    InboundMessage, LeadActivity, LeadActivityEvent, MessageLogEntry, StatusUpdate,
};
use drip_core::{generate_id, normalize_phone, write_text_atomic};
use drip_provider::WebhookEvents;
use drip_store::{LeadDirectory, MessageLogStore, StatusAdvanceOutcome, TenantCatalog};
use serde::{Deserialize, Serialize};

use crate::run_manager::RunManager;

const DEDUPE_STATE_SCHEMA_VERSION: u32 = 1;

/// On-disk form of the remembered inbound event ids, oldest first.
#[derive(Debug, Serialize, Deserialize)]
struct DedupeStateFile {
    schema_version: u32,
    provider_event_ids: Vec<String>,
}

/// Outlet for lead-activity events surfaced to the CRM collaborator.
pub trait ActivitySink: Send + Sync {
    fn record(&self, event: LeadActivityEvent);
}

pub struct NoopActivitySink;

impl ActivitySink for NoopActivitySink {
    fn record(&self, _event: LeadActivityEvent) {}
}

/// Captures activity events for assertions.
#[derive(Default)]
pub struct RecordingActivitySink {
    events: Mutex<Vec<LeadActivityEvent>>,
}

impl RecordingActivitySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LeadActivityEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl ActivitySink for RecordingActivitySink {
    fn record(&self, event: LeadActivityEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyProcessorConfig {
    /// Pause the lead's active runs once they answer, handing the thread to
    /// a human.
    pub pause_runs_on_reply: bool,
    /// Inbound event ids remembered for webhook-redelivery dedupe.
    pub dedupe_capacity: usize,
    /// When set, the dedupe set survives restarts in a schema-versioned
    /// state file at this path.
    pub state_path: Option<PathBuf>,
}

impl Default for ReplyProcessorConfig {
    fn default() -> Self {
        Self {
            pause_runs_on_reply: true,
            dedupe_capacity: 1_024,
            state_path: None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WebhookProcessReport {
    pub statuses_applied: usize,
    pub statuses_ignored: usize,
    pub statuses_unknown: usize,
    pub inbound_recorded: usize,
    pub inbound_duplicate: usize,
    pub inbound_unmatched: usize,
    pub replies_attributed: usize,
    pub runs_paused: usize,
}

#[derive(Default)]
struct DedupeState {
    order: VecDeque<String>,
    seen: HashSet<String>,
}

/// Applies delivery receipts and lead replies coming off the webhook.
///
/// Everything here is idempotent: receipts replayed out of order are
/// dropped by the status machine, and inbound redeliveries are filtered by
/// a capped set of provider event ids.
pub struct ReplyProcessor {
    messages: Arc<dyn MessageLogStore>,
    leads: Arc<dyn LeadDirectory>,
    tenants: Arc<TenantCatalog>,
    run_manager: RunManager,
    activity: Arc<dyn ActivitySink>,
    config: ReplyProcessorConfig,
    dedupe: Mutex<DedupeState>,
}

impl ReplyProcessor {
    pub fn new(
        messages: Arc<dyn MessageLogStore>,
        leads: Arc<dyn LeadDirectory>,
        tenants: Arc<TenantCatalog>,
        run_manager: RunManager,
        activity: Arc<dyn ActivitySink>,
        config: ReplyProcessorConfig,
    ) -> Self {
        let dedupe = load_dedupe_state(config.state_path.as_deref(), config.dedupe_capacity);
        Self {
            messages,
            leads,
            tenants,
            run_manager,
            activity,
            config,
            dedupe: Mutex::new(dedupe),
        }
    }

    /// Processes one parsed webhook batch. Always succeeds from the
    /// provider's point of view; per-event problems are counted, logged,
    /// and acknowledged so the provider does not redeliver forever.
    pub fn process_events(
        &self,
        events: &WebhookEvents,
        now_unix_ms: u64,
    ) -> WebhookProcessReport {
        let mut report = WebhookProcessReport::default();
        for update in &events.statuses {
            self.apply_status(update, &mut report);
        }
        for message in &events.inbound {
            self.apply_inbound(message, now_unix_ms, &mut report);
        }
        report
    }

    fn apply_status(&self, update: &StatusUpdate, report: &mut WebhookProcessReport) {
        match self.messages.advance_status(
            &update.provider_message_id,
            update.status,
            update.timestamp_unix_ms,
        ) {
            Ok(StatusAdvanceOutcome::Applied { .. }) => report.statuses_applied += 1,
            Ok(StatusAdvanceOutcome::RegressionIgnored { entry_id, current }) => {
                report.statuses_ignored += 1;
                eprintln!(
                    "status regression ignored: entry_id={} current={} incoming={}",
                    entry_id,
                    current.as_str(),
                    update.status.as_str()
                );
            }
            Ok(StatusAdvanceOutcome::UnknownMessageId) => {
                report.statuses_unknown += 1;
                eprintln!(
                    "status for unknown message: provider_message_id={}",
                    update.provider_message_id
                );
            }
            Err(error) => {
                report.statuses_unknown += 1;
                eprintln!("status apply failed: error={error}");
            }
        }
    }

    fn apply_inbound(
        &self,
        message: &InboundMessage,
        now_unix_ms: u64,
        report: &mut WebhookProcessReport,
    ) {
        if !self.remember_event(&message.provider_event_id) {
            report.inbound_duplicate += 1;
            return;
        }

        let lead = normalize_phone(&message.from)
            .ok()
            .and_then(|phone| self.leads.find_by_phone(&phone));
        let Some(lead) = lead else {
            report.inbound_unmatched += 1;
            eprintln!(
                "inbound message from unknown phone: provider_event_id={}",
                message.provider_event_id
            );
            return;
        };

        let provider = self
            .tenants
            .get(&lead.tenant_id)
            .map(|tenant| tenant.provider)
            .unwrap_or_else(|| "unknown".to_string());
        let entry = MessageLogEntry::inbound(
            generate_id("msg", now_unix_ms, &message.provider_event_id),
            lead.tenant_id.clone(),
            lead.lead_id.clone(),
            provider,
            message.body.clone(),
            Some(message.provider_event_id.clone()),
            message.timestamp_unix_ms,
        );
        match self.messages.append(entry) {
            Ok(_) => report.inbound_recorded += 1,
            Err(error) => {
                eprintln!("inbound append failed: error={error}");
                return;
            }
        }

        // Attribute the reply to the newest outbound that reached the wire;
        // a lead writing in unprompted still records activity.
        if let Some(open) = self
            .messages
            .latest_open_outbound_for_lead(&lead.tenant_id, &lead.lead_id)
        {
            match self.messages.mark_replied(&open.entry_id, now_unix_ms) {
                Ok(_) => report.replies_attributed += 1,
                Err(error) => eprintln!("reply attribution failed: error={error}"),
            }
        }

        self.activity.record(LeadActivityEvent {
            tenant_id: lead.tenant_id.clone(),
            lead_id: lead.lead_id.clone(),
            activity: LeadActivity::Reply,
            occurred_unix_ms: message.timestamp_unix_ms,
        });

        if self.config.pause_runs_on_reply {
            report.runs_paused += self.run_manager.pause_runs_for_lead(
                &lead.tenant_id,
                &lead.lead_id,
                "lead_replied",
                now_unix_ms,
            );
        }
    }

    /// Returns false when the event id was already seen. The remembered set
    /// is capped; oldest ids fall out first.
    fn remember_event(&self, provider_event_id: &str) -> bool {
        let Ok(mut state) = self.dedupe.lock() else {
            return true;
        };
        if state.seen.contains(provider_event_id) {
            return false;
        }
        while state.order.len() >= self.config.dedupe_capacity.max(1) {
            if let Some(evicted) = state.order.pop_front() {
                state.seen.remove(&evicted);
            }
        }
        state.order.push_back(provider_event_id.to_string());
        state.seen.insert(provider_event_id.to_string());
        if let Some(path) = &self.config.state_path {
            if let Err(error) = persist_dedupe_state(path, &state) {
                eprintln!(
                    "dedupe state persist failed: path={} error={error}",
                    path.display()
                );
            }
        }
        true
    }
}

/// Loads the persisted dedupe ids. Missing file means a fresh start; an
/// unreadable file or unknown schema is logged and discarded rather than
/// blocking webhook intake.
fn load_dedupe_state(path: Option<&std::path::Path>, capacity: usize) -> DedupeState {
    let Some(path) = path else {
        return DedupeState::default();
    };
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(_) => return DedupeState::default(),
    };
    let parsed: DedupeStateFile = match serde_json::from_str(&raw) {
        Ok(parsed) => parsed,
        Err(error) => {
            eprintln!(
                "dedupe state unreadable, starting fresh: path={} error={error}",
                path.display()
            );
            return DedupeState::default();
        }
    };
    if parsed.schema_version != DEDUPE_STATE_SCHEMA_VERSION {
        eprintln!(
            "dedupe state schema mismatch, starting fresh: path={} found={} expected={}",
            path.display(),
            parsed.schema_version,
            DEDUPE_STATE_SCHEMA_VERSION
        );
        return DedupeState::default();
    }

    let mut state = DedupeState::default();
    let keep_from = parsed.provider_event_ids.len().saturating_sub(capacity.max(1));
    for event_id in parsed.provider_event_ids.into_iter().skip(keep_from) {
        if state.seen.insert(event_id.clone()) {
            state.order.push_back(event_id);
        }
    }
    state
}

fn persist_dedupe_state(path: &std::path::Path, state: &DedupeState) -> anyhow::Result<()> {
    let file = DedupeStateFile {
        schema_version: DEDUPE_STATE_SCHEMA_VERSION,
        provider_event_ids: state.order.iter().cloned().collect(),
    };
    write_text_atomic(path, &serde_json::to_string_pretty(&file)?)
}
