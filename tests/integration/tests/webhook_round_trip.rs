use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Notify;

use drip_contract::{
    BusinessHoursConfig, LeadActivity, LeadProfile, MessageStatus, MessageTemplate,
    RateLimitCeilings, RunStatus, SequenceDefinition, SequenceStep, TenantConfig, TriggerEvent,
    TriggerKind,
};
use drip_engine::{
    DispatchRetryPolicy, Dispatcher, RateLimiter, RecordingActivitySink, ReplyProcessor,
    ReplyProcessorConfig, RunManager, Scheduler, SchedulerConfig, TriggerListener,
};
use drip_provider::{parse_webhook_payload, MockProvider, ProviderAdapter};
use drip_store::{
    InMemoryLeadDirectory, InMemoryMessageLogStore, InMemoryRateCounterStore, InMemoryRunStore,
    MessageLogStore, RunStore, SequenceCatalog, TemplateCatalog, TenantCatalog,
};

/// Tuesday 2026-08-25 14:00 in Sao Paulo, inside business hours.
const NOW: u64 = 1_787_677_200_000;

struct Stack {
    scheduler: Scheduler,
    trigger_listener: TriggerListener,
    reply_processor: ReplyProcessor,
    activity: Arc<RecordingActivitySink>,
    runs: Arc<InMemoryRunStore>,
    messages: Arc<InMemoryMessageLogStore>,
    provider: Arc<MockProvider>,
    run_manager: RunManager,
}

fn stack(pause_on_reply: bool) -> Stack {
    let runs = Arc::new(InMemoryRunStore::new());
    let messages = Arc::new(InMemoryMessageLogStore::new());
    let leads = Arc::new(InMemoryLeadDirectory::new());
    let provider = Arc::new(MockProvider::new());
    let activity = Arc::new(RecordingActivitySink::new());

    let sequences = Arc::new(SequenceCatalog::new());
    sequences
        .upsert(SequenceDefinition {
            sequence_id: "seq-welcome".to_string(),
            tenant_id: "acme".to_string(),
            name: "Welcome".to_string(),
            trigger: TriggerKind::OnLeadCreated,
            steps: vec![
                SequenceStep {
                    order: 1,
                    template_id: "tpl-hello".to_string(),
                    delay_hours: 0,
                    business_hours_only: false,
                },
                SequenceStep {
                    order: 2,
                    template_id: "tpl-hello".to_string(),
                    delay_hours: 48,
                    business_hours_only: false,
                },
            ],
            active: true,
        })
        .expect("sequence");

    let templates = Arc::new(TemplateCatalog::new());
    templates
        .upsert(MessageTemplate {
            template_id: "tpl-hello".to_string(),
            name: "Hello".to_string(),
            content: "Oi!".to_string(),
            variables: Vec::new(),
        })
        .expect("template");

    let tenants = Arc::new(TenantCatalog::new());
    tenants
        .upsert(TenantConfig {
            tenant_id: "acme".to_string(),
            provider: "mock".to_string(),
            rate_limits: RateLimitCeilings::default(),
            business_hours: BusinessHoursConfig {
                start_time: "09:00".to_string(),
                end_time: "18:00".to_string(),
                timezone: "America/Sao_Paulo".to_string(),
                active_days: ["mon", "tue", "wed", "thu", "fri"]
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            },
        })
        .expect("tenant");

    leads.upsert(LeadProfile {
        lead_id: "lead-1".to_string(),
        tenant_id: "acme".to_string(),
        phone: "5511912345678".to_string(),
        bindings: BTreeMap::new(),
    });

    let mut providers: BTreeMap<String, Arc<dyn ProviderAdapter>> = BTreeMap::new();
    providers.insert("mock".to_string(), provider.clone());

    let dispatcher = Dispatcher {
        runs: runs.clone(),
        messages: messages.clone(),
        sequences: sequences.clone(),
        templates,
        tenants: tenants.clone(),
        leads: leads.clone(),
        providers,
        rate_limiter: RateLimiter::new(Arc::new(InMemoryRateCounterStore::new())),
        retry: DispatchRetryPolicy::default(),
    };
    let wake = Arc::new(Notify::new());
    let scheduler = Scheduler::new(
        dispatcher,
        runs.clone(),
        SchedulerConfig {
            poll_interval_ms: 5_000,
            batch_limit: 16,
        },
        wake.clone(),
    );
    let run_manager = RunManager::new(runs.clone() as Arc<dyn RunStore>);
    let trigger_listener = TriggerListener::new(
        sequences,
        tenants.clone(),
        run_manager.clone(),
        wake,
    );
    let reply_processor = ReplyProcessor::new(
        messages.clone(),
        leads,
        tenants,
        run_manager.clone(),
        activity.clone(),
        ReplyProcessorConfig {
            pause_runs_on_reply: pause_on_reply,
            ..ReplyProcessorConfig::default()
        },
    );

    Stack {
        scheduler,
        trigger_listener,
        reply_processor,
        activity,
        runs,
        messages,
        provider,
        run_manager,
    }
}

/// Triggers the sequence and dispatches the first step; returns the
/// provider message id the mock assigned to the send.
async fn send_first_step(stack: &Stack) -> String {
    let report = stack.trigger_listener.handle_trigger(
        &TriggerEvent {
            tenant_id: "acme".to_string(),
            lead_id: "lead-1".to_string(),
            trigger: TriggerKind::OnLeadCreated,
            sequence_id: None,
        },
        NOW,
    );
    assert_eq!(report.started, 1);
    let report = stack.scheduler.poll_once(NOW).await.expect("poll");
    assert_eq!(report.advanced, 1);
    stack.provider.sends()[0].provider_message_id.clone()
}

fn apply_payload(stack: &Stack, payload: serde_json::Value, at_unix_ms: u64) -> drip_engine::WebhookProcessReport {
    let events = parse_webhook_payload(&payload.to_string()).expect("parse");
    stack.reply_processor.process_events(&events, at_unix_ms)
}

#[tokio::test]
async fn delivery_receipts_walk_the_status_machine() {
    let stack = stack(true);
    let message_id = send_first_step(&stack).await;

    let report = apply_payload(
        &stack,
        MockProvider::status_webhook_payload(&message_id, "delivered", NOW / 1_000 + 60),
        NOW + 60_000,
    );
    assert_eq!(report.statuses_applied, 1);

    let report = apply_payload(
        &stack,
        MockProvider::status_webhook_payload(&message_id, "read", NOW / 1_000 + 120),
        NOW + 120_000,
    );
    assert_eq!(report.statuses_applied, 1);

    let run_id = stack.runs.list_active_for_lead("acme", "lead-1")[0]
        .run_id
        .clone();
    let entry = &stack.messages.list_for_run(&run_id)[0];
    assert_eq!(entry.status, MessageStatus::Read);
    assert_eq!(entry.delivered_unix_ms, Some(NOW + 60_000));

    // A late replay of the earlier receipt cannot move the status back.
    let report = apply_payload(
        &stack,
        MockProvider::status_webhook_payload(&message_id, "delivered", NOW / 1_000 + 60),
        NOW + 180_000,
    );
    assert_eq!(report.statuses_ignored, 1);
    let entry = &stack.messages.list_for_run(&run_id)[0];
    assert_eq!(entry.status, MessageStatus::Read);
}

#[tokio::test]
async fn lead_reply_pauses_the_run_until_resumed() {
    let stack = stack(true);
    send_first_step(&stack).await;
    let run_id = stack.runs.list_active_for_lead("acme", "lead-1")[0]
        .run_id
        .clone();

    let report = apply_payload(
        &stack,
        MockProvider::inbound_webhook_payload("evt-1", "5511912345678", "sim, quero!", NOW / 1_000 + 300),
        NOW + 300_000,
    );
    assert_eq!(report.inbound_recorded, 1);
    assert_eq!(report.replies_attributed, 1);
    assert_eq!(report.runs_paused, 1);

    let run = stack.runs.get(&run_id).expect("run");
    assert_eq!(run.status, RunStatus::Paused);
    assert_eq!(run.status_reason.as_deref(), Some("lead_replied"));

    let entries = stack.messages.list_for_run(&run_id);
    assert_eq!(entries[0].status, MessageStatus::Replied);

    let events = stack.activity.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].activity, LeadActivity::Reply);
    assert_eq!(events[0].lead_id, "lead-1");

    // An agent hands the conversation back and the follow-up resumes.
    let resumed = stack
        .run_manager
        .resume_run(&run_id, NOW + 600_000)
        .expect("resume");
    assert_eq!(resumed.status, RunStatus::Active);
    assert!(resumed.next_fire_at_unix_ms.expect("scheduled") >= NOW + 600_000);
}

#[tokio::test]
async fn unprompted_inbound_is_logged_without_attribution() {
    let stack = stack(true);

    let report = apply_payload(
        &stack,
        MockProvider::inbound_webhook_payload("evt-1", "5511912345678", "oi?", NOW / 1_000),
        NOW,
    );
    assert_eq!(report.inbound_recorded, 1);
    assert_eq!(report.replies_attributed, 0);
    assert_eq!(report.runs_paused, 0);

    // The message still lands on the lead's log and surfaces as activity.
    assert_eq!(stack.activity.events().len(), 1);
    let entry = stack
        .messages
        .latest_open_outbound_for_lead("acme", "lead-1");
    assert!(entry.is_none());
}

#[tokio::test]
async fn redelivered_webhook_counts_once() {
    let stack = stack(true);
    send_first_step(&stack).await;

    let payload =
        MockProvider::inbound_webhook_payload("evt-1", "5511912345678", "sim", NOW / 1_000 + 60);
    let first = apply_payload(&stack, payload.clone(), NOW + 60_000);
    assert_eq!(first.inbound_recorded, 1);

    let second = apply_payload(&stack, payload, NOW + 90_000);
    assert_eq!(second.inbound_recorded, 0);
    assert_eq!(second.inbound_duplicate, 1);

    // The first delivery already paused the run; the replay changed nothing.
    let active = stack.runs.list_active_for_lead("acme", "lead-1");
    assert!(active.is_empty());
    assert_eq!(stack.activity.events().len(), 1);
}

#[tokio::test]
async fn reply_pause_can_be_disabled_per_deployment() {
    let stack = stack(false);
    send_first_step(&stack).await;
    let run_id = stack.runs.list_active_for_lead("acme", "lead-1")[0]
        .run_id
        .clone();

    let report = apply_payload(
        &stack,
        MockProvider::inbound_webhook_payload("evt-1", "5511912345678", "sim", NOW / 1_000 + 60),
        NOW + 60_000,
    );
    assert_eq!(report.replies_attributed, 1);
    assert_eq!(report.runs_paused, 0);
    assert_eq!(
        stack.runs.get(&run_id).expect("run").status,
        RunStatus::Active
    );
}
