use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Notify;

use drip_contract::{
    BusinessHoursConfig, LeadProfile, MessageStatus, MessageTemplate, RateLimitCeilings,
    RunStatus, SequenceDefinition, SequenceStep, TenantConfig, TriggerEvent, TriggerKind,
};
use drip_engine::{
    DispatchOutcome, DispatchRetryPolicy, Dispatcher, RateLimiter, RunManager, Scheduler,
    SchedulerConfig, TriggerListener,
};
use drip_provider::{MockProvider, ProviderAdapter};
use drip_store::{
    InMemoryLeadDirectory, InMemoryMessageLogStore, InMemoryRateCounterStore, InMemoryRunStore,
    MessageLogStore, RunStore, SequenceCatalog, TemplateCatalog, TenantCatalog,
};

/// Friday 2026-08-28 19:30 in Sao Paulo, after closing time.
const FRIDAY_EVENING: u64 = 1_787_956_200_000;
/// Monday 2026-08-31 09:00 in Sao Paulo, when the window reopens.
const MONDAY_OPEN: u64 = 1_788_177_600_000;
/// Tuesday 2026-08-25 14:00 in Sao Paulo, inside business hours.
const TUESDAY_AFTERNOON: u64 = 1_787_677_200_000;

struct Stack {
    dispatcher: Dispatcher,
    scheduler: Scheduler,
    trigger_listener: TriggerListener,
    runs: Arc<InMemoryRunStore>,
    messages: Arc<InMemoryMessageLogStore>,
    provider: Arc<MockProvider>,
}

fn business_hours() -> BusinessHoursConfig {
    BusinessHoursConfig {
        start_time: "09:00".to_string(),
        end_time: "18:00".to_string(),
        timezone: "America/Sao_Paulo".to_string(),
        active_days: ["mon", "tue", "wed", "thu", "fri"]
            .into_iter()
            .map(str::to_string)
            .collect(),
    }
}

fn welcome_sequence(gated_first_step: bool) -> SequenceDefinition {
    SequenceDefinition {
        sequence_id: "seq-welcome".to_string(),
        tenant_id: "acme".to_string(),
        name: "Welcome".to_string(),
        trigger: TriggerKind::OnLeadCreated,
        steps: vec![
            SequenceStep {
                order: 1,
                template_id: "tpl-hello".to_string(),
                delay_hours: 0,
                business_hours_only: gated_first_step,
            },
            SequenceStep {
                order: 2,
                template_id: "tpl-followup".to_string(),
                delay_hours: 48,
                business_hours_only: false,
            },
        ],
        active: true,
    }
}

fn lead(lead_id: &str, phone: &str) -> LeadProfile {
    LeadProfile {
        lead_id: lead_id.to_string(),
        tenant_id: "acme".to_string(),
        phone: phone.to_string(),
        bindings: BTreeMap::from([("first_name".to_string(), "Ana".to_string())]),
    }
}

fn stack(ceilings: RateLimitCeilings, gated_first_step: bool) -> Stack {
    let runs = Arc::new(InMemoryRunStore::new());
    let messages = Arc::new(InMemoryMessageLogStore::new());
    let leads = Arc::new(InMemoryLeadDirectory::new());
    let provider = Arc::new(MockProvider::new());

    let sequences = Arc::new(SequenceCatalog::new());
    sequences
        .upsert(welcome_sequence(gated_first_step))
        .expect("sequence");

    let templates = Arc::new(TemplateCatalog::new());
    templates
        .upsert(MessageTemplate {
            template_id: "tpl-hello".to_string(),
            name: "Hello".to_string(),
            content: "Oi {{first_name}}!".to_string(),
            variables: vec!["first_name".to_string()],
        })
        .expect("template");
    templates
        .upsert(MessageTemplate {
            template_id: "tpl-followup".to_string(),
            name: "Follow up".to_string(),
            content: "Ainda interessado?".to_string(),
            variables: Vec::new(),
        })
        .expect("template");

    let tenants = Arc::new(TenantCatalog::new());
    tenants
        .upsert(TenantConfig {
            tenant_id: "acme".to_string(),
            provider: "mock".to_string(),
            rate_limits: ceilings,
            business_hours: business_hours(),
        })
        .expect("tenant");

    leads.upsert(lead("lead-1", "5511912345678"));
    leads.upsert(lead("lead-2", "5511912345679"));

    let mut providers: BTreeMap<String, Arc<dyn ProviderAdapter>> = BTreeMap::new();
    providers.insert("mock".to_string(), provider.clone());

    let dispatcher = Dispatcher {
        runs: runs.clone(),
        messages: messages.clone(),
        sequences: sequences.clone(),
        templates,
        tenants: tenants.clone(),
        leads,
        providers,
        rate_limiter: RateLimiter::new(Arc::new(InMemoryRateCounterStore::new())),
        retry: DispatchRetryPolicy::default(),
    };
    let wake = Arc::new(Notify::new());
    let scheduler = Scheduler::new(
        dispatcher.clone(),
        runs.clone(),
        SchedulerConfig {
            poll_interval_ms: 5_000,
            batch_limit: 16,
        },
        wake.clone(),
    );
    let trigger_listener = TriggerListener::new(
        sequences,
        tenants,
        RunManager::new(runs.clone() as Arc<dyn RunStore>),
        wake,
    );

    Stack {
        dispatcher,
        scheduler,
        trigger_listener,
        runs,
        messages,
        provider,
    }
}

fn lead_created(lead_id: &str) -> TriggerEvent {
    TriggerEvent {
        tenant_id: "acme".to_string(),
        lead_id: lead_id.to_string(),
        trigger: TriggerKind::OnLeadCreated,
        sequence_id: None,
    }
}

#[tokio::test]
async fn friday_evening_trigger_waits_for_monday_morning() {
    let stack = stack(RateLimitCeilings::default(), true);

    let report = stack
        .trigger_listener
        .handle_trigger(&lead_created("lead-1"), FRIDAY_EVENING);
    assert_eq!(report.started, 1);

    let run = &stack.runs.list_active_for_lead("acme", "lead-1")[0];
    assert_eq!(run.next_fire_at_unix_ms, Some(MONDAY_OPEN));

    // Nothing is due over the weekend.
    let saturday = FRIDAY_EVENING + 18 * 3_600_000;
    let report = stack.scheduler.poll_once(saturday).await.expect("poll");
    assert_eq!(report.due, 0);

    // Monday 09:00 the greeting goes out and the follow-up is scheduled.
    let report = stack.scheduler.poll_once(MONDAY_OPEN).await.expect("poll");
    assert_eq!(report.due, 1);
    assert_eq!(report.advanced, 1);
    let sends = stack.provider.sends();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].body, "Oi Ana!");

    let run = stack.runs.get(&run.run_id).expect("run");
    assert_eq!(run.current_step_index, 1);
    assert_eq!(
        run.next_fire_at_unix_ms,
        Some(MONDAY_OPEN + 48 * 3_600_000)
    );
}

#[tokio::test]
async fn transient_outage_recovers_across_polls() {
    let stack = stack(RateLimitCeilings::default(), false);
    stack.provider.script_transient_failure("provider_unavailable");
    stack.provider.script_transient_failure("provider_unavailable");

    stack
        .trigger_listener
        .handle_trigger(&lead_created("lead-1"), TUESDAY_AFTERNOON);
    let run_id = stack.runs.list_active_for_lead("acme", "lead-1")[0]
        .run_id
        .clone();

    let mut at = TUESDAY_AFTERNOON;
    for _ in 0..2 {
        let report = stack.scheduler.poll_once(at).await.expect("poll");
        assert_eq!(report.retries, 1);
        at = stack
            .runs
            .get(&run_id)
            .expect("run")
            .next_fire_at_unix_ms
            .expect("scheduled");
    }

    let report = stack.scheduler.poll_once(at).await.expect("poll");
    assert_eq!(report.advanced, 1);

    // Both failed attempts stay on the log next to the send that landed.
    assert_eq!(
        stack.messages.count_with_status(&run_id, MessageStatus::Failed),
        2
    );
    assert_eq!(
        stack.messages.count_with_status(&run_id, MessageStatus::Sent),
        1
    );
    assert_eq!(stack.provider.sends().len(), 1);
}

#[tokio::test]
async fn concurrent_workers_send_each_step_once() {
    let stack = stack(RateLimitCeilings::default(), false);
    stack
        .trigger_listener
        .handle_trigger(&lead_created("lead-1"), TUESDAY_AFTERNOON);

    // Two workers read the same due snapshot before either dispatches.
    let snapshot = stack.runs.list_due(TUESDAY_AFTERNOON, 16)[0].clone();
    let worker_a = stack.dispatcher.clone();
    let worker_b = stack.dispatcher.clone();

    let first = worker_a
        .dispatch_run(&snapshot, TUESDAY_AFTERNOON)
        .await
        .expect("dispatch");
    let second = worker_b
        .dispatch_run(&snapshot, TUESDAY_AFTERNOON)
        .await
        .expect("dispatch");

    assert!(matches!(first, DispatchOutcome::Advanced { .. }));
    assert_eq!(second, DispatchOutcome::ClaimLost);
    assert_eq!(stack.provider.sends().len(), 1);
    assert_eq!(stack.messages.list_for_run(&snapshot.run_id).len(), 1);
}

#[tokio::test]
async fn rate_ceiling_defers_the_second_lead_to_the_next_window() {
    let stack = stack(
        RateLimitCeilings {
            per_second: 1,
            per_minute: 0,
            per_hour: 0,
        },
        false,
    );
    stack
        .trigger_listener
        .handle_trigger(&lead_created("lead-1"), TUESDAY_AFTERNOON);
    stack
        .trigger_listener
        .handle_trigger(&lead_created("lead-2"), TUESDAY_AFTERNOON);

    let report = stack
        .scheduler
        .poll_once(TUESDAY_AFTERNOON)
        .await
        .expect("poll");
    assert_eq!(report.due, 2);
    assert_eq!(report.advanced, 1);
    assert_eq!(report.rate_limited, 1);
    assert_eq!(stack.provider.sends().len(), 1);

    // The deferred run comes back in the next second's window.
    let report = stack
        .scheduler
        .poll_once(TUESDAY_AFTERNOON + 1_000)
        .await
        .expect("poll");
    assert_eq!(report.advanced, 1);
    assert_eq!(stack.provider.sends().len(), 2);

    // One log entry per lead for the first step, none duplicated by the
    // deferral.
    for run in stack.runs.list_due(TUESDAY_AFTERNOON + 72 * 3_600_000, 16) {
        assert_eq!(
            stack
                .messages
                .count_with_status(&run.run_id, MessageStatus::Sent),
            1
        );
        assert_eq!(stack.messages.list_for_run(&run.run_id).len(), 1);
    }
}

#[tokio::test]
async fn deactivating_a_sequence_cancels_its_live_runs() {
    let stack = stack(RateLimitCeilings::default(), false);
    stack
        .trigger_listener
        .handle_trigger(&lead_created("lead-1"), TUESDAY_AFTERNOON);
    let run_id = stack.runs.list_active_for_lead("acme", "lead-1")[0]
        .run_id
        .clone();

    let mut retired = welcome_sequence(false);
    retired.active = false;
    stack.dispatcher.sequences.upsert(retired).expect("sequence");

    let report = stack
        .scheduler
        .poll_once(TUESDAY_AFTERNOON)
        .await
        .expect("poll");
    assert_eq!(report.cancelled, 1);
    let run = stack.runs.get(&run_id).expect("run");
    assert_eq!(run.status, RunStatus::Cancelled);
    assert_eq!(run.status_reason.as_deref(), Some("sequence_inactive"));
    assert!(stack.provider.sends().is_empty());
}
