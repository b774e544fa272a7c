mod config;
mod http;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use tokio::sync::Notify;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use drip_contract::events::LeadActivityEvent;
use drip_engine::{
    ActivitySink, Dispatcher, DispatchRetryPolicy, RateLimiter, ReplyProcessor,
    ReplyProcessorConfig, RunManager, Scheduler, SchedulerConfig, TriggerListener,
};
use drip_provider::{
    MockProvider, ProviderAdapter, WhatsappCloudAdapter, WHATSAPP_CLOUD_PROVIDER,
};
use drip_store::{
    InMemoryMessageLogStore, InMemoryRateCounterStore, InMemoryRunStore, LeadDirectory,
    MessageLogStore, RateCounterStore, RunStore,
};

use crate::config::{build_catalogs, load_workspace_config, WorkspaceConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CliProviderMode {
    /// In-process adapter that records sends; for local runs and demos.
    Mock,
    /// Real WhatsApp Cloud API adapter; needs credentials in the config file.
    WhatsappCloud,
}

impl CliProviderMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::WhatsappCloud => "whatsapp-cloud",
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "drip",
    about = "Automation sequence scheduler and WhatsApp dispatch runner",
    version
)]
struct Cli {
    #[arg(
        long,
        env = "DRIP_CONFIG",
        default_value = "drip.json",
        help = "Path to the workspace JSON config (tenants, templates, sequences, leads)"
    )]
    config: PathBuf,

    #[arg(
        long = "state-dir",
        env = "DRIP_STATE_DIR",
        default_value = ".drip",
        help = "Directory for runtime state files (webhook dedupe survives restarts)"
    )]
    state_dir: PathBuf,

    #[arg(
        long,
        env = "DRIP_BIND",
        default_value = "127.0.0.1:8787",
        help = "Bind address for the webhook/trigger HTTP endpoints"
    )]
    bind: String,

    #[arg(
        long = "poll-interval-ms",
        env = "DRIP_POLL_INTERVAL_MS",
        default_value_t = 5_000,
        help = "Scheduler poll interval in milliseconds"
    )]
    poll_interval_ms: u64,

    #[arg(
        long = "batch-limit",
        env = "DRIP_BATCH_LIMIT",
        default_value_t = 16,
        help = "Maximum due runs dispatched per scheduler poll"
    )]
    batch_limit: usize,

    #[arg(
        long = "provider-mode",
        env = "DRIP_PROVIDER_MODE",
        value_enum,
        default_value_t = CliProviderMode::Mock,
        help = "Outbound provider adapter to wire in"
    )]
    provider_mode: CliProviderMode,

    #[arg(
        long = "pause-on-reply",
        env = "DRIP_PAUSE_ON_REPLY",
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Pause a lead's active runs when they reply"
    )]
    pause_on_reply: bool,
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

/// Emits lead activity as report lines until a CRM callback is wired in.
struct StdoutActivitySink;

impl ActivitySink for StdoutActivitySink {
    fn record(&self, event: LeadActivityEvent) {
        println!(
            "lead activity: tenant={} lead={} activity={} at_unix_ms={}",
            event.tenant_id,
            event.lead_id,
            event.activity.as_str(),
            event.occurred_unix_ms
        );
    }
}

fn build_providers(
    mode: CliProviderMode,
    config: &WorkspaceConfig,
) -> Result<BTreeMap<String, Arc<dyn ProviderAdapter>>> {
    let mut providers: BTreeMap<String, Arc<dyn ProviderAdapter>> = BTreeMap::new();
    match mode {
        CliProviderMode::Mock => {
            // One shared mock instance answers for every label tenants use.
            let mock: Arc<dyn ProviderAdapter> = Arc::new(MockProvider::new());
            providers.insert("mock".to_string(), Arc::clone(&mock));
            for tenant in &config.tenants {
                providers
                    .entry(tenant.provider.clone())
                    .or_insert_with(|| Arc::clone(&mock));
            }
        }
        CliProviderMode::WhatsappCloud => {
            let Some(credentials) = &config.whatsapp else {
                bail!("provider mode whatsapp-cloud requires a `whatsapp` credentials block in the config file");
            };
            let adapter = WhatsappCloudAdapter::new(credentials.to_provider_config())
                .context("invalid whatsapp cloud credentials")?;
            providers.insert(
                WHATSAPP_CLOUD_PROVIDER.to_string(),
                Arc::new(adapter) as Arc<dyn ProviderAdapter>,
            );
        }
    }

    for tenant in &config.tenants {
        if !providers.contains_key(&tenant.provider) {
            bail!(
                "tenant references a provider with no adapter: tenant={} provider={}",
                tenant.tenant_id,
                tenant.provider
            );
        }
    }
    Ok(providers)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let workspace = load_workspace_config(&cli.config)?;
    let catalogs = build_catalogs(&workspace)?;
    let providers = build_providers(cli.provider_mode, &workspace)?;

    let runs: Arc<dyn RunStore> = Arc::new(InMemoryRunStore::new());
    let messages: Arc<dyn MessageLogStore> = Arc::new(InMemoryMessageLogStore::new());
    let rate_store: Arc<dyn RateCounterStore> = Arc::new(InMemoryRateCounterStore::new());
    let leads: Arc<dyn LeadDirectory> = Arc::clone(&catalogs.leads) as Arc<dyn LeadDirectory>;

    let dispatcher = Dispatcher {
        runs: Arc::clone(&runs),
        messages: Arc::clone(&messages),
        sequences: Arc::clone(&catalogs.sequences),
        templates: Arc::clone(&catalogs.templates),
        tenants: Arc::clone(&catalogs.tenants),
        leads: Arc::clone(&leads),
        providers,
        rate_limiter: RateLimiter::new(rate_store),
        retry: DispatchRetryPolicy::default(),
    };

    let wake = Arc::new(Notify::new());
    let scheduler = Scheduler::new(
        dispatcher,
        Arc::clone(&runs),
        SchedulerConfig {
            poll_interval_ms: cli.poll_interval_ms,
            batch_limit: cli.batch_limit,
        },
        Arc::clone(&wake),
    );

    let run_manager = RunManager::new(Arc::clone(&runs));
    let reply_processor = ReplyProcessor::new(
        Arc::clone(&messages),
        Arc::clone(&leads),
        Arc::clone(&catalogs.tenants),
        run_manager.clone(),
        Arc::new(StdoutActivitySink),
        ReplyProcessorConfig {
            pause_runs_on_reply: cli.pause_on_reply,
            state_path: Some(cli.state_dir.join("webhook-dedupe.json")),
            ..ReplyProcessorConfig::default()
        },
    );
    let trigger_listener = TriggerListener::new(
        Arc::clone(&catalogs.sequences),
        Arc::clone(&catalogs.tenants),
        run_manager,
        Arc::clone(&wake),
    );

    println!(
        "drip runner starting: tenants={} sequences={} templates={} leads={} provider_mode={}",
        workspace.tenants.len(),
        workspace.sequences.len(),
        workspace.templates.len(),
        workspace.leads.len(),
        cli.provider_mode.as_str()
    );

    let state = Arc::new(http::ServerState {
        reply_processor,
        trigger_listener,
    });
    tokio::try_join!(scheduler.run(), http::serve(&cli.bind, state))?;
    Ok(())
}
