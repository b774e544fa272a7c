//! Scheduling and dispatch engine for drip sequences.
//!
//! The scheduler polls the run store for due runs and hands each to the
//! dispatcher, which claims the run, renders the step template, applies
//! rate limits and business-hours gating, and drives the provider send
//! with retry/backoff. Inbound webhook traffic flows through the reply
//! processor, which applies delivery receipts and attributes lead replies.

pub mod business_hours;
pub mod dispatcher;
pub mod rate_limiter;
pub mod reply_processor;
pub mod retry;
pub mod run_manager;
pub mod scheduler;
pub mod template;
pub mod trigger;

pub use business_hours::ResolvedBusinessHours;
pub use dispatcher::{Dispatcher, DispatchOutcome};
pub use rate_limiter::{RateLimitDecision, RateLimiter};
pub use reply_processor::{
    ActivitySink, NoopActivitySink, RecordingActivitySink, ReplyProcessor, ReplyProcessorConfig,
    WebhookProcessReport,
};
pub use retry::DispatchRetryPolicy;
pub use run_manager::{RunManager, RunStartError};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerPollReport};
pub use template::{render_template, TemplateRenderError};
pub use trigger::{TriggerListener, TriggerReport};
