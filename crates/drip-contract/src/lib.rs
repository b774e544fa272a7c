//! Shared domain contract for the drip automation engine.
//!
//! Defines the sequence/step/run/message-log data model, tenant configuration
//! inputs, normalized webhook shapes, and the trigger/activity events exchanged
//! with external collaborators. Validation helpers enforce the structural
//! invariants (contiguous step order, monotonic message-status transitions,
//! well-formed templates) so downstream engine code only consumes well-formed
//! definitions.

pub mod events;
pub mod message;
pub mod run;
pub mod sequence;
pub mod template;
pub mod tenant;
pub mod webhook;

pub use events::{LeadActivity, LeadActivityEvent, TriggerEvent};
pub use message::{MessageDirection, MessageLogEntry, MessageStatus};
pub use run::{RunStatus, SequenceRun};
pub use sequence::{
    validate_sequence_definition, SequenceDefinition, SequenceStep, TriggerKind,
};
pub use template::{
    scan_placeholders, validate_template, MessageTemplate, Placeholder,
};
pub use tenant::{
    parse_time_of_day, validate_business_hours, BusinessHoursConfig, LeadProfile,
    RateLimitCeilings, TenantConfig, WEEKDAY_NAMES,
};
pub use webhook::{validate_inbound_message, validate_status_update, InboundMessage, StatusUpdate};
