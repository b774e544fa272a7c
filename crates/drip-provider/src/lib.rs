//! Provider adapters for outbound sends and webhook normalization.
//!
//! The `ProviderAdapter` trait is the seam between the dispatch engine and a
//! concrete messaging provider. Send failures carry a structured error with a
//! stable reason code and a retryable flag so the engine can choose between
//! backoff and terminal failure without inspecting provider internals.

pub mod adapter;
pub mod error;
pub mod mock;
pub mod webhook_parse;
pub mod whatsapp;

pub use adapter::{ProviderAdapter, SendReceipt};
pub use error::{classify_provider_status, truncate_detail, ProviderError};
pub use mock::MockProvider;
pub use webhook_parse::{
    parse_webhook_payload, WebhookEvents, WebhookParseError, WebhookParseReasonCode,
};
pub use whatsapp::{WhatsappCloudAdapter, WhatsappCloudConfig, WHATSAPP_CLOUD_PROVIDER};
