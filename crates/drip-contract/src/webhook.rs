use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::message::MessageStatus;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Normalized inbound-message webhook payload.
pub struct InboundMessage {
    /// Provider-assigned event id; the dedupe key for redeliveries.
    pub provider_event_id: String,
    /// Sender phone number as the provider reported it (not yet normalized).
    pub from: String,
    /// Receiving business number or provider line identifier.
    pub to: String,
    pub body: String,
    pub timestamp_unix_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Normalized delivery-status webhook payload.
pub struct StatusUpdate {
    pub provider_message_id: String,
    pub status: MessageStatus,
    pub timestamp_unix_ms: u64,
}

pub fn validate_inbound_message(message: &InboundMessage) -> Result<()> {
    if message.provider_event_id.trim().is_empty() {
        bail!("inbound message provider_event_id must be non-empty");
    }
    if message.from.trim().is_empty() {
        bail!("inbound message 'from' must be non-empty");
    }
    if message.timestamp_unix_ms == 0 {
        bail!("inbound message timestamp must be set");
    }
    Ok(())
}

pub fn validate_status_update(update: &StatusUpdate) -> Result<()> {
    if update.provider_message_id.trim().is_empty() {
        bail!("status update provider_message_id must be non-empty");
    }
    if !matches!(
        update.status,
        MessageStatus::Sent
            | MessageStatus::Delivered
            | MessageStatus::Read
            | MessageStatus::Failed
    ) {
        bail!(
            "status update carries non-delivery status '{}'",
            update.status.as_str()
        );
    }
    Ok(())
}
