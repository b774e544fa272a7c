use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Direction of a message-log entry.
pub enum MessageDirection {
    Outbound,
    Inbound,
}

impl MessageDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Outbound => "outbound",
            Self::Inbound => "inbound",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Delivery state of a message-log entry.
///
/// The legal machine is
/// `pending → queued → sent → delivered → read`, with `queued → failed`
/// for attempts the provider never accepted and `sent-or-later → replied`
/// once the lead answers. Transitions are forward-only; replays of stale
/// webhooks must be no-ops.
pub enum MessageStatus {
    Pending,
    Queued,
    Sent,
    Delivered,
    Read,
    Failed,
    Replied,
}

impl MessageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
            Self::Replied => "replied",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Replied)
    }

    /// Whether the provider accepted the send; replies may attach to any
    /// such entry even when delivery receipts were lost in transit.
    pub fn is_sent_or_later(self) -> bool {
        matches!(self, Self::Sent | Self::Delivered | Self::Read | Self::Replied)
    }

    /// Legal forward transitions. Everything else (including repeats) is a
    /// regression or duplicate and must be ignored by callers.
    pub fn can_transition_to(self, next: MessageStatus) -> bool {
        match next {
            Self::Queued => self == Self::Pending,
            Self::Sent => self == Self::Queued,
            Self::Failed => matches!(self, Self::Pending | Self::Queued),
            Self::Delivered => self == Self::Sent,
            Self::Read => matches!(self, Self::Sent | Self::Delivered),
            Self::Replied => matches!(self, Self::Sent | Self::Delivered | Self::Read),
            Self::Pending => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Durable record of a single send/receive attempt.
///
/// One entry exists per attempt, not per logical message; a step retried
/// twice leaves two failed entries plus the final sent one. Entries are
/// append-only.
pub struct MessageLogEntry {
    pub entry_id: String,
    pub tenant_id: String,
    pub lead_id: String,
    pub direction: MessageDirection,
    pub provider: String,
    pub status: MessageStatus,
    pub rendered_text: String,
    /// Set for outbound entries dispatched from a sequence run.
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub step_index: Option<usize>,
    /// 1-based attempt counter within the owning (run, step).
    #[serde(default)]
    pub attempt: u32,
    /// Assigned by the provider once the send is accepted.
    #[serde(default)]
    pub provider_message_id: Option<String>,
    #[serde(default)]
    pub sent_unix_ms: Option<u64>,
    #[serde(default)]
    pub delivered_unix_ms: Option<u64>,
    #[serde(default)]
    pub replied_unix_ms: Option<u64>,
    #[serde(default)]
    pub error_reason_code: Option<String>,
    #[serde(default)]
    pub error_detail: Option<String>,
    pub created_unix_ms: u64,
}

impl MessageLogEntry {
    /// New outbound attempt for a claimed (run, step), not yet handed to a
    /// worker.
    pub fn outbound_attempt(
        entry_id: String,
        tenant_id: String,
        lead_id: String,
        provider: String,
        rendered_text: String,
        run_id: String,
        step_index: usize,
        attempt: u32,
        now_unix_ms: u64,
    ) -> Self {
        Self {
            entry_id,
            tenant_id,
            lead_id,
            direction: MessageDirection::Outbound,
            provider,
            status: MessageStatus::Pending,
            rendered_text,
            run_id: Some(run_id),
            step_index: Some(step_index),
            attempt,
            provider_message_id: None,
            sent_unix_ms: None,
            delivered_unix_ms: None,
            replied_unix_ms: None,
            error_reason_code: None,
            error_detail: None,
            created_unix_ms: now_unix_ms,
        }
    }

    /// Inbound entry for a message received from a lead's phone number.
    pub fn inbound(
        entry_id: String,
        tenant_id: String,
        lead_id: String,
        provider: String,
        body: String,
        provider_message_id: Option<String>,
        now_unix_ms: u64,
    ) -> Self {
        Self {
            entry_id,
            tenant_id,
            lead_id,
            direction: MessageDirection::Inbound,
            provider,
            status: MessageStatus::Delivered,
            rendered_text: body,
            run_id: None,
            step_index: None,
            attempt: 0,
            provider_message_id,
            sent_unix_ms: None,
            delivered_unix_ms: Some(now_unix_ms),
            replied_unix_ms: None,
            error_reason_code: None,
            error_detail: None,
            created_unix_ms: now_unix_ms,
        }
    }
}
