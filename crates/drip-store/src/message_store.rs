use std::collections::BTreeMap;
use std::sync::Mutex;

use drip_contract::{MessageDirection, MessageLogEntry, MessageStatus};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageLogError {
    #[error("message log entry not found: {0}")]
    NotFound(String),
    #[error("duplicate message log entry id: {0}")]
    DuplicateEntry(String),
    #[error("message log internal error: {0}")]
    Internal(String),
}

/// Result of applying a provider status update to the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusAdvanceOutcome {
    /// The entry moved to the new status.
    Applied { entry_id: String, status: MessageStatus },
    /// The update arrived out of order and was dropped; the stored status
    /// already ranks at or past the incoming one.
    RegressionIgnored { entry_id: String, current: MessageStatus },
    /// No entry carries the provider message id.
    UnknownMessageId,
}

/// Append-only log of outbound attempts and inbound messages.
///
/// Entries never move backwards: `advance_status` consults the status
/// machine and reports regressions instead of applying them, so webhook
/// replays and out-of-order receipts are harmless.
pub trait MessageLogStore: Send + Sync {
    fn append(&self, entry: MessageLogEntry) -> Result<MessageLogEntry, MessageLogError>;

    fn get(&self, entry_id: &str) -> Option<MessageLogEntry>;

    /// The outbound entry recorded for a specific (run, step, attempt), if
    /// one exists. Lets the dispatcher reuse an entry across a rate-limit
    /// deferral instead of logging the same attempt twice.
    fn find_attempt_entry(
        &self,
        run_id: &str,
        step_index: usize,
        attempt: u32,
    ) -> Option<MessageLogEntry>;

    /// Moves a pending entry to queued. Idempotent: an entry already queued
    /// (from a deferred attempt) is returned unchanged.
    fn mark_queued(&self, entry_id: &str) -> Result<MessageLogEntry, MessageLogError>;

    /// Records a successful provider send, attaching the provider's id.
    fn mark_sent(
        &self,
        entry_id: &str,
        provider_message_id: &str,
        at_unix_ms: u64,
    ) -> Result<MessageLogEntry, MessageLogError>;

    fn mark_failed(
        &self,
        entry_id: &str,
        reason_code: &str,
        detail: &str,
    ) -> Result<MessageLogEntry, MessageLogError>;

    /// Applies a delivery receipt addressed by provider message id.
    fn advance_status(
        &self,
        provider_message_id: &str,
        status: MessageStatus,
        at_unix_ms: u64,
    ) -> Result<StatusAdvanceOutcome, MessageLogError>;

    fn mark_replied(&self, entry_id: &str, at_unix_ms: u64)
        -> Result<MessageLogEntry, MessageLogError>;

    /// Most recent outbound entry for the lead that has reached the wire
    /// (sent or later) and has not yet been marked replied. This is the
    /// entry an inbound reply attributes to.
    fn latest_open_outbound_for_lead(
        &self,
        tenant_id: &str,
        lead_id: &str,
    ) -> Option<MessageLogEntry>;

    fn list_for_run(&self, run_id: &str) -> Vec<MessageLogEntry>;

    fn count_with_status(&self, run_id: &str, status: MessageStatus) -> usize;
}

#[derive(Debug, Default)]
pub struct InMemoryMessageLogStore {
    inner: Mutex<BTreeMap<String, MessageLogEntry>>,
}

impl InMemoryMessageLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entry<T>(
        &self,
        entry_id: &str,
        apply: impl FnOnce(&mut MessageLogEntry) -> Result<T, MessageLogError>,
    ) -> Result<T, MessageLogError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| MessageLogError::Internal("message log lock poisoned".to_string()))?;
        let entry = inner
            .get_mut(entry_id)
            .ok_or_else(|| MessageLogError::NotFound(entry_id.to_string()))?;
        apply(entry)
    }
}

impl MessageLogStore for InMemoryMessageLogStore {
    fn append(&self, entry: MessageLogEntry) -> Result<MessageLogEntry, MessageLogError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| MessageLogError::Internal("message log lock poisoned".to_string()))?;
        if inner.contains_key(&entry.entry_id) {
            return Err(MessageLogError::DuplicateEntry(entry.entry_id));
        }
        inner.insert(entry.entry_id.clone(), entry.clone());
        Ok(entry)
    }

    fn get(&self, entry_id: &str) -> Option<MessageLogEntry> {
        self.inner.lock().ok()?.get(entry_id).cloned()
    }

    fn find_attempt_entry(
        &self,
        run_id: &str,
        step_index: usize,
        attempt: u32,
    ) -> Option<MessageLogEntry> {
        let inner = self.inner.lock().ok()?;
        inner
            .values()
            .find(|entry| {
                entry.direction == MessageDirection::Outbound
                    && entry.run_id.as_deref() == Some(run_id)
                    && entry.step_index == Some(step_index)
                    && entry.attempt == attempt
            })
            .cloned()
    }

    fn mark_queued(&self, entry_id: &str) -> Result<MessageLogEntry, MessageLogError> {
        self.with_entry(entry_id, |entry| {
            if entry.status == MessageStatus::Queued {
                return Ok(entry.clone());
            }
            if !entry.status.can_transition_to(MessageStatus::Queued) {
                return Err(MessageLogError::Internal(format!(
                    "cannot queue entry '{}' from status {}",
                    entry.entry_id,
                    entry.status.as_str()
                )));
            }
            entry.status = MessageStatus::Queued;
            Ok(entry.clone())
        })
    }

    fn mark_sent(
        &self,
        entry_id: &str,
        provider_message_id: &str,
        at_unix_ms: u64,
    ) -> Result<MessageLogEntry, MessageLogError> {
        self.with_entry(entry_id, |entry| {
            if !entry.status.can_transition_to(MessageStatus::Sent) {
                return Err(MessageLogError::Internal(format!(
                    "cannot mark entry '{}' sent from status {}",
                    entry.entry_id,
                    entry.status.as_str()
                )));
            }
            entry.status = MessageStatus::Sent;
            entry.provider_message_id = Some(provider_message_id.to_string());
            entry.sent_unix_ms = Some(at_unix_ms);
            Ok(entry.clone())
        })
    }

    fn mark_failed(
        &self,
        entry_id: &str,
        reason_code: &str,
        detail: &str,
    ) -> Result<MessageLogEntry, MessageLogError> {
        self.with_entry(entry_id, |entry| {
            if !entry.status.can_transition_to(MessageStatus::Failed) {
                return Err(MessageLogError::Internal(format!(
                    "cannot fail entry '{}' from status {}",
                    entry.entry_id,
                    entry.status.as_str()
                )));
            }
            entry.status = MessageStatus::Failed;
            entry.error_reason_code = Some(reason_code.to_string());
            entry.error_detail = Some(detail.to_string());
            Ok(entry.clone())
        })
    }

    fn advance_status(
        &self,
        provider_message_id: &str,
        status: MessageStatus,
        at_unix_ms: u64,
    ) -> Result<StatusAdvanceOutcome, MessageLogError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| MessageLogError::Internal("message log lock poisoned".to_string()))?;
        let Some(entry) = inner.values_mut().find(|entry| {
            entry.direction == MessageDirection::Outbound
                && entry.provider_message_id.as_deref() == Some(provider_message_id)
        }) else {
            return Ok(StatusAdvanceOutcome::UnknownMessageId);
        };
        if entry.status == status || !entry.status.can_transition_to(status) {
            return Ok(StatusAdvanceOutcome::RegressionIgnored {
                entry_id: entry.entry_id.clone(),
                current: entry.status,
            });
        }
        entry.status = status;
        if status == MessageStatus::Delivered {
            entry.delivered_unix_ms = Some(at_unix_ms);
        }
        Ok(StatusAdvanceOutcome::Applied {
            entry_id: entry.entry_id.clone(),
            status,
        })
    }

    fn mark_replied(
        &self,
        entry_id: &str,
        at_unix_ms: u64,
    ) -> Result<MessageLogEntry, MessageLogError> {
        self.with_entry(entry_id, |entry| {
            if entry.status == MessageStatus::Replied {
                return Ok(entry.clone());
            }
            if !entry.status.can_transition_to(MessageStatus::Replied) {
                return Err(MessageLogError::Internal(format!(
                    "cannot mark entry '{}' replied from status {}",
                    entry.entry_id,
                    entry.status.as_str()
                )));
            }
            entry.status = MessageStatus::Replied;
            entry.replied_unix_ms = Some(at_unix_ms);
            Ok(entry.clone())
        })
    }

    fn latest_open_outbound_for_lead(
        &self,
        tenant_id: &str,
        lead_id: &str,
    ) -> Option<MessageLogEntry> {
        let inner = self.inner.lock().ok()?;
        inner
            .values()
            .filter(|entry| {
                entry.direction == MessageDirection::Outbound
                    && entry.tenant_id == tenant_id
                    && entry.lead_id == lead_id
                    && entry.status.is_sent_or_later()
                    && entry.status != MessageStatus::Replied
            })
            .max_by_key(|entry| (entry.sent_unix_ms.unwrap_or(0), entry.entry_id.clone()))
            .cloned()
    }

    fn list_for_run(&self, run_id: &str) -> Vec<MessageLogEntry> {
        let Ok(inner) = self.inner.lock() else {
            return Vec::new();
        };
        let mut entries: Vec<MessageLogEntry> = inner
            .values()
            .filter(|entry| entry.run_id.as_deref() == Some(run_id))
            .cloned()
            .collect();
        entries.sort_by_key(|entry| (entry.created_unix_ms, entry.entry_id.clone()));
        entries
    }

    fn count_with_status(&self, run_id: &str, status: MessageStatus) -> usize {
        let Ok(inner) = self.inner.lock() else {
            return 0;
        };
        inner
            .values()
            .filter(|entry| entry.run_id.as_deref() == Some(run_id) && entry.status == status)
            .count()
    }
}
