use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::adapter::{ProviderAdapter, SendReceipt};
use crate::error::ProviderError;

#[derive(Debug, Clone, PartialEq, Eq)]
/// One recorded outbound send.
pub struct RecordedSend {
    pub to_phone: String,
    pub body: String,
    pub provider_message_id: String,
}

#[derive(Debug, Default)]
struct MockState {
    scripted_failures: VecDeque<ProviderError>,
    sends: Vec<RecordedSend>,
    next_id: u64,
}

/// In-process provider for tests and the local dry-run mode.
///
/// Sends succeed with deterministic `mock-N` message ids unless a failure
/// has been scripted; scripted failures are consumed in order, one per send
/// attempt.
#[derive(Debug, Default)]
pub struct MockProvider {
    state: Mutex<MockState>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_failure(&self, error: ProviderError) {
        if let Ok(mut state) = self.state.lock() {
            state.scripted_failures.push_back(error);
        }
    }

    pub fn script_transient_failure(&self, reason_code: &str) {
        self.script_failure(ProviderError::transient(reason_code, "scripted failure"));
    }

    pub fn script_permanent_failure(&self, reason_code: &str) {
        self.script_failure(ProviderError::permanent(reason_code, "scripted failure"));
    }

    /// Snapshot of every accepted send, in order.
    pub fn sends(&self) -> Vec<RecordedSend> {
        self.state
            .lock()
            .map(|state| state.sends.clone())
            .unwrap_or_default()
    }

    /// Builds the status-webhook payload the real provider would emit for a
    /// previously accepted send.
    pub fn status_webhook_payload(
        provider_message_id: &str,
        status: &str,
        timestamp_secs: u64,
    ) -> Value {
        json!({
            "entry": [{
                "changes": [{
                    "value": {
                        "metadata": { "phone_number_id": "mock-line" },
                        "statuses": [{
                            "id": provider_message_id,
                            "status": status,
                            "timestamp": timestamp_secs.to_string(),
                        }]
                    }
                }]
            }]
        })
    }

    /// Builds the inbound-message webhook payload for a lead reply.
    pub fn inbound_webhook_payload(
        provider_event_id: &str,
        from_phone: &str,
        body: &str,
        timestamp_secs: u64,
    ) -> Value {
        json!({
            "entry": [{
                "changes": [{
                    "value": {
                        "metadata": { "phone_number_id": "mock-line" },
                        "messages": [{
                            "id": provider_event_id,
                            "from": from_phone,
                            "timestamp": timestamp_secs.to_string(),
                            "text": { "body": body }
                        }]
                    }
                }]
            }]
        })
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn send_text(&self, to_phone: &str, body: &str) -> Result<SendReceipt, ProviderError> {
        let mut state = self.state.lock().map_err(|_| {
            ProviderError::transient("mock_lock_poisoned", "mock provider state lock poisoned")
        })?;
        if let Some(error) = state.scripted_failures.pop_front() {
            return Err(error);
        }
        state.next_id += 1;
        let provider_message_id = format!("mock-{}", state.next_id);
        state.sends.push(RecordedSend {
            to_phone: to_phone.to_string(),
            body: body.to_string(),
            provider_message_id: provider_message_id.clone(),
        });
        Ok(SendReceipt {
            provider_message_id,
        })
    }
}
