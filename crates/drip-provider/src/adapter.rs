use async_trait::async_trait;

use crate::error::ProviderError;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Provider acknowledgement of an accepted send.
pub struct SendReceipt {
    /// Provider-assigned message id; the key later delivery receipts carry.
    pub provider_message_id: String,
}

/// Transport seam between the dispatch engine and a messaging provider.
///
/// Implementations must be safe to share across workers; the engine holds
/// them behind `Arc<dyn ProviderAdapter>` keyed by the tenant's provider
/// label.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable label this adapter registers under, e.g. `whatsapp_cloud`.
    fn name(&self) -> &'static str;

    /// Delivers one text message to a normalized phone number.
    async fn send_text(&self, to_phone: &str, body: &str) -> Result<SendReceipt, ProviderError>;
}
