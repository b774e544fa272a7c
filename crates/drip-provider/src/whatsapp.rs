use std::time::Duration;

use async_trait::async_trait;
use reqwest::redirect::Policy;
use serde_json::{json, Value};

use crate::adapter::{ProviderAdapter, SendReceipt};
use crate::error::{classify_provider_status, truncate_detail, ProviderError};

pub const WHATSAPP_CLOUD_PROVIDER: &str = "whatsapp_cloud";

#[derive(Debug, Clone)]
/// Connection settings for the WhatsApp Cloud API.
pub struct WhatsappCloudConfig {
    pub api_base: String,
    pub access_token: String,
    /// Business line id; forms the `/{phone_number_id}/messages` path.
    pub phone_number_id: String,
    pub http_timeout_ms: u64,
}

impl Default for WhatsappCloudConfig {
    fn default() -> Self {
        Self {
            api_base: "https://graph.facebook.com/v20.0".to_string(),
            access_token: String::new(),
            phone_number_id: String::new(),
            http_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WhatsappCloudAdapter {
    config: WhatsappCloudConfig,
    client: reqwest::Client,
}

impl WhatsappCloudAdapter {
    pub fn new(config: WhatsappCloudConfig) -> anyhow::Result<Self> {
        anyhow::ensure!(
            !config.access_token.trim().is_empty(),
            "whatsapp cloud access token must be configured"
        );
        anyhow::ensure!(
            !config.phone_number_id.trim().is_empty(),
            "whatsapp cloud phone number id must be configured"
        );
        anyhow::ensure!(
            config.http_timeout_ms > 0,
            "whatsapp cloud http timeout must be greater than 0"
        );
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .redirect(Policy::none())
            .build()
            .map_err(|error| anyhow::anyhow!("failed to build whatsapp http client: {error}"))?;
        Ok(Self { config, client })
    }

    fn messages_endpoint(&self) -> String {
        format!(
            "{}/{}/messages",
            self.config.api_base.trim_end_matches('/'),
            self.config.phone_number_id
        )
    }
}

#[async_trait]
impl ProviderAdapter for WhatsappCloudAdapter {
    fn name(&self) -> &'static str {
        WHATSAPP_CLOUD_PROVIDER
    }

    async fn send_text(&self, to_phone: &str, body: &str) -> Result<SendReceipt, ProviderError> {
        let endpoint = self.messages_endpoint();
        let request_body = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to_phone,
            "type": "text",
            "text": { "body": body },
        });

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.config.access_token)
            .json(&request_body)
            .send()
            .await
            .map_err(|error| {
                ProviderError::transient(
                    "provider_network_error",
                    format!("request to {endpoint} failed: {error}"),
                )
            })?;

        let status = response.status();
        let body_raw = response.text().await.unwrap_or_default();
        if !status.is_success() {
            let (reason_code, retryable) = classify_provider_status(status);
            let error = ProviderError {
                reason_code: reason_code.to_string(),
                detail: truncate_detail(&body_raw),
                retryable,
                http_status: Some(status.as_u16()),
            };
            return Err(error);
        }

        let body_json = serde_json::from_str::<Value>(&body_raw).unwrap_or(Value::Null);
        let provider_message_id = body_json
            .get("messages")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(|item| item.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                ProviderError::permanent(
                    "provider_missing_message_id",
                    format!(
                        "success response lacked messages[0].id: {}",
                        truncate_detail(&body_raw)
                    ),
                )
                .with_http_status(status.as_u16())
            })?;

        Ok(SendReceipt {
            provider_message_id,
        })
    }
}
