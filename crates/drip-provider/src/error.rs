use reqwest::StatusCode;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Structured send failure surfaced to the dispatch engine.
///
/// `retryable` drives the engine's transient/terminal split: retryable
/// failures consume an attempt and reschedule, terminal ones fail the step
/// outright.
pub struct ProviderError {
    pub reason_code: String,
    pub detail: String,
    pub retryable: bool,
    pub http_status: Option<u16>,
}

impl ProviderError {
    pub fn transient(reason_code: &str, detail: impl Into<String>) -> Self {
        Self {
            reason_code: reason_code.to_string(),
            detail: detail.into(),
            retryable: true,
            http_status: None,
        }
    }

    pub fn permanent(reason_code: &str, detail: impl Into<String>) -> Self {
        Self {
            reason_code: reason_code.to_string(),
            detail: detail.into(),
            retryable: false,
            http_status: None,
        }
    }

    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "reason_code={} retryable={} http_status={} detail={}",
            self.reason_code,
            self.retryable,
            self.http_status
                .map(|status| status.to_string())
                .unwrap_or_else(|| "none".to_string()),
            self.detail
        )
    }
}

impl std::error::Error for ProviderError {}

/// Maps a non-success provider HTTP status to (reason code, retryable).
///
/// 429 and 5xx are worth retrying; other 4xx responses mean the request
/// itself is bad and repeating it cannot help.
pub fn classify_provider_status(status: StatusCode) -> (&'static str, bool) {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return ("provider_rate_limited", true);
    }
    if status.is_server_error() {
        return ("provider_unavailable", true);
    }
    if status.is_client_error() {
        return ("provider_request_rejected", false);
    }
    ("provider_unknown_http_failure", true)
}

/// Caps provider response bodies kept in error details and logs.
pub fn truncate_detail(raw: &str) -> String {
    const LIMIT: usize = 512;
    let trimmed = raw.trim();
    if trimmed.chars().count() <= LIMIT {
        return trimmed.to_string();
    }
    let mut output: String = trimmed.chars().take(LIMIT).collect();
    output.push_str("…(truncated)");
    output
}
