//! WhatsApp Cloud webhook normalization.
//!
//! One webhook POST can batch several entries, each carrying inbound
//! messages and/or delivery statuses. Parsing walks the full
//! `entry[].changes[].value` envelope and flattens it into normalized
//! events; malformed payloads surface a reason-coded error so the HTTP
//! layer can log and acknowledge without retry loops from the provider.

use std::fmt::{Display, Formatter};

use drip_contract::{
    validate_inbound_message, validate_status_update, InboundMessage, MessageStatus, StatusUpdate,
};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookParseReasonCode {
    InvalidJson,
    MissingPayload,
    MissingField,
    InvalidFieldType,
    InvalidTimestamp,
    UnsupportedStatus,
    InvalidNormalizedEvent,
}

impl WebhookParseReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidJson => "invalid_json",
            Self::MissingPayload => "missing_payload",
            Self::MissingField => "missing_field",
            Self::InvalidFieldType => "invalid_field_type",
            Self::InvalidTimestamp => "invalid_timestamp",
            Self::UnsupportedStatus => "unsupported_status",
            Self::InvalidNormalizedEvent => "invalid_normalized_event",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookParseError {
    pub code: WebhookParseReasonCode,
    pub message: String,
}

impl Display for WebhookParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for WebhookParseError {}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Flattened contents of one webhook POST.
pub struct WebhookEvents {
    /// Business line identifier from `metadata.phone_number_id`.
    pub phone_number_id: String,
    pub inbound: Vec<InboundMessage>,
    pub statuses: Vec<StatusUpdate>,
}

/// Parses a raw WhatsApp Cloud webhook body into normalized events.
pub fn parse_webhook_payload(raw: &str) -> Result<WebhookEvents, WebhookParseError> {
    let value: Value = serde_json::from_str(raw).map_err(|error| {
        parse_error(
            WebhookParseReasonCode::InvalidJson,
            format!("webhook body is not valid JSON: {error}"),
        )
    })?;
    parse_webhook_value(&value)
}

pub fn parse_webhook_value(payload: &Value) -> Result<WebhookEvents, WebhookParseError> {
    let root = as_object(
        payload,
        WebhookParseReasonCode::MissingPayload,
        "webhook payload must be a JSON object",
    )?;
    let entries = array_field(root, "entry", "entry")?;

    let mut events = WebhookEvents::default();
    for (entry_index, entry) in entries.iter().enumerate() {
        let entry = as_object(
            entry,
            WebhookParseReasonCode::InvalidFieldType,
            &format!("entry[{entry_index}] must be an object"),
        )?;
        let changes = array_field(entry, "changes", &format!("entry[{entry_index}].changes"))?;
        for (change_index, change) in changes.iter().enumerate() {
            let field_name = format!("entry[{entry_index}].changes[{change_index}]");
            let change = as_object(
                change,
                WebhookParseReasonCode::InvalidFieldType,
                &format!("{field_name} must be an object"),
            )?;
            let value = object_field(change, "value", &format!("{field_name}.value"))?;
            collect_change_value(value, &format!("{field_name}.value"), &mut events)?;
        }
    }
    Ok(events)
}

fn collect_change_value(
    value: &Map<String, Value>,
    field_name: &str,
    events: &mut WebhookEvents,
) -> Result<(), WebhookParseError> {
    let metadata = object_field(value, "metadata", &format!("{field_name}.metadata"))?;
    let phone_number_id = required_string_field(
        metadata,
        "phone_number_id",
        &format!("{field_name}.metadata.phone_number_id"),
    )?;
    if events.phone_number_id.is_empty() {
        events.phone_number_id = phone_number_id.clone();
    }

    if let Some(messages) = value.get("messages") {
        let rows = messages.as_array().ok_or_else(|| {
            parse_error(
                WebhookParseReasonCode::InvalidFieldType,
                format!("{field_name}.messages must be an array"),
            )
        })?;
        for (index, row) in rows.iter().enumerate() {
            events.inbound.push(parse_message(
                row,
                &phone_number_id,
                &format!("{field_name}.messages[{index}]"),
            )?);
        }
    }

    if let Some(statuses) = value.get("statuses") {
        let rows = statuses.as_array().ok_or_else(|| {
            parse_error(
                WebhookParseReasonCode::InvalidFieldType,
                format!("{field_name}.statuses must be an array"),
            )
        })?;
        for (index, row) in rows.iter().enumerate() {
            events
                .statuses
                .push(parse_status(row, &format!("{field_name}.statuses[{index}]"))?);
        }
    }
    Ok(())
}

fn parse_message(
    row: &Value,
    phone_number_id: &str,
    field_name: &str,
) -> Result<InboundMessage, WebhookParseError> {
    let message = as_object(
        row,
        WebhookParseReasonCode::InvalidFieldType,
        &format!("{field_name} must be an object"),
    )?;
    let timestamp_secs = required_u64_field(message, "timestamp", &format!("{field_name}.timestamp"))?;
    let body = message
        .get("text")
        .and_then(Value::as_object)
        .and_then(|text| optional_string_field(text, "body"))
        .unwrap_or_default();

    let inbound = InboundMessage {
        provider_event_id: required_string_field(message, "id", &format!("{field_name}.id"))?,
        from: required_string_field(message, "from", &format!("{field_name}.from"))?,
        to: phone_number_id.to_string(),
        body,
        timestamp_unix_ms: timestamp_secs.saturating_mul(1000),
    };
    validate_inbound_message(&inbound).map_err(|error| {
        parse_error(
            WebhookParseReasonCode::InvalidNormalizedEvent,
            format!("{field_name}: {error}"),
        )
    })?;
    Ok(inbound)
}

fn parse_status(row: &Value, field_name: &str) -> Result<StatusUpdate, WebhookParseError> {
    let status_row = as_object(
        row,
        WebhookParseReasonCode::InvalidFieldType,
        &format!("{field_name} must be an object"),
    )?;
    let raw_status =
        required_string_field(status_row, "status", &format!("{field_name}.status"))?;
    let status = match raw_status.as_str() {
        "sent" => MessageStatus::Sent,
        "delivered" => MessageStatus::Delivered,
        "read" => MessageStatus::Read,
        "failed" => MessageStatus::Failed,
        other => {
            return Err(parse_error(
                WebhookParseReasonCode::UnsupportedStatus,
                format!("{field_name}.status '{other}' is not a delivery status"),
            ))
        }
    };
    let timestamp_secs =
        required_u64_field(status_row, "timestamp", &format!("{field_name}.timestamp"))?;

    let update = StatusUpdate {
        provider_message_id: required_string_field(status_row, "id", &format!("{field_name}.id"))?,
        status,
        timestamp_unix_ms: timestamp_secs.saturating_mul(1000),
    };
    validate_status_update(&update).map_err(|error| {
        parse_error(
            WebhookParseReasonCode::InvalidNormalizedEvent,
            format!("{field_name}: {error}"),
        )
    })?;
    Ok(update)
}

fn as_object<'a>(
    value: &'a Value,
    code: WebhookParseReasonCode,
    detail: &str,
) -> Result<&'a Map<String, Value>, WebhookParseError> {
    value.as_object().ok_or_else(|| parse_error(code, detail))
}

fn object_field<'a>(
    parent: &'a Map<String, Value>,
    key: &str,
    field_name: &str,
) -> Result<&'a Map<String, Value>, WebhookParseError> {
    let value = parent.get(key).ok_or_else(|| {
        parse_error(
            WebhookParseReasonCode::MissingField,
            format!("{field_name} is required"),
        )
    })?;
    as_object(
        value,
        WebhookParseReasonCode::InvalidFieldType,
        &format!("{field_name} must be an object"),
    )
}

fn array_field<'a>(
    parent: &'a Map<String, Value>,
    key: &str,
    field_name: &str,
) -> Result<&'a Vec<Value>, WebhookParseError> {
    parent
        .get(key)
        .ok_or_else(|| {
            parse_error(
                WebhookParseReasonCode::MissingField,
                format!("{field_name} is required"),
            )
        })?
        .as_array()
        .ok_or_else(|| {
            parse_error(
                WebhookParseReasonCode::InvalidFieldType,
                format!("{field_name} must be an array"),
            )
        })
}

fn required_string_field(
    object: &Map<String, Value>,
    key: &str,
    field_name: &str,
) -> Result<String, WebhookParseError> {
    let parsed = match object.get(key) {
        Some(Value::String(raw)) => Some(raw.trim().to_string()),
        Some(Value::Number(raw)) => Some(raw.to_string()),
        _ => None,
    };
    let Some(parsed) = parsed else {
        return Err(parse_error(
            WebhookParseReasonCode::MissingField,
            format!("{field_name} is required"),
        ));
    };
    if parsed.is_empty() {
        return Err(parse_error(
            WebhookParseReasonCode::MissingField,
            format!("{field_name} cannot be empty"),
        ));
    }
    Ok(parsed)
}

fn required_u64_field(
    object: &Map<String, Value>,
    key: &str,
    field_name: &str,
) -> Result<u64, WebhookParseError> {
    let parsed = match object.get(key) {
        Some(Value::Number(raw)) => raw.as_u64(),
        Some(Value::String(raw)) => raw.trim().parse::<u64>().ok(),
        _ => None,
    };
    let Some(parsed) = parsed else {
        return Err(parse_error(
            WebhookParseReasonCode::InvalidTimestamp,
            format!("{field_name} is required"),
        ));
    };
    if parsed == 0 {
        return Err(parse_error(
            WebhookParseReasonCode::InvalidTimestamp,
            format!("{field_name} must be greater than 0"),
        ));
    }
    Ok(parsed)
}

fn optional_string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key) {
        Some(Value::String(raw)) => Some(raw.trim().to_string()),
        _ => None,
    }
}

fn parse_error(
    code: WebhookParseReasonCode,
    message: impl Into<String>,
) -> WebhookParseError {
    WebhookParseError {
        code,
        message: message.into(),
    }
}
