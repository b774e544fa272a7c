//! HTTP surface of the runner: provider webhooks, trigger ingestion, health.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;

use drip_contract::events::TriggerEvent;
use drip_core::current_unix_timestamp_ms;
use drip_engine::{ReplyProcessor, TriggerListener};
use drip_provider::parse_webhook_payload;

/// Shared handler state for the runner's HTTP endpoints.
pub struct ServerState {
    pub reply_processor: ReplyProcessor,
    pub trigger_listener: TriggerListener,
}

pub fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/healthz", get(handle_healthz))
        .route("/webhooks/whatsapp", post(handle_whatsapp_webhook))
        .route("/triggers", post(handle_trigger))
        .with_state(state)
}

pub async fn serve(bind_addr: &str, state: Arc<ServerState>) -> Result<()> {
    let addr = bind_addr
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid bind address: {bind_addr}"))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    println!("dispatch api listening: addr={addr}");

    let app = build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("dispatch api server failed")
}

async fn handle_healthz() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// Accepts WhatsApp Cloud webhook deliveries.
///
/// Malformed payloads are acknowledged with 200 after logging; a non-2xx
/// would only make the provider redeliver the same broken body.
async fn handle_whatsapp_webhook(
    State(state): State<Arc<ServerState>>,
    body: String,
) -> (StatusCode, Json<serde_json::Value>) {
    let events = match parse_webhook_payload(&body) {
        Ok(events) => events,
        Err(error) => {
            eprintln!("webhook payload rejected: code={} message={}", error.code.as_str(), error.message);
            return (
                StatusCode::OK,
                Json(json!({ "status": "ignored", "reason": error.code.as_str() })),
            );
        }
    };

    let report = state
        .reply_processor
        .process_events(&events, current_unix_timestamp_ms());
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "statuses_applied": report.statuses_applied,
            "statuses_ignored": report.statuses_ignored,
            "statuses_unknown": report.statuses_unknown,
            "inbound_recorded": report.inbound_recorded,
            "inbound_duplicate": report.inbound_duplicate,
            "inbound_unmatched": report.inbound_unmatched,
            "replies_attributed": report.replies_attributed,
            "runs_paused": report.runs_paused,
        })),
    )
}

async fn handle_trigger(
    State(state): State<Arc<ServerState>>,
    Json(event): Json<TriggerEvent>,
) -> (StatusCode, Json<serde_json::Value>) {
    let report = state
        .trigger_listener
        .handle_trigger(&event, current_unix_timestamp_ms());
    let status = if report.errors > 0 && report.started == 0 && report.conflicts == 0 {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::OK
    };
    (
        status,
        Json(json!({
            "matched": report.matched,
            "started": report.started,
            "conflicts": report.conflicts,
            "errors": report.errors,
        })),
    )
}
