//! HTTP receiver for gateway callbacks.
//!
//! The gateway POSTs session and acknowledgement events to `/webhook`; each
//! is translated into [`TransportEvent`]s and broadcast to subscribers.

use crate::config::WebhookConfig;
use crate::transport::{DeliveryState, MessageHandle, TransportEvent};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Shared state for the webhook routes.
#[derive(Clone)]
pub struct WebhookState {
    events: broadcast::Sender<TransportEvent>,
    bearer_token: Option<String>,
}

impl WebhookState {
    /// A blank bearer token disables the check.
    pub fn new(events: broadcast::Sender<TransportEvent>, bearer_token: Option<String>) -> Self {
        let bearer_token = bearer_token
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty());
        Self {
            events,
            bearer_token,
        }
    }
}

/// Translate one gateway callback body into transport events.
///
/// Returns `None` when the body is not a gateway event at all. Recognised
/// events that carry nothing of interest yield an empty list.
#[must_use]
pub fn parse_gateway_event(body: &serde_json::Value) -> Option<Vec<TransportEvent>> {
    let event = body.get("event")?.as_str()?;
    let payload = body.get("payload").unwrap_or(&serde_json::Value::Null);
    let text = |key: &str| {
        payload
            .get(key)
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .unwrap_or_default()
            .to_owned()
    };

    let events = match event {
        "session.status" => {
            let status = text("status");
            match status.to_ascii_uppercase().as_str() {
                "WORKING" => vec![TransportEvent::SessionReady, TransportEvent::Authenticated],
                "SCAN_QR_CODE" => vec![TransportEvent::QrChallenge(text("qr"))],
                "FAILED" => vec![TransportEvent::AuthFailure(format!(
                    "session {}",
                    status.to_ascii_lowercase()
                ))],
                "STOPPED" => vec![TransportEvent::Disconnected("session stopped".to_owned())],
                _ => Vec::new(),
            }
        }
        "message.ack" => {
            let id = payload.get("id").and_then(|id| {
                id.as_str()
                    .or_else(|| id.get("_serialized").and_then(serde_json::Value::as_str))
            });
            let ack = payload.get("ack").and_then(serde_json::Value::as_i64);
            match (id.map(str::trim).filter(|s| !s.is_empty()), ack) {
                (Some(id), Some(ack)) => {
                    let to = text("to");
                    vec![TransportEvent::DeliveryStatus {
                        handle: MessageHandle::new(id),
                        to: (!to.is_empty()).then_some(to),
                        state: DeliveryState::from_ack(ack),
                    }]
                }
                _ => Vec::new(),
            }
        }
        "state.change" => {
            let state = text("state");
            if state.eq_ignore_ascii_case("CONNECTED") || state.is_empty() {
                Vec::new()
            } else {
                vec![TransportEvent::Disconnected(state)]
            }
        }
        "session.disconnected" => {
            let reason = text("reason");
            let reason = if reason.is_empty() {
                "session disconnected".to_owned()
            } else {
                reason
            };
            vec![TransportEvent::Disconnected(reason)]
        }
        _ => Vec::new(),
    };
    Some(events)
}

fn bearer_is_valid(headers: &HeaderMap, expected: Option<&str>) -> bool {
    let Some(expected_token) = expected else {
        return true;
    };
    let header_value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let candidate = header_value
        .strip_prefix("Bearer ")
        .unwrap_or_default()
        .trim();
    !expected_token.is_empty() && candidate == expected_token
}

/// Build the webhook router.
pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/health", get(webhook_health))
        .route("/webhook", post(gateway_webhook))
        .with_state(state)
}

/// Bind the configured address.
///
/// # Errors
///
/// Returns `NotifyError::Io` if the address cannot be bound.
pub async fn bind(config: &WebhookConfig) -> crate::Result<TcpListener> {
    let addr = format!("{}:{}", config.host, config.port);
    Ok(TcpListener::bind(&addr).await?)
}

/// Serve webhook routes on `listener` until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns `NotifyError::Io` if the server fails.
pub async fn serve(
    listener: TcpListener,
    state: WebhookState,
    shutdown: CancellationToken,
) -> crate::Result<()> {
    let local_addr = listener.local_addr()?;
    info!("gateway webhook listening on http://{local_addr}");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("gateway webhook stopped");
    Ok(())
}

async fn webhook_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok"
    }))
}

async fn gateway_webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if !bearer_is_valid(&headers, state.bearer_token.as_deref()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "unauthorized"})),
        );
    }

    let Ok(payload) = serde_json::from_slice::<serde_json::Value>(&body) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "body must be JSON"})),
        );
    };
    let Some(events) = parse_gateway_event(&payload) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "event is required"})),
        );
    };

    let count = events.len();
    for event in events {
        // No subscribers is not an error for the gateway.
        if state.events.send(event).is_err() {
            debug!("transport event dropped: no subscribers");
        }
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "received": true,
            "events": count
        })),
    )
}
