use crate::config::TransportConfig;
use crate::error::NotifyError;
use crate::transport::{MessageHandle, SessionStatus, Transport};
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

/// WhatsApp HTTP gateway adapter (WAHA-compatible API).
///
/// The gateway owns the linked-device session; this adapter only sends text
/// and probes session state. Callbacks arrive through the webhook receiver.
#[derive(Clone)]
pub struct WahaTransport {
    base_url: String,
    session: String,
    api_key: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for WahaTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WahaTransport")
            .field("base_url", &self.base_url)
            .field("session", &self.session)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "[REDACTED]" })
            .finish()
    }
}

impl WahaTransport {
    pub fn new(config: &TransportConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Build with a client carrying its own request timeout.
    pub fn with_timeout(config: &TransportConfig, timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self::with_client(client, config))
    }

    fn with_client(client: reqwest::Client, config: &TransportConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            session: config.session.trim().to_owned(),
            api_key: config.api_key.trim().to_owned(),
            client,
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            request
        } else {
            request.header("X-Api-Key", &self.api_key)
        }
    }
}

/// Extract the message id from a send response.
///
/// Gateways return either a plain string or a serialized-id object.
fn message_id(body: &serde_json::Value) -> Option<String> {
    let id = body.get("id")?;
    let text = id
        .as_str()
        .or_else(|| id.get("_serialized").and_then(serde_json::Value::as_str))?
        .trim();
    (!text.is_empty()).then(|| text.to_owned())
}

#[async_trait]
impl Transport for WahaTransport {
    fn id(&self) -> &'static str {
        "whatsapp"
    }

    async fn send(&self, destination: &str, text: &str) -> crate::Result<MessageHandle> {
        if destination.trim().is_empty() {
            return Err(NotifyError::Transport(
                "whatsapp destination is empty".to_owned(),
            ));
        }

        let url = format!("{}/api/sendText", self.base_url);
        let body = serde_json::json!({
            "session": self.session,
            "chatId": destination,
            "text": text,
        });
        let response = self
            .authorize(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(format!("whatsapp send failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Transport(format!(
                "whatsapp send failed ({status}): {body}"
            )));
        }

        // The send is accepted at this point; a body we cannot read only
        // costs delivery tracking.
        let payload: serde_json::Value = response.json().await.unwrap_or_default();
        match message_id(&payload) {
            Some(id) => Ok(MessageHandle::new(id)),
            None => {
                let synthetic = format!("untracked-{}", chrono::Utc::now().timestamp_millis());
                warn!(destination, handle = %synthetic, "gateway returned no message id");
                Ok(MessageHandle::new(synthetic))
            }
        }
    }

    async fn session_status(&self) -> crate::Result<SessionStatus> {
        let url = format!(
            "{}/api/sessions/{}",
            self.base_url,
            urlencoding::encode(&self.session)
        );
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| NotifyError::Transport(format!("session probe failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Transport(format!(
                "session probe failed ({status}): {body}"
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| NotifyError::Transport(format!("bad session response: {e}")))?;
        let status = payload
            .get("status")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        Ok(SessionStatus::from_api(status))
    }
}
