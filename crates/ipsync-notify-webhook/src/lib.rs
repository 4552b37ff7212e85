// # Webhook Notifier
//
// Announces address changes with a JSON POST to an HTTP endpoint (chat
// bridges, automation hooks, home-grown dashboards).
//
// ## Payload
//
// ```json
// {
//   "subject": "Public address changed to 5.6.7.8",
//   "text": "The public address changed from 1.2.3.4 to 5.6.7.8 ...",
//   "previous": "1.2.3.4",
//   "current": "5.6.7.8",
//   "detected_at": "2026-01-01T00:00:00+00:00"
// }
// ```
//
// `previous` is null on first run.
//
// ## Error Handling
//
// Every failure maps to `Error::Delivery`; the loop retries until the
// endpoint accepts the message. The status code is kept in the message so
// the operator can tell a bad token (401/403) from an outage (5xx).

use ipsync_core::ComponentRegistry;
use ipsync_core::config::{NotifierConfig, Secret};
use ipsync_core::traits::{NotificationMessage, Notifier, NotifierFactory};
use ipsync_core::{Error, Result};
use serde::Serialize;
use std::time::Duration;

/// Request timeout
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// JSON body of the POST
#[derive(Debug, Serialize)]
struct WebhookPayload {
    subject: String,
    text: String,
    previous: Option<String>,
    current: String,
    detected_at: String,
}

impl From<&NotificationMessage> for WebhookPayload {
    fn from(message: &NotificationMessage) -> Self {
        Self {
            subject: message.subject(),
            text: message.body(),
            previous: message.previous.map(|a| a.to_string()),
            current: message.current.to_string(),
            detected_at: message.detected_at.to_rfc3339(),
        }
    }
}

/// Webhook notifier
///
/// # Security
///
/// The bearer token is never logged; `Debug` redacts it.
pub struct WebhookNotifier {
    /// Endpoint URL
    url: String,

    /// Optional bearer token
    token: Option<Secret>,

    /// HTTP client
    client: reqwest::Client,
}

impl std::fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookNotifier")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

impl WebhookNotifier {
    /// Create a new webhook notifier
    ///
    /// # Parameters
    ///
    /// - `url`: Endpoint receiving the POST
    /// - `token`: Sent as `Authorization: Bearer <token>` when present
    pub fn new(url: impl Into<String>, token: Option<Secret>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            url: url.into(),
            token,
            client,
        })
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, message: &NotificationMessage) -> Result<()> {
        let payload = WebhookPayload::from(message);

        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose());
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::delivery(format!("Webhook request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();

            return Err(match status.as_u16() {
                401 | 403 => Error::delivery(format!(
                    "Webhook rejected credentials. Check the token. Status: {}",
                    status
                )),
                404 => Error::delivery(format!("Webhook endpoint not found: {}", self.url)),
                429 => Error::delivery(format!("Webhook rate limit exceeded. Status: {}", status)),
                500..=599 => Error::delivery(format!(
                    "Webhook server error (transient): {} - {}",
                    status, error_text
                )),
                _ => Error::delivery(format!(
                    "Webhook delivery failed: {} - {}",
                    status, error_text
                )),
            });
        }

        tracing::debug!(url = %self.url, status = %status, "Webhook accepted notification");
        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "webhook"
    }
}

/// Factory for creating webhook notifiers
pub struct WebhookNotifierFactory;

impl NotifierFactory for WebhookNotifierFactory {
    fn create(&self, config: &NotifierConfig) -> Result<Box<dyn Notifier>> {
        match config {
            NotifierConfig::Webhook { url, token } => {
                Ok(Box::new(WebhookNotifier::new(url.clone(), token.clone())?))
            }
            _ => Err(Error::config("Invalid config for webhook notifier")),
        }
    }
}

/// Register the webhook notifier with a registry
pub fn register(registry: &ComponentRegistry) {
    registry.register_notifier("webhook", Box::new(WebhookNotifierFactory));
}
