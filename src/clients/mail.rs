use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    error::DeliveryError,
    models::mail::{MailMessage, MailRelayRequest, MailRelayResponse},
};

/// Sends one rendered message to one address.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Returns the relay's message id on success.
    async fn send(&self, message: &MailMessage) -> Result<String, DeliveryError>;
}

/// Posts messages to an HTTP mail relay.
pub struct HttpMailTransport {
    http_client: Client,
    relay_url: String,
}

impl HttpMailTransport {
    pub fn new(config: &Config) -> Result<Self, DeliveryError> {
        Self::with_relay_url(&config.mail_relay_url, config.http_timeout())
    }

    pub fn with_relay_url(relay_url: &str, timeout: Duration) -> Result<Self, DeliveryError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::transient(format!("Failed to create HTTP client: {e}")))?;

        info!(relay_url, "Mail transport initialized");

        Ok(Self {
            http_client,
            relay_url: relay_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MailTransport for HttpMailTransport {
    async fn send(&self, message: &MailMessage) -> Result<String, DeliveryError> {
        let url = format!("{}/messages", self.relay_url);

        debug!(to = %message.to, subject = %message.subject, "Sending mail");

        let response = self
            .http_client
            .post(&url)
            .json(&MailRelayRequest { message })
            .send()
            .await
            .map_err(|e| DeliveryError::transient(format!("Mail relay unreachable: {e}")))?;

        let status = response.status();

        if status.is_success() {
            // Any 2xx is a delivery. The body only carries the relay's id.
            let message_id = match response.json::<MailRelayResponse>().await {
                Ok(body) => body.message_id.unwrap_or_default(),
                Err(e) => {
                    warn!(
                        to = %message.to,
                        error = %e,
                        "Mail relay accepted message without a readable id"
                    );
                    String::new()
                }
            };

            info!(to = %message.to, message_id = %message_id, "Mail accepted by relay");
            return Ok(message_id);
        }

        let detail = response
            .json::<MailRelayResponse>()
            .await
            .ok()
            .and_then(|body| body.error)
            .unwrap_or_else(|| status.to_string());

        let reason = format!("Mail relay returned {status}: {detail}");
        warn!(to = %message.to, status = %status, "Mail relay rejected message");

        Err(classify(status, reason))
    }
}

/// 408 and 429 are worth retrying; every other client error is final.
fn classify(status: StatusCode, reason: String) -> DeliveryError {
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            DeliveryError::Transient(reason)
        }
        s if s.is_client_error() => DeliveryError::Permanent(reason),
        _ => DeliveryError::Transient(reason),
    }
}
