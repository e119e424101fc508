//! Notification delivery — tracing, SendGrid mail, signed webhooks.
//!
//! Transport failures are logged and never propagate to the caller.

use std::collections::BTreeMap;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
#[cfg(test)]
use tokio::sync::Mutex;

use crate::config::NotificationConfig;
use crate::models::alert::{AlertSeverity, NotificationSettings};

type HmacSha256 = Hmac<Sha256>;

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(
        &self,
        settings: &NotificationSettings,
        title: &str,
        message: &str,
        severity: AlertSeverity,
        dimensions: &BTreeMap<String, String>,
    );
}

pub struct HttpNotificationSender {
    config: NotificationConfig,
    client: reqwest::Client,
}

impl HttpNotificationSender {
    pub fn new(config: NotificationConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    async fn send_email(
        &self,
        settings: &NotificationSettings,
        title: &str,
        message: &str,
        severity: AlertSeverity,
    ) {
        if self.config.sendgrid_api_key.is_empty() {
            tracing::debug!("SendGrid key not set, skipping email notification");
            return;
        }
        if settings.email.recipients.is_empty() {
            tracing::debug!("No email recipients configured, skipping");
            return;
        }

        let to: Vec<_> = settings
            .email
            .recipients
            .iter()
            .map(|r| serde_json::json!({ "email": r }))
            .collect();
        let body = serde_json::json!({
            "personalizations": [{ "to": to }],
            "from": { "email": self.config.sender_email },
            "subject": format!("[{}] {}", severity.as_str(), title),
            "content": [{ "type": "text/plain", "value": message }],
        });

        let result = self
            .client
            .post("https://api.sendgrid.com/v3/mail/send")
            .header("Authorization", format!("Bearer {}", self.config.sendgrid_api_key))
            .json(&body)
            .send()
            .await;

        match result {
            Ok(resp) if !resp.status().is_success() => {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                tracing::warn!("SendGrid send failed: {} {}", status, text);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("SendGrid send error: {e}"),
        }
    }

    async fn send_webhooks(
        &self,
        settings: &NotificationSettings,
        title: &str,
        message: &str,
        severity: AlertSeverity,
        dimensions: &BTreeMap<String, String>,
    ) {
        let payload = serde_json::json!({
            "title": title,
            "message": message,
            "severity": severity.as_str(),
            "dimensions": dimensions,
        });
        let body = match serde_json::to_vec(&payload) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!("Webhook payload serialization failed: {e}");
                return;
            }
        };

        for url in &settings.webhook.urls {
            let mut request = self
                .client
                .post(url)
                .header("Content-Type", "application/json")
                .body(body.clone());

            if let Some(signature) = sign_payload(&self.config.webhook_signing_secret, &body) {
                request = request.header("X-Testplane-Signature-256", signature);
            }

            match request.send().await {
                Ok(resp) if !resp.status().is_success() => {
                    tracing::warn!(url, "Webhook POST failed: {}", resp.status());
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(url, "Webhook POST error: {e}"),
            }
        }
    }
}

/// HMAC-SHA256 payload signature, `sha256=<hex>`. None when no secret is set.
pub fn sign_payload(secret: &str, payload: &[u8]) -> Option<String> {
    if secret.is_empty() {
        return None;
    }
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

#[async_trait]
impl NotificationSender for HttpNotificationSender {
    async fn send(
        &self,
        settings: &NotificationSettings,
        title: &str,
        message: &str,
        severity: AlertSeverity,
        dimensions: &BTreeMap<String, String>,
    ) {
        match severity {
            AlertSeverity::Critical => {
                tracing::error!(title, severity = severity.as_str(), "ALERT: {message}")
            }
            AlertSeverity::Warning => {
                tracing::warn!(title, severity = severity.as_str(), "ALERT: {message}")
            }
            AlertSeverity::Information => {
                tracing::info!(title, severity = severity.as_str(), "ALERT: {message}")
            }
        }

        let email_enabled = settings.email.enabled
            && settings
                .email
                .min_severity
                .map_or(true, |min| severity >= min);
        if email_enabled {
            self.send_email(settings, title, message, severity).await;
        }

        if settings.webhook.enabled {
            self.send_webhooks(settings, title, message, severity, dimensions)
                .await;
        }

        crate::metrics::alert_sent(severity.as_str());
    }
}

/// Records sends for assertions.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<(String, AlertSeverity, BTreeMap<String, String>)>>,
}

#[cfg(test)]
impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
#[async_trait]
impl NotificationSender for RecordingSender {
    async fn send(
        &self,
        _settings: &NotificationSettings,
        title: &str,
        _message: &str,
        severity: AlertSeverity,
        dimensions: &BTreeMap<String, String>,
    ) {
        self.sent
            .lock()
            .await
            .push((title.to_string(), severity, dimensions.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_requires_a_secret() {
        assert!(sign_payload("", b"body").is_none());

        let sig = sign_payload("secret", b"body").unwrap();
        assert!(sig.starts_with("sha256="));
        // Deterministic for the same input.
        assert_eq!(sig, sign_payload("secret", b"body").unwrap());
        assert_ne!(sig, sign_payload("secret", b"other").unwrap());
    }
}
