//! Outbound email boundary.
//!
//! The core never waits on email delivery: notifier methods compose the
//! message and hand it to a detached tokio task after the surrounding
//! database transaction has committed. Delivery failure is logged and
//! never reaches the caller.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::config::EmailConfig;
use crate::error::AppError;

#[derive(Error, Debug)]
pub enum EmailError {
    #[error("Email API request failed: {0}")]
    RequestFailed(String),

    #[error("Email API responded with status {0}")]
    ApiError(u16),

    #[error("Email delivery is not configured")]
    NotConfigured,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError>;
}

/// Sends mail through a transactional email HTTP API.
pub struct EmailClient {
    http: reqwest::Client,
    config: EmailConfig,
}

impl EmailClient {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl EmailSender for EmailClient {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError> {
        if self.config.api_endpoint.is_empty() {
            return Err(EmailError::NotConfigured);
        }

        let payload = json!({
            "from": {
                "email": self.config.from_address,
                "name": self.config.from_name,
            },
            "to": [{ "email": to }],
            "subject": subject,
            "text": body,
        });

        let response = self
            .http
            .post(&self.config.api_endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| EmailError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EmailError::ApiError(response.status().as_u16()));
        }

        info!("Email sent to {}: {}", to, subject);
        Ok(())
    }
}

/// Composes the side-channel emails and builds their callback links from
/// the public base URL.
#[derive(Clone)]
pub struct EmailNotifier {
    base_url: Url,
    sender: Arc<dyn EmailSender>,
}

impl std::fmt::Debug for EmailNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailNotifier")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl EmailNotifier {
    pub fn new(base_url: &str, sender: Arc<dyn EmailSender>) -> Result<Self, AppError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AppError::ConfigError(format!("invalid base_url: {}", e)))?;
        Ok(Self { base_url, sender })
    }

    pub async fn send_signup_verification(&self, to: &str, token: &str) -> Result<(), EmailError> {
        let link = callback_link(&self.base_url, "/auth/verify", token);
        let subject = "Webscan || Verify your email";
        let body = format!(
            "Please click the following link to verify your email: {}",
            link
        );
        self.sender.send(to, subject, &body).await
    }

    pub async fn send_password_reset(&self, to: &str, token: &str) -> Result<(), EmailError> {
        let link = callback_link(&self.base_url, "/auth/reset-password", token);
        let subject = "Webscan || Reset your password";
        let body = format!(
            "Please click the following link to reset your password: {}",
            link
        );
        self.sender.send(to, subject, &body).await
    }
}

/// Spawns a detached delivery task. The future owns its data, runs to
/// completion independently of the request that triggered it, and only
/// logs on failure.
pub fn dispatch<F>(send: F)
where
    F: std::future::Future<Output = Result<(), EmailError>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = send.await {
            warn!("Background email delivery failed: {}", e);
        }
    });
}

fn callback_link(base_url: &Url, path: &str, token: &str) -> String {
    let mut url = base_url.clone();
    url.set_path(path);
    url.query_pairs_mut().clear().append_pair("token", token);
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> EmailConfig {
        EmailConfig {
            api_endpoint: "https://mail.example.com/api/send".to_string(),
            api_key: "key".to_string(),
            from_address: "no-reply@webscan.local".to_string(),
            from_name: "Webscan".to_string(),
        }
    }

    #[test]
    fn test_callback_link_embeds_token() {
        let base = Url::parse("https://app.webscan.io").unwrap();
        let link = callback_link(&base, "/auth/verify", "abc123");
        assert_eq!(link, "https://app.webscan.io/auth/verify?token=abc123");
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let sender = Arc::new(EmailClient::new(test_config()));
        let err = EmailNotifier::new("not a url", sender).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_notifier_composes_verification_email() {
        let mut mock = MockEmailSender::new();
        mock.expect_send()
            .withf(|to, subject, body| {
                to == "alice@example.com"
                    && subject.contains("Verify your email")
                    && body.contains("/auth/verify?token=rawtoken")
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let notifier = EmailNotifier::new("http://localhost:8080", Arc::new(mock)).unwrap();
        notifier
            .send_signup_verification("alice@example.com", "rawtoken")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_notifier_composes_reset_email() {
        let mut mock = MockEmailSender::new();
        mock.expect_send()
            .withf(|to, subject, body| {
                to == "bob@example.com"
                    && subject.contains("Reset your password")
                    && body.contains("/auth/reset-password?token=resettoken")
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let notifier = EmailNotifier::new("http://localhost:8080", Arc::new(mock)).unwrap();
        notifier
            .send_password_reset("bob@example.com", "resettoken")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unconfigured_client_reports_not_configured() {
        let mut config = test_config();
        config.api_endpoint = String::new();
        let client = EmailClient::new(config);
        let err = client.send("a@b.c", "s", "b").await.unwrap_err();
        assert!(matches!(err, EmailError::NotConfigured));
    }
}
