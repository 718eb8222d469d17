//! Email sink — SMTP via lettre.

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};

use crate::error::NotifyError;
use crate::notify::NotificationSink;

/// SMTP configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl EmailConfig {
    /// Build config from environment variables.
    /// Returns `None` if `EMAIL_SMTP_HOST` is not set (sink disabled).
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("EMAIL_SMTP_HOST").ok()?;

        let smtp_port: u16 = std::env::var("EMAIL_SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("EMAIL_USERNAME").unwrap_or_default();
        let password = SecretString::from(std::env::var("EMAIL_PASSWORD").unwrap_or_default());
        let from_address = std::env::var("EMAIL_FROM_ADDRESS").unwrap_or_else(|_| username.clone());

        Some(Self {
            smtp_host,
            smtp_port,
            username,
            password,
            from_address,
        })
    }
}

/// Notification sink that delivers alerts over SMTP.
pub struct EmailSink {
    config: EmailConfig,
}

impl EmailSink {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn send_blocking(
        config: &EmailConfig,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), NotifyError> {
        let creds = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );

        let transport = SmtpTransport::relay(&config.smtp_host)
            .map_err(|e| NotifyError::SendFailed {
                name: "email".into(),
                reason: format!("SMTP relay error: {e}"),
            })?
            .port(config.smtp_port)
            .credentials(creds)
            .build();

        let email = Message::builder()
            .from(config.from_address.parse().map_err(|e| {
                NotifyError::InvalidRecipient {
                    address: config.from_address.clone(),
                    reason: format!("invalid from address: {e}"),
                }
            })?)
            .to(to.parse().map_err(|e| NotifyError::InvalidRecipient {
                address: to.to_string(),
                reason: format!("invalid to address: {e}"),
            })?)
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| NotifyError::SendFailed {
                name: "email".into(),
                reason: format!("failed to build email: {e}"),
            })?;

        transport.send(&email).map_err(|e| NotifyError::SendFailed {
            name: "email".into(),
            reason: format!("SMTP send failed: {e}"),
        })?;

        tracing::info!("email sent to {to}");
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for EmailSink {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        let config = self.config.clone();
        let to = to.to_string();
        let subject = subject.to_string();
        let body = body.to_string();

        // The SMTP send blocks on network I/O; keep it off the
        // evaluation task.
        tokio::task::spawn_blocking(move || Self::send_blocking(&config, &to, &subject, &body))
            .await
            .map_err(|e| NotifyError::SendFailed {
                name: "email".into(),
                reason: format!("send task panicked: {e}"),
            })?
    }
}
