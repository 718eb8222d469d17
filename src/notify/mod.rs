//! Outbound notification sinks.

pub mod email;
pub mod sms;

use async_trait::async_trait;

use crate::error::NotifyError;

pub use email::{EmailConfig, EmailSink};
pub use sms::sms_address;

/// Abstract destination for outbound alerts.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Sink name for logs.
    fn name(&self) -> &str;

    /// Deliver one notification. Failure is reported to the caller and
    /// never retried here.
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}
