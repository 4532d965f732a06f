//! Outbound email transport
//!
//! The lifecycle engine only depends on the `Mailer` trait; the production
//! implementation submits via the Resend HTTP API. Tests inject fakes to
//! record sends or force transport failures.

use async_trait::async_trait;

use crate::email::EmailContent;
use crate::error::{LifecycleError, LifecycleResult};

/// Outbound email transport. A returned error means the submission was
/// rejected; the engine does not depend on delivery guarantees beyond
/// accept/reject at submission time.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, content: &EmailContent) -> LifecycleResult<()>;
}

/// Resend API transport configuration
#[derive(Debug, Clone)]
pub struct MailerConfig {
    /// Resend API key; empty disables sending (logged, treated as failure)
    pub resend_api_key: String,
    /// From address, e.g. `FieldHQ <noreply@fieldhq.app>`
    pub email_from: String,
    /// Optional reply-to address
    pub reply_to: Option<String>,
}

impl MailerConfig {
    pub fn from_env() -> Self {
        Self {
            resend_api_key: std::env::var("RESEND_API_KEY").unwrap_or_default(),
            email_from: std::env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "FieldHQ <noreply@fieldhq.app>".to_string()),
            reply_to: std::env::var("EMAIL_REPLY_TO").ok(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.resend_api_key.is_empty()
    }
}

/// Transactional email transport via the Resend API
#[derive(Clone)]
pub struct ResendMailer {
    config: MailerConfig,
    client: reqwest::Client,
    api_base: String,
}

impl ResendMailer {
    pub fn new(config: MailerConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            api_base: "https://api.resend.com".to_string(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(MailerConfig::from_env())
    }

    /// Override the API base URL (used by tests against a local mock server)
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, to: &str, content: &EmailContent) -> LifecycleResult<()> {
        if !self.config.is_enabled() {
            tracing::warn!(to = %to, subject = %content.subject, "Email not configured, skipping");
            return Err(LifecycleError::Transport("email not configured".to_string()));
        }

        let mut body = serde_json::json!({
            "from": self.config.email_from,
            "to": [to],
            "subject": content.subject,
            "html": content.html,
        });
        if let Some(reply_to) = &self.config.reply_to {
            body["reply_to"] = serde_json::Value::String(reply_to.clone());
        }

        let response = self
            .client
            .post(format!("{}/emails", self.api_base))
            .header(
                "Authorization",
                format!("Bearer {}", self.config.resend_api_key),
            )
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            tracing::info!(to = %to, subject = %content.subject, "Email sent");
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                to = %to,
                subject = %content.subject,
                status = %status,
                body = %body,
                "Email transport rejected submission"
            );
            Err(LifecycleError::Transport(format!(
                "resend returned {}",
                status
            )))
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fakes {
    //! Fake transports for tests

    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::email::EmailContent;
    use crate::error::{LifecycleError, LifecycleResult};

    use super::Mailer;

    /// Records every send; always succeeds
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<(String, EmailContent)>>,
    }

    impl RecordingMailer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn sent_to(&self) -> Vec<String> {
            self.sent
                .lock()
                .map(|s| s.iter().map(|(to, _)| to.clone()).collect())
                .unwrap_or_default()
        }

        pub fn sent_count(&self) -> usize {
            self.sent.lock().map(|s| s.len()).unwrap_or(0)
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, to: &str, content: &EmailContent) -> LifecycleResult<()> {
            if let Ok(mut sent) = self.sent.lock() {
                sent.push((to.to_string(), content.clone()));
            }
            Ok(())
        }
    }

    /// Fails for a configured set of recipients, records the rest
    #[derive(Default)]
    pub struct FailingMailer {
        pub fail_for: Vec<String>,
        pub inner: RecordingMailer,
    }

    impl FailingMailer {
        pub fn failing_for(recipients: impl IntoIterator<Item = String>) -> Self {
            Self {
                fail_for: recipients.into_iter().collect(),
                inner: RecordingMailer::new(),
            }
        }
    }

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send(&self, to: &str, content: &EmailContent) -> LifecycleResult<()> {
            if self.fail_for.iter().any(|r| r == to) {
                return Err(LifecycleError::Transport("simulated failure".to_string()));
            }
            self.inner.send(to, content).await
        }
    }
}
