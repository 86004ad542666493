//! Mail facade over interchangeable delivery backends.
//!
//! [`Mail`] owns one active [`MailProvider`] chosen by key from a registry
//! (`FAKE_MAIL`, `SENDGRID`, `MANDRILL` by default). Options are checked before any
//! backend is contacted; backend failures are logged and returned as
//! [`ProviderError`]s.

mod fake;
mod mandrill;
mod sendgrid;

pub use fake::{FakeMail, FakeMailOptions, SentMail, TestAccount};
pub use mandrill::{Mandrill, MandrillOptions};
pub use sendgrid::{SendGrid, SendGridOptions};

use crate::error::ProviderError;
use crate::provider::{IntoProvider, Lifecycle, ProviderRegistry, ProviderSlot, ProviderState};
use crate::service::is_valid_email;
use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[async_trait]
pub trait MailProvider: Lifecycle {
    async fn send_mail(&self, options: &MailOptions) -> Result<MailInfo, ProviderError>;

    /// Post-processing of the delivery result. Default: unchanged.
    async fn after_mail_sent(&self, info: MailInfo) -> Result<MailInfo, ProviderError> {
        Ok(info)
    }
}

impl<T: MailProvider + 'static> IntoProvider<dyn MailProvider> for T {
    fn into_provider(self) -> Box<dyn MailProvider> {
        Box::new(self)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MailOptions {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Attachment {
    pub filename: String,
    /// Base64 (standard alphabet, padded).
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl Attachment {
    pub fn from_bytes(filename: impl Into<String>, bytes: &[u8], content_type: Option<&str>) -> Self {
        Attachment {
            filename: filename.into(),
            content: base64::engine::general_purpose::STANDARD.encode(bytes),
            content_type: content_type.map(str::to_string),
        }
    }

    pub fn decode(&self) -> Result<Vec<u8>, ProviderError> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.content)
            .map_err(|e| ProviderError::InvalidInput(format!("attachment {}: {}", self.filename, e)))
    }

    pub(crate) fn mime_type(&self) -> &str {
        self.content_type.as_deref().unwrap_or("application/octet-stream")
    }
}

impl MailOptions {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        MailOptions {
            from: from.into(),
            to: to.into(),
            subject: subject.into(),
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Parse untyped options against the closed schema, then validate.
    pub fn from_value(value: Value) -> Result<Self, ProviderError> {
        let options: MailOptions =
            serde_json::from_value(value).map_err(|e| ProviderError::InvalidInput(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ProviderError> {
        for (field, address) in [("from", &self.from), ("to", &self.to)] {
            if !is_valid_email(address) {
                return Err(ProviderError::InvalidInput(format!("{} must be a valid email", field)));
            }
        }
        if self.subject.trim().is_empty() {
            return Err(ProviderError::InvalidInput("subject is required".into()));
        }
        if self.text.is_empty() {
            return Err(ProviderError::InvalidInput("text is required".into()));
        }
        for attachment in &self.attachments {
            attachment.decode()?;
        }
        Ok(())
    }
}

/// Delivery result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailInfo {
    pub provider: String,
    pub message_id: String,
    pub accepted: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
}

pub struct Mail {
    slot: ProviderSlot<dyn MailProvider>,
}

impl Default for Mail {
    fn default() -> Self {
        Mail::new(Arc::new(Mail::default_registry()))
    }
}

impl Mail {
    pub fn new(registry: Arc<ProviderRegistry<dyn MailProvider>>) -> Self {
        Mail {
            slot: ProviderSlot::new(registry),
        }
    }

    pub fn default_registry() -> ProviderRegistry<dyn MailProvider> {
        ProviderRegistry::new()
            .register::<FakeMail>("FAKE_MAIL")
            .register::<SendGrid>("SENDGRID")
            .register::<Mandrill>("MANDRILL")
    }

    /// Configure and connect the backend `key`, then make it active. The previous
    /// backend stays active when this fails.
    pub async fn use_provider(&mut self, key: &str, options: Value) -> Result<(), ProviderError> {
        self.slot.install(key, options).await.map_err(|e| {
            tracing::error!(provider = key, error = %e, "mail provider not installed");
            e
        })
    }

    pub async fn send_mail(&self, options: MailOptions) -> Result<MailInfo, ProviderError> {
        options.validate()?;
        let provider = self.slot.active()?;
        let result = match provider.send_mail(&options).await {
            Ok(info) => provider.after_mail_sent(info).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(info) => {
                tracing::info!(provider = provider.name(), message_id = %info.message_id, "mail sent");
                Ok(info)
            }
            Err(e) => {
                tracing::error!(provider = provider.name(), error = %e, "mail not sent");
                Err(e)
            }
        }
    }

    /// Key of the active backend (`"FAKE_MAIL"`), if any.
    pub fn active_provider(&self) -> Option<&str> {
        self.slot.active_key()
    }

    pub fn state(&self) -> ProviderState {
        self.slot.state()
    }
}

impl std::fmt::Debug for Mail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mail").field("slot", &self.slot).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> MailOptions {
        MailOptions::new("a@example.com", "b@example.com", "hi", "hello")
    }

    #[test]
    fn mail_options_checks() {
        assert!(options().validate().is_ok());
        let mut bad = options();
        bad.to = "nope".into();
        assert!(matches!(bad.validate(), Err(ProviderError::InvalidInput(_))));
        let mut bad = options();
        bad.subject = " ".into();
        assert!(bad.validate().is_err());
        let bad = options().with_attachment(Attachment {
            filename: "a.txt".into(),
            content: "not base64!".into(),
            content_type: None,
        });
        assert!(bad.validate().is_err());
    }

    #[test]
    fn mail_options_schema_is_closed() {
        let value = serde_json::json!({
            "from": "a@example.com", "to": "b@example.com",
            "subject": "s", "text": "t", "cc": "c@example.com"
        });
        assert!(matches!(MailOptions::from_value(value), Err(ProviderError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn send_without_provider() {
        let mail = Mail::default();
        assert_eq!(mail.state(), ProviderState::Unconfigured);
        assert!(matches!(
            mail.send_mail(options()).await,
            Err(ProviderError::NoProviderConfigured)
        ));
    }

    #[tokio::test]
    async fn unknown_provider_key() {
        let mut mail = Mail::default();
        assert!(matches!(
            mail.use_provider("POSTMARK", Value::Null).await,
            Err(ProviderError::UnknownProvider(_))
        ));
    }

    #[tokio::test]
    async fn invalid_options_do_not_replace_active_provider() {
        let mut mail = Mail::default();
        mail.use_provider("FAKE_MAIL", Value::Null).await.unwrap();
        let err = mail
            .use_provider("SENDGRID", serde_json::json!({ "apiKey": "" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidOptions { provider: "sendgrid", .. }));
        assert_eq!(mail.active_provider(), Some("FAKE_MAIL"));
        assert_eq!(mail.state(), ProviderState::Ready);
    }
}
