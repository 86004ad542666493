//! Test-account mail backend: nothing leaves the process, every message gets a preview URL.

use crate::error::ProviderError;
use crate::mail::{MailInfo, MailOptions, MailProvider};
use crate::provider::{Configure, Lifecycle};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use url::Url;
use uuid::Uuid;

const NAME: &str = "fake-mail";
const ACCOUNT_DOMAIN: &str = "ethereal.email";

fn default_preview_base() -> String {
    "https://ethereal.email/message".to_string()
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct FakeMailOptions {
    #[serde(default = "default_preview_base")]
    pub preview_base_url: String,
}

/// Credentials of the throwaway account created on connect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestAccount {
    pub user: String,
    pub pass: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SentMail {
    pub message_id: String,
    pub options: MailOptions,
}

#[derive(Debug)]
pub struct FakeMail {
    preview_base: Url,
    account: Option<TestAccount>,
    outbox: Mutex<Vec<SentMail>>,
}

impl FakeMail {
    pub fn account(&self) -> Option<&TestAccount> {
        self.account.as_ref()
    }

    /// Messages accepted so far, oldest first.
    pub async fn outbox(&self) -> Vec<SentMail> {
        self.outbox.lock().await.clone()
    }

    fn preview_url(&self, message_id: &str) -> String {
        let token = message_id
            .trim_start_matches('<')
            .split('@')
            .next()
            .unwrap_or(message_id);
        format!("{}/{}", self.preview_base.as_str().trim_end_matches('/'), token)
    }
}

impl Configure for FakeMail {
    type Options = FakeMailOptions;
    const NAME: &'static str = NAME;

    fn configure(options: FakeMailOptions) -> Result<Self, ProviderError> {
        let preview_base = Url::parse(&options.preview_base_url).map_err(|e| ProviderError::InvalidOptions {
            provider: NAME,
            message: format!("previewBaseUrl: {}", e),
        })?;
        Ok(FakeMail {
            preview_base,
            account: None,
            outbox: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Lifecycle for FakeMail {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn connect(&mut self) -> Result<(), ProviderError> {
        let account = TestAccount {
            user: format!("{}@{}", Uuid::new_v4().simple(), ACCOUNT_DOMAIN),
            pass: Uuid::new_v4().simple().to_string(),
        };
        tracing::debug!(user = %account.user, "test mail account created");
        self.account = Some(account);
        Ok(())
    }
}

#[async_trait]
impl MailProvider for FakeMail {
    async fn send_mail(&self, options: &MailOptions) -> Result<MailInfo, ProviderError> {
        if self.account.is_none() {
            return Err(ProviderError::failed(NAME, "not connected"));
        }
        let message_id = format!("<{}@{}>", Uuid::new_v4(), ACCOUNT_DOMAIN);
        self.outbox.lock().await.push(SentMail {
            message_id: message_id.clone(),
            options: options.clone(),
        });
        Ok(MailInfo {
            provider: NAME.to_string(),
            message_id,
            accepted: vec![options.to.clone()],
            preview_url: None,
        })
    }

    async fn after_mail_sent(&self, mut info: MailInfo) -> Result<MailInfo, ProviderError> {
        info.preview_url = Some(self.preview_url(&info.message_id));
        Ok(info)
    }
}
