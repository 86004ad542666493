//! Mandrill (Mailchimp Transactional) backend.

use crate::error::ProviderError;
use crate::mail::{MailInfo, MailOptions, MailProvider};
use crate::provider::http::{self, default_timeout};
use crate::provider::{Configure, Lifecycle};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

const NAME: &str = "mandrill";

fn default_base_url() -> String {
    "https://mandrillapp.com/api/1.0".to_string()
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct MandrillOptions {
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug)]
pub struct Mandrill {
    client: Client,
    api_key: String,
    base_url: String,
}

/// One recipient entry of a `messages/send` answer.
#[derive(Debug, Deserialize)]
struct SendResult {
    email: String,
    status: String,
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    reject_reason: Option<String>,
}

impl Configure for Mandrill {
    type Options = MandrillOptions;
    const NAME: &'static str = NAME;

    fn configure(options: MandrillOptions) -> Result<Self, ProviderError> {
        if options.api_key.trim().is_empty() {
            return Err(ProviderError::InvalidOptions {
                provider: NAME,
                message: "apiKey cannot be empty".into(),
            });
        }
        Ok(Mandrill {
            client: http::client(NAME, options.timeout_seconds)?,
            api_key: options.api_key,
            base_url: http::trim_base(&options.base_url),
        })
    }
}

impl Mandrill {
    fn payload(&self, options: &MailOptions) -> Value {
        let attachments: Vec<Value> = options
            .attachments
            .iter()
            .map(|a| json!({ "type": a.mime_type(), "name": a.filename, "content": a.content }))
            .collect();
        json!({
            "key": self.api_key,
            "message": {
                "from_email": options.from,
                "to": [{ "email": options.to, "type": "to" }],
                "subject": options.subject,
                "text": options.text,
                "attachments": attachments,
            }
        })
    }
}

fn into_info(results: Vec<SendResult>) -> Result<MailInfo, ProviderError> {
    if let Some(refused) = results
        .iter()
        .find(|r| r.status == "rejected" || r.status == "invalid")
    {
        return Err(ProviderError::failed(
            NAME,
            format!(
                "{} {}: {}",
                refused.email,
                refused.status,
                refused.reject_reason.as_deref().unwrap_or("no reason given")
            ),
        ));
    }
    let message_id = results
        .first()
        .map(|r| r.id.clone())
        .ok_or_else(|| ProviderError::failed(NAME, "empty send result"))?;
    Ok(MailInfo {
        provider: NAME.to_string(),
        message_id,
        accepted: results.into_iter().map(|r| r.email).collect(),
        preview_url: None,
    })
}

#[async_trait]
impl Lifecycle for Mandrill {
    fn name(&self) -> &'static str {
        NAME
    }
}

#[async_trait]
impl MailProvider for Mandrill {
    async fn send_mail(&self, options: &MailOptions) -> Result<MailInfo, ProviderError> {
        let url = format!("{}/messages/send.json", self.base_url);
        tracing::debug!(url, to = %options.to, "sending mail through Mandrill");
        let response = self
            .client
            .post(&url)
            .json(&self.payload(options))
            .send()
            .await
            .map_err(|e| http::transport(NAME, e))?;
        if !response.status().is_success() {
            return Err(http::api_error(NAME, response).await);
        }
        let results: Vec<SendResult> = response
            .json()
            .await
            .map_err(|e| ProviderError::failed(NAME, format!("invalid response: {}", e)))?;
        into_info(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: &str) -> SendResult {
        SendResult {
            email: "b@example.com".into(),
            status: status.into(),
            id: "abc123".into(),
            reject_reason: Some("hard-bounce".into()),
        }
    }

    #[test]
    fn queued_and_sent_are_accepted() {
        let info = into_info(vec![result("queued")]).unwrap();
        assert_eq!(info.message_id, "abc123");
        assert_eq!(info.accepted, vec!["b@example.com".to_string()]);
    }

    #[test]
    fn rejected_is_an_error() {
        let err = into_info(vec![result("rejected")]).unwrap_err();
        assert!(err.to_string().contains("hard-bounce"));
        assert!(into_info(vec![]).is_err());
    }
}
