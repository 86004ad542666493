//! SendGrid v3 mail-send backend.

use crate::error::ProviderError;
use crate::mail::{MailInfo, MailOptions, MailProvider};
use crate::provider::http::{self, default_timeout};
use crate::provider::{Configure, Lifecycle};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

const NAME: &str = "sendgrid";

fn default_base_url() -> String {
    "https://api.sendgrid.com".to_string()
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SendGridOptions {
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug)]
pub struct SendGrid {
    client: Client,
    api_key: String,
    base_url: String,
}

impl Configure for SendGrid {
    type Options = SendGridOptions;
    const NAME: &'static str = NAME;

    fn configure(options: SendGridOptions) -> Result<Self, ProviderError> {
        if options.api_key.trim().is_empty() {
            return Err(ProviderError::InvalidOptions {
                provider: NAME,
                message: "apiKey cannot be empty".into(),
            });
        }
        Ok(SendGrid {
            client: http::client(NAME, options.timeout_seconds)?,
            api_key: options.api_key,
            base_url: http::trim_base(&options.base_url),
        })
    }
}

fn payload(options: &MailOptions) -> Value {
    let mut body = json!({
        "personalizations": [{ "to": [{ "email": options.to }] }],
        "from": { "email": options.from },
        "subject": options.subject,
        "content": [{ "type": "text/plain", "value": options.text }],
    });
    if !options.attachments.is_empty() {
        body["attachments"] = options
            .attachments
            .iter()
            .map(|a| json!({ "content": a.content, "filename": a.filename, "type": a.mime_type() }))
            .collect();
    }
    body
}

#[async_trait]
impl Lifecycle for SendGrid {
    fn name(&self) -> &'static str {
        NAME
    }
}

#[async_trait]
impl MailProvider for SendGrid {
    async fn send_mail(&self, options: &MailOptions) -> Result<MailInfo, ProviderError> {
        let url = format!("{}/v3/mail/send", self.base_url);
        tracing::debug!(url, to = %options.to, "sending mail through SendGrid");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload(options))
            .send()
            .await
            .map_err(|e| http::transport(NAME, e))?;

        if !response.status().is_success() {
            return Err(http::api_error(NAME, response).await);
        }
        // SendGrid answers 202 with an empty body; the id is only in this header.
        let message_id = response
            .headers()
            .get("x-message-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Ok(MailInfo {
            provider: NAME.to_string(),
            message_id,
            accepted: vec![options.to.clone()],
            preview_url: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::Attachment;

    #[test]
    fn payload_shape() {
        let options = MailOptions::new("a@example.com", "b@example.com", "s", "t")
            .with_attachment(Attachment::from_bytes("a.txt", b"hi", Some("text/plain")));
        let body = payload(&options);
        assert_eq!(body["personalizations"][0]["to"][0]["email"], "b@example.com");
        assert_eq!(body["content"][0]["value"], "t");
        assert_eq!(body["attachments"][0]["content"], "aGk=");
        assert_eq!(body["attachments"][0]["type"], "text/plain");
    }

    #[test]
    fn options_are_closed_and_require_key() {
        assert!(SendGrid::from_value(json!({})).is_err());
        assert!(SendGrid::from_value(json!({ "apiKey": "k", "region": "eu" })).is_err());
        let sg = SendGrid::from_value(json!({ "apiKey": "k", "baseUrl": "http://localhost:1/" })).unwrap();
        assert_eq!(sg.base_url, "http://localhost:1");
    }
}
