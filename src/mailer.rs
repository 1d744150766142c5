// src/mailer.rs

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::error::ToolError;

pub const MIN_REQUEST_CHARS: usize = 5;
pub const MAX_REQUEST_CHARS: usize = 250;

/// Outbound notification email.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, subject: &str, text: &str) -> Result<(), ToolError>;
}

/// Resend `POST /emails`.
#[derive(Clone)]
pub struct ResendMailer {
    client: Client,
    api_base: String,
    api_key: String,
    from: String,
    to: String,
}

impl ResendMailer {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            from: from.into(),
            to: to.into(),
        })
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, subject: &str, text: &str) -> Result<(), ToolError> {
        let body = json!({
            "from": self.from,
            "to": [self.to],
            "subject": subject,
            "text": text,
        });

        let resp = self
            .client
            .post(format!("{}/emails", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                log::error!("resend request error: {e}");
                ToolError::Internal(format!("email: {e}"))
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            log::error!("resend rejected email status={} body={}", status, text);
            return Err(ToolError::Internal(format!("email status {status}")));
        }
        Ok(())
    }
}

/// Used when no email provider is configured. Requests are only logged.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, subject: &str, text: &str) -> Result<(), ToolError> {
        log::info!("email not configured, dropping subject={} text={}", subject, text);
        Ok(())
    }
}

/// Trims a tool request and checks its length.
pub fn validate_tool_request(input: &str) -> Result<String, ToolError> {
    let input = input.trim();
    let len = input.chars().count();
    if !(MIN_REQUEST_CHARS..=MAX_REQUEST_CHARS).contains(&len) {
        return Err(ToolError::InvalidRequest(format!(
            "request must be {MIN_REQUEST_CHARS} to {MAX_REQUEST_CHARS} characters"
        )));
    }
    Ok(input.to_string())
}
