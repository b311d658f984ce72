//! # OpsFlow Notify
//!
//! Markdown delivery to a chat-ops robot webhook. Lightweight: no queues,
//! no retry ladder. Notify stages capture the outcome string into the run
//! state, so a dead webhook never fails a computed report.

use std::time::Duration;

use serde_json::{Value, json};
use tracing::debug;

use opsflow_core::config::WebhookConfig;
use opsflow_core::error::{OpsflowError, Result};

const ROBOT_GATEWAY: &str = "https://oapi.dingtalk.com/robot/send";

pub struct WebhookSink {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn from_config(config: &WebhookConfig) -> Self {
        Self { config: config.clone(), client: reqwest::Client::new() }
    }

    /// Post a markdown card. A job-context token overrides the configured
    /// static token; a configured custom URL overrides both.
    pub async fn send(&self, title: &str, markdown: &str, token_override: Option<&str>) -> Result<String> {
        let url = self.endpoint_for(token_override)?;
        let body = message_body(title, markdown);

        debug!("🔔 posting webhook card '{title}' ({} chars)", markdown.len());
        let resp = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(&body)
            .send()
            .await
            .map_err(|e| OpsflowError::ExternalCall(format!("webhook connection failed: {e}")))?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(OpsflowError::ExternalCall(format!("webhook error {status}: {text}")));
        }
        Ok(text)
    }

    fn endpoint_for(&self, token_override: Option<&str>) -> Result<String> {
        if !self.config.custom_url.is_empty() {
            return Ok(self.config.custom_url.clone());
        }
        let token = match token_override {
            Some(t) if !t.is_empty() => t,
            _ => self.config.access_token.as_str(),
        };
        if token.is_empty() {
            return Err(OpsflowError::Config(
                "no webhook configured; set webhook.access_token or webhook.custom_url".into(),
            ));
        }
        Ok(format!("{ROBOT_GATEWAY}?access_token={token}"))
    }
}

// Robot markdown message shape.
fn message_body(title: &str, markdown: &str) -> Value {
    json!({
        "msgtype": "markdown",
        "markdown": {
            "title": title,
            "text": markdown,
        },
    })
}
