//! Unified OpenAI-compatible model client.
//!
//! One struct covers every OpenAI-compatible API (OpenAI, DashScope,
//! Ollama, vLLM); deployments differ only by endpoint URL, key, and model
//! name. Classify stages send a system prompt plus one user message and
//! read back plain text.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use opsflow_core::config::LlmConfig;
use opsflow_core::error::{OpsflowError, Result};
use opsflow_core::traits::LanguageModel;

pub struct OpenAiCompatibleModel {
    api_key: Option<String>,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiCompatibleModel {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            api_key: config.resolve_api_key(),
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
            client: reqwest::Client::new(),
        }
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) if !key.is_empty() => req.header("Authorization", format!("Bearer {key}")),
            _ => req,
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system_prompt: &str, user_text: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_text },
            ],
        });

        let url = format!("{}/chat/completions", self.base_url);
        let req = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&body);
        let req = self.apply_auth(req);

        let resp = req
            .send()
            .await
            .map_err(|e| OpsflowError::ExternalCall(format!("model connection failed ({url}): {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(OpsflowError::ExternalCall(format!("model API error {status}: {text}")));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| OpsflowError::MalformedResponse(e.to_string()))?;
        extract_content(&json)
    }
}

/// Pull `choices[0].message.content` out of an OpenAI-shaped response.
pub(crate) fn extract_content(json: &Value) -> Result<String> {
    let choice = json["choices"]
        .get(0)
        .ok_or_else(|| OpsflowError::MalformedResponse("no choices in response".into()))?;
    choice["message"]["content"]
        .as_str()
        .map(String::from)
        .ok_or_else(|| OpsflowError::MalformedResponse("choice has no message content".into()))
}
