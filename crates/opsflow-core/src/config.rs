//! Configuration management for OpsFlow.
//!
//! Loads `~/.opsflow/config.toml`, creating it with defaults on first run.
//! Every field has a serde default so a partial file stays valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{OpsflowError, Result};

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OpsflowConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

impl OpsflowConfig {
    /// Load from the default path, writing a default file if none exists.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            let config = Self::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| OpsflowError::Config(format!("failed to parse {}: {e}", path.display())))
    }

    /// Save to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| OpsflowError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Directory holding config and scheduler state.
    pub fn config_dir() -> PathBuf {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".opsflow")
    }

    /// Path of the config file.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

/// Model provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    /// API key; falls back to `OPSFLOW_API_KEY` then `OPENAI_API_KEY`.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_llm_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_llm_timeout() -> u64 {
    60
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            api_key: String::new(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl LlmConfig {
    /// Config value first, then environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        if !self.api_key.is_empty() {
            return Some(self.api_key.clone());
        }
        std::env::var("OPSFLOW_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .ok()
    }
}

/// Chat-ops webhook settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Robot access token appended to the gateway URL.
    #[serde(default)]
    pub access_token: String,
    /// Full URL override; when set, `access_token` is ignored.
    #[serde(default)]
    pub custom_url: String,
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,
}

fn default_webhook_timeout() -> u64 {
    10
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            custom_url: String::new(),
            timeout_secs: default_webhook_timeout(),
        }
    }
}

/// Scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between due-task scans.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Directory for persisted task definitions; empty means `~/.opsflow/scheduler`.
    #[serde(default)]
    pub store_dir: String,
}

fn default_tick_secs() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            store_dir: String::new(),
        }
    }
}

/// Report pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Display name prefix for sharded stores, e.g. "Store #3".
    #[serde(default = "default_store_name_prefix")]
    pub store_name_prefix: String,
    /// Concurrent classification calls per feedback batch.
    #[serde(default = "default_classify_workers")]
    pub classify_workers: usize,
}

fn default_store_name_prefix() -> String {
    "Store".to_string()
}

fn default_classify_workers() -> usize {
    4
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            store_name_prefix: default_store_name_prefix(),
            classify_workers: default_classify_workers(),
        }
    }
}
