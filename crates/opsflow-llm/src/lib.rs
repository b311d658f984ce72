//! # OpsFlow LLM
//!
//! Chat completion backend behind the `LanguageModel` trait. Only the
//! OpenAI-compatible wire format is implemented; that covers every
//! deployment the pipelines target.

pub mod openai_compatible;

pub use openai_compatible::OpenAiCompatibleModel;

use std::sync::Arc;

use opsflow_core::config::OpsflowConfig;
use opsflow_core::traits::LanguageModel;

/// Build the configured model backend.
pub fn create_model(config: &OpsflowConfig) -> Arc<dyn LanguageModel> {
    Arc::new(OpenAiCompatibleModel::from_config(&config.llm))
}
