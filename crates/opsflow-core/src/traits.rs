//! Trait seams — swap implementations without touching pipeline code.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{Feedback, Order, Product, ToolDefinition, ToolResult};

/// A chat completion backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Single-turn completion: system prompt plus one user message.
    async fn complete(&self, system_prompt: &str, user_text: &str) -> Result<String>;
}

/// Which record family a month scan inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Orders,
    Feedback,
}

/// Read access to the operational records the pipelines aggregate.
///
/// Windows are half-open: `start <= created_at < end`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn orders_in_window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Order>>;

    async fn feedback_in_window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Feedback>>;

    async fn product(&self, id: i64) -> Result<Option<Product>>;

    /// Latest `YYYY-MM` month that has any rows, or `None` on an empty store.
    async fn max_observed_month(&self, entity: EntityKind) -> Result<Option<String>>;
}

/// An invokable tool exposed to models and to the CLI.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn definition(&self) -> ToolDefinition;

    /// Execute with a JSON argument string.
    async fn execute(&self, arguments: &str) -> Result<ToolResult>;
}
