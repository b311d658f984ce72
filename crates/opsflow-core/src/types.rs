//! Shared record and scheduling types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A completed order row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub total_price: f64,
    pub created_at: DateTime<Utc>,
}

/// A customer feedback row. `rating` is absent when the customer left
/// text without a star score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Feedback {
    pub id: i64,
    pub user_id: i64,
    pub rating: Option<u8>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Feedback {
    /// One-line rendering fed to the classifier prompt.
    pub fn formatted(&self) -> String {
        let rating = match self.rating {
            Some(r) => format!("rating {r}/5"),
            None => "unrated".to_string(),
        };
        format!(
            "user {} | {} | {} | {}",
            self.user_id,
            self.created_at.format("%Y-%m-%d %H:%M:%S"),
            rating,
            self.content,
        )
    }
}

/// A catalog product row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price: f64,
}

/// Execution context handed to a pipeline when a scheduled task fires.
///
/// Everything here lands in the seed state under `job_`-prefixed keys so
/// stages can read the shard they serve without knowing the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobContext {
    pub task_name: String,
    pub fired_at: DateTime<Utc>,
    pub shard_index: i64,
    pub shard_total: i64,
    #[serde(default)]
    pub params: serde_json::Map<String, Value>,
}

impl JobContext {
    pub fn new(task_name: impl Into<String>) -> Self {
        Self {
            task_name: task_name.into(),
            fired_at: Utc::now(),
            shard_index: 0,
            shard_total: 1,
            params: serde_json::Map::new(),
        }
    }

    pub fn with_shard(mut self, index: i64, total: i64) -> Self {
        self.shard_index = index;
        self.shard_total = total.max(1);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Key/value pairs merged into a pipeline's seed state.
    pub fn seed_entries(&self) -> Vec<(String, Value)> {
        let mut entries = vec![
            ("job_task".to_string(), Value::String(self.task_name.clone())),
            ("job_fired_at".to_string(), Value::String(self.fired_at.to_rfc3339())),
            ("job_shard_index".to_string(), Value::from(self.shard_index)),
            ("job_shard_total".to_string(), Value::from(self.shard_total)),
        ];
        for (key, value) in &self.params {
            entries.push((key.clone(), value.clone()));
        }
        entries
    }
}

/// Tool metadata surfaced to a model for function calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Result of one tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub output: String,
    pub success: bool,
}
