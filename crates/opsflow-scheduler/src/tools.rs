//! Scheduling tools — the function-calling surface for task registration.
//!
//! A model (or the CLI, which speaks the same JSON argument format) can
//! bind any catalog pipeline to a cron expression at runtime. Domain
//! failures come back as plain text with `success: false`; only broken
//! argument payloads are hard errors.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use opsflow_core::{OpsflowError, Result, Tool, ToolDefinition, ToolResult};

use crate::registry::TaskRegistry;

pub struct CreateScheduledPipelineTool {
    registry: Arc<TaskRegistry>,
}

impl CreateScheduledPipelineTool {
    pub fn new(registry: Arc<TaskRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Tool for CreateScheduledPipelineTool {
    fn name(&self) -> &str {
        "create_scheduled_pipeline"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: "Schedule a named pipeline on a cron expression. \
                          Replaces any existing schedule with the same name."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "cron": {
                        "type": "string",
                        "description": "Cron expression, e.g. '0 16 * * *' (5-field) or '0 0 16 * * ?' (with seconds)"
                    },
                    "pipeline": {
                        "type": "string",
                        "description": "Catalog name of the pipeline to schedule"
                    }
                },
                "required": ["cron", "pipeline"]
            }),
        }
    }

    async fn execute(&self, arguments: &str) -> Result<ToolResult> {
        let args: Value = serde_json::from_str(arguments)
            .map_err(|e| OpsflowError::Tool(format!("invalid arguments: {e}")))?;
        let cron = args["cron"]
            .as_str()
            .ok_or_else(|| OpsflowError::Tool("missing 'cron' argument".into()))?;
        let pipeline = args["pipeline"]
            .as_str()
            .ok_or_else(|| OpsflowError::Tool("missing 'pipeline' argument".into()))?;

        let (output, success) = match self.registry.register_by_name(pipeline, cron).await {
            Ok(_) => (format!("Scheduled pipeline '{pipeline}' with cron '{cron}'"), true),
            Err(OpsflowError::PipelineNotFound(_)) => ("Pipeline not found".to_string(), false),
            Err(OpsflowError::Config(msg)) => (msg, false),
            Err(e) => return Err(e),
        };
        Ok(ToolResult { tool_call_id: String::new(), output, success })
    }
}
