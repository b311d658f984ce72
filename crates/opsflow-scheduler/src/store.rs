//! File-based task store — lightweight persistence.
//!
//! Registered task bindings are saved as one pretty JSON file, rewritten
//! on every registry change and read once at startup. Mid-run pipeline
//! state is never persisted; a restart re-resolves each binding against
//! the pipeline catalog.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use opsflow_core::{OpsflowConfig, Result};

/// The persisted slice of a scheduled task: enough to re-register it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub name: String,
    pub pipeline: String,
    pub cron: String,
    pub created_at: DateTime<Utc>,
    pub enabled: bool,
}

pub struct TaskFileStore {
    path: PathBuf,
}

impl TaskFileStore {
    pub fn new(dir: &Path) -> Self {
        std::fs::create_dir_all(dir).ok();
        Self { path: dir.to_path_buf() }
    }

    /// Default store directory (~/.opsflow/scheduler).
    pub fn default_path() -> PathBuf {
        OpsflowConfig::config_dir().join("scheduler")
    }

    pub fn save(&self, records: &[TaskRecord]) -> Result<()> {
        let file = self.path.join("tasks.json");
        let json = serde_json::to_string_pretty(records)?;
        std::fs::write(&file, &json)?;
        tracing::debug!("💾 saved {} task bindings to {}", records.len(), file.display());
        Ok(())
    }

    /// Lenient load: a missing or unreadable file is an empty registry.
    pub fn load(&self) -> Vec<TaskRecord> {
        let file = self.path.join("tasks.json");
        if !file.exists() {
            return Vec::new();
        }
        match std::fs::read_to_string(&file) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!("⚠️ failed to parse tasks.json: {e}");
                Vec::new()
            }),
            Err(e) => {
                tracing::warn!("⚠️ failed to read tasks.json: {e}");
                Vec::new()
            }
        }
    }
}
