//! Pipeline catalog and the live task registry.
//!
//! The catalog is the fixed name-to-pipeline map assembled at startup.
//! The registry holds the scheduled bindings behind an async RwLock so
//! fires (reads) stay cheap while a live run's tool call can register a
//! new task (write) concurrently. Registration replaces by task name.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use opsflow_core::{OpsflowError, Result};
use opsflow_pipeline::Pipeline;

use crate::cron;
use crate::store::{TaskFileStore, TaskRecord};

/// A registered cron binding of a pipeline.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub id: String,
    pub name: String,
    pub pipeline_name: String,
    pub pipeline: Arc<Pipeline>,
    pub cron: String,
    pub created_at: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub run_count: u32,
    pub enabled: bool,
}

/// Name to pipeline map, fixed at startup.
#[derive(Debug, Clone, Default)]
pub struct PipelineCatalog {
    pipelines: HashMap<String, Arc<Pipeline>>,
}

impl PipelineCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, pipeline: Arc<Pipeline>) {
        self.pipelines.insert(pipeline.name().to_string(), pipeline);
    }

    pub fn get(&self, name: &str) -> Option<Arc<Pipeline>> {
        self.pipelines.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pipelines.keys().cloned().collect();
        names.sort();
        names
    }
}

pub struct TaskRegistry {
    catalog: Arc<PipelineCatalog>,
    tasks: RwLock<HashMap<String, ScheduledTask>>,
    store: Option<TaskFileStore>,
}

impl TaskRegistry {
    /// In-memory registry without persistence.
    pub fn new(catalog: Arc<PipelineCatalog>) -> Self {
        Self { catalog, tasks: RwLock::new(HashMap::new()), store: None }
    }

    /// Registry backed by a task file store.
    pub fn with_store(catalog: Arc<PipelineCatalog>, store: TaskFileStore) -> Self {
        Self { catalog, tasks: RwLock::new(HashMap::new()), store: Some(store) }
    }

    /// Re-register persisted bindings against the catalog. Bindings whose
    /// pipeline no longer exists are skipped with a warning.
    pub async fn restore(&self) -> usize {
        let Some(store) = &self.store else { return 0 };
        let records = store.load();
        let mut tasks = self.tasks.write().await;
        let mut restored = 0;
        for record in records {
            let Some(pipeline) = self.catalog.get(&record.pipeline) else {
                warn!("⚠️ skipping persisted task '{}': pipeline '{}' not in catalog", record.name, record.pipeline);
                continue;
            };
            let next_run = cron::next_run_from_cron(&record.cron, Utc::now());
            if next_run.is_none() {
                warn!("⚠️ skipping persisted task '{}': cron '{}' no longer parses", record.name, record.cron);
                continue;
            }
            tasks.insert(record.name.clone(), ScheduledTask {
                id: Uuid::new_v4().to_string(),
                name: record.name,
                pipeline_name: record.pipeline,
                pipeline,
                cron: record.cron,
                created_at: record.created_at,
                last_run: None,
                next_run,
                run_count: 0,
                enabled: record.enabled,
            });
            restored += 1;
        }
        if restored > 0 {
            info!("📅 restored {restored} scheduled task(s)");
        }
        restored
    }

    /// Register a pipeline under a task name, replacing any existing task
    /// with that name. Returns the new task id.
    pub async fn register(&self, name: &str, pipeline: Arc<Pipeline>, cron_expr: &str) -> Result<String> {
        if !cron::validate(cron_expr) {
            return Err(OpsflowError::Config(format!("invalid cron expression '{cron_expr}'")));
        }
        let task = ScheduledTask {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            pipeline_name: pipeline.name().to_string(),
            pipeline,
            cron: cron_expr.to_string(),
            created_at: Utc::now(),
            last_run: None,
            next_run: cron::next_run_from_cron(cron_expr, Utc::now()),
            run_count: 0,
            enabled: true,
        };
        let id = task.id.clone();
        {
            let mut tasks = self.tasks.write().await;
            if tasks.insert(name.to_string(), task).is_some() {
                info!("📅 task '{name}' replaced (cron '{cron_expr}')");
            } else {
                info!("📅 task '{name}' registered (cron '{cron_expr}')");
            }
        }
        self.persist().await;
        Ok(id)
    }

    /// Resolve a catalog pipeline by name and register it under that name.
    pub async fn register_by_name(&self, pipeline_name: &str, cron_expr: &str) -> Result<String> {
        let pipeline = self
            .catalog
            .get(pipeline_name)
            .ok_or_else(|| OpsflowError::PipelineNotFound(pipeline_name.to_string()))?;
        self.register(pipeline_name, pipeline, cron_expr).await
    }

    pub async fn unregister(&self, name: &str) -> bool {
        let removed = self.tasks.write().await.remove(name).is_some();
        if removed {
            info!("🗑️ task '{name}' unregistered");
            self.persist().await;
        }
        removed
    }

    pub async fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        let changed = {
            let mut tasks = self.tasks.write().await;
            match tasks.get_mut(name) {
                Some(task) => {
                    task.enabled = enabled;
                    true
                }
                None => false,
            }
        };
        if changed {
            self.persist().await;
        }
        changed
    }

    pub async fn get(&self, name: &str) -> Option<ScheduledTask> {
        self.tasks.read().await.get(name).cloned()
    }

    /// All tasks, sorted by name.
    pub async fn list(&self) -> Vec<ScheduledTask> {
        let mut tasks: Vec<ScheduledTask> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by(|a, b| a.name.cmp(&b.name));
        tasks
    }

    pub async fn count(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// Collect tasks due at `now`, advancing each one's schedule so a
    /// given fire time is handed out exactly once.
    pub(crate) async fn take_due(&self, now: DateTime<Utc>) -> Vec<ScheduledTask> {
        let mut due = Vec::new();
        let mut tasks = self.tasks.write().await;
        for task in tasks.values_mut() {
            if !task.enabled {
                continue;
            }
            let Some(next) = task.next_run else { continue };
            if next > now {
                continue;
            }
            task.last_run = Some(now);
            task.run_count += 1;
            task.next_run = cron::next_run_from_cron(&task.cron, now);
            due.push(task.clone());
        }
        due
    }

    /// Bookkeeping for an externally triggered fire.
    pub(crate) async fn mark_fired(&self, name: &str, now: DateTime<Utc>) {
        if let Some(task) = self.tasks.write().await.get_mut(name) {
            task.last_run = Some(now);
            task.run_count += 1;
        }
    }

    // Run state is not persisted, so only registration changes write.
    async fn persist(&self) {
        let Some(store) = &self.store else { return };
        let records: Vec<TaskRecord> = {
            let tasks = self.tasks.read().await;
            tasks
                .values()
                .map(|t| TaskRecord {
                    name: t.name.clone(),
                    pipeline: t.pipeline_name.clone(),
                    cron: t.cron.clone(),
                    created_at: t.created_at,
                    enabled: t.enabled,
                })
                .collect()
        };
        if let Err(e) = store.save(&records) {
            warn!("⚠️ failed to save task bindings: {e}");
        } else {
            debug!("💾 task bindings saved ({})", records.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn noop_pipeline(name: &str) -> Arc<Pipeline> {
        Arc::new(Pipeline::builder(name).build().unwrap())
    }

    fn catalog_with(names: &[&str]) -> Arc<PipelineCatalog> {
        let mut catalog = PipelineCatalog::new();
        for name in names {
            catalog.register(noop_pipeline(name));
        }
        Arc::new(catalog)
    }

    #[tokio::test]
    async fn register_by_name_resolves_through_catalog() {
        let registry = TaskRegistry::new(catalog_with(&["daily_report"]));
        let id = registry.register_by_name("daily_report", "0 16 * * *").await.unwrap();
        assert!(!id.is_empty());
        let task = registry.get("daily_report").await.unwrap();
        assert_eq!(task.pipeline_name, "daily_report");
        assert!(task.next_run.is_some());
    }

    #[tokio::test]
    async fn unknown_pipeline_is_an_error_value() {
        let registry = TaskRegistry::new(catalog_with(&["daily_report"]));
        let err = registry.register_by_name("no_such", "0 16 * * *").await.unwrap_err();
        assert!(matches!(err, OpsflowError::PipelineNotFound(_)));
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn invalid_cron_is_rejected_at_registration() {
        let registry = TaskRegistry::new(catalog_with(&["daily_report"]));
        let err = registry.register_by_name("daily_report", "whenever").await.unwrap_err();
        assert!(matches!(err, OpsflowError::Config(_)));
    }

    #[tokio::test]
    async fn registration_replaces_by_name() {
        let registry = TaskRegistry::new(catalog_with(&["daily_report"]));
        registry.register_by_name("daily_report", "0 16 * * *").await.unwrap();
        registry.register_by_name("daily_report", "0 8 * * *").await.unwrap();
        assert_eq!(registry.count().await, 1);
        assert_eq!(registry.get("daily_report").await.unwrap().cron, "0 8 * * *");
    }

    #[tokio::test]
    async fn unregister_reports_presence() {
        let registry = TaskRegistry::new(catalog_with(&["daily_report"]));
        registry.register_by_name("daily_report", "0 16 * * *").await.unwrap();
        assert!(registry.unregister("daily_report").await);
        assert!(!registry.unregister("daily_report").await);
    }

    #[tokio::test]
    async fn a_fire_time_is_handed_out_exactly_once() {
        let registry = TaskRegistry::new(catalog_with(&["daily_report"]));
        registry.register_by_name("daily_report", "* * * * *").await.unwrap();

        let scheduled = registry.get("daily_report").await.unwrap().next_run.unwrap();
        let now = scheduled + Duration::seconds(1);

        let first = registry.take_due(now).await;
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].run_count, 1);

        let second = registry.take_due(now).await;
        assert!(second.is_empty());

        let task = registry.get("daily_report").await.unwrap();
        assert!(task.next_run.unwrap() > now);
    }

    #[tokio::test]
    async fn disabled_tasks_never_fire() {
        let registry = TaskRegistry::new(catalog_with(&["daily_report"]));
        registry.register_by_name("daily_report", "* * * * *").await.unwrap();
        registry.set_enabled("daily_report", false).await;

        let scheduled = registry.get("daily_report").await.unwrap().next_run.unwrap();
        let due = registry.take_due(scheduled + Duration::seconds(1)).await;
        assert!(due.is_empty());
    }

    #[tokio::test]
    async fn bindings_survive_a_restart() {
        let dir = std::env::temp_dir().join("opsflow-test-registry-restart");
        std::fs::remove_dir_all(&dir).ok();
        let catalog = catalog_with(&["daily_report"]);

        let registry = TaskRegistry::with_store(Arc::clone(&catalog), TaskFileStore::new(&dir));
        registry.register_by_name("daily_report", "0 16 * * *").await.unwrap();

        let reborn = TaskRegistry::with_store(catalog, TaskFileStore::new(&dir));
        assert_eq!(reborn.restore().await, 1);
        assert_eq!(reborn.get("daily_report").await.unwrap().cron, "0 16 * * *");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn restore_skips_bindings_without_a_pipeline() {
        let dir = std::env::temp_dir().join("opsflow-test-registry-orphan");
        std::fs::remove_dir_all(&dir).ok();

        let registry = TaskRegistry::with_store(catalog_with(&["kept"]), TaskFileStore::new(&dir));
        registry.register_by_name("kept", "0 16 * * *").await.unwrap();

        // Catalog in the next process no longer has the pipeline.
        let reborn = TaskRegistry::with_store(catalog_with(&["other"]), TaskFileStore::new(&dir));
        assert_eq!(reborn.restore().await, 0);
        std::fs::remove_dir_all(&dir).ok();
    }
}
