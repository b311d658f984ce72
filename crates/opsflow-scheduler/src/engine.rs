//! Scheduler engine — the tick loop that fires due tasks.
//!
//! Each fire runs on its own tokio task with a fresh seed bag, so a slow
//! pipeline never stalls the tick and overlapping fires of the same task
//! are allowed. `fire` is also the entry point for external triggers
//! (CLI, job callbacks), which may carry a shard index and params.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use opsflow_core::{JobContext, OpsflowError, Result};
use opsflow_pipeline::{Pipeline, PipelineRunner, StateBag};

use crate::registry::{ScheduledTask, TaskRegistry};

pub struct SchedulerEngine {
    registry: Arc<TaskRegistry>,
    tick_secs: u64,
    shutdown: CancellationToken,
}

impl SchedulerEngine {
    pub fn new(registry: Arc<TaskRegistry>, tick_secs: u64) -> Self {
        Self {
            registry,
            tick_secs: tick_secs.max(1),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> Arc<TaskRegistry> {
        Arc::clone(&self.registry)
    }

    /// Token to cancel the tick loop from the outside (ctrl-c handler).
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Tick until cancelled. In-flight fires finish on their own tasks.
    pub async fn run(&self) {
        info!("⏰ scheduler started (tick every {}s)", self.tick_secs);
        let mut interval = tokio::time::interval(Duration::from_secs(self.tick_secs));
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("⏰ scheduler stopping");
                    break;
                }
                _ = interval.tick() => {
                    let due = self.registry.take_due(Utc::now()).await;
                    for task in due {
                        info!("🔔 task '{}' due (run #{})", task.name, task.run_count);
                        spawn_fire(task);
                    }
                }
            }
        }
    }

    /// Externally triggered fire. Unknown names are reported, never panic,
    /// and no pipeline executes for them.
    pub async fn fire(&self, name: &str, ctx: JobContext) -> Result<StateBag> {
        let Some(task) = self.registry.get(name).await else {
            warn!("⚠️ fire requested for unknown task '{name}'");
            return Err(OpsflowError::TaskNotFound(name.to_string()));
        };
        self.registry.mark_fired(name, Utc::now()).await;
        info!("🔔 firing task '{}' (pipeline '{}')", task.name, task.pipeline_name);
        let mut ctx = ctx;
        ctx.task_name = task.name.clone();
        let seed = seeded_bag(&task.pipeline, &ctx);
        PipelineRunner::execute(&task.pipeline, seed).await
    }
}

fn spawn_fire(task: ScheduledTask) {
    tokio::spawn(async move {
        let ctx = JobContext::new(&task.name);
        let seed = seeded_bag(&task.pipeline, &ctx);
        match PipelineRunner::execute(&task.pipeline, seed).await {
            Ok(bag) => info!("✅ task '{}' finished ({} state keys)", task.name, bag.len()),
            Err(e) => error!("❌ task '{}' failed: {e}", task.name),
        }
    });
}

fn seeded_bag(pipeline: &Pipeline, ctx: &JobContext) -> StateBag {
    let mut seed = pipeline.seed_bag();
    for (key, value) in ctx.seed_entries() {
        seed.insert(key, value);
    }
    seed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PipelineCatalog;
    use opsflow_pipeline::{Stage, StateUpdate};
    use serde_json::json;

    fn echo_catalog() -> Arc<PipelineCatalog> {
        let pipeline = Pipeline::builder("echo")
            .stage(Stage::transform("echo_job", |bag: StateBag| async move {
                let mut u = StateUpdate::new();
                u.insert("fired_task".into(), json!(bag.str_or("job_task", "?")));
                u.insert("token_seen".into(), json!(bag.str_or("access_token", "")));
                Ok(u)
            }))
            .build()
            .unwrap();
        let mut catalog = PipelineCatalog::new();
        catalog.register(Arc::new(pipeline));
        Arc::new(catalog)
    }

    #[tokio::test]
    async fn fire_unknown_task_reports_not_found() {
        let engine = SchedulerEngine::new(Arc::new(TaskRegistry::new(echo_catalog())), 30);
        let err = engine.fire("ghost", JobContext::new("ghost")).await.unwrap_err();
        assert!(matches!(err, OpsflowError::TaskNotFound(_)));
    }

    #[tokio::test]
    async fn fire_seeds_job_context_into_the_bag() {
        let registry = Arc::new(TaskRegistry::new(echo_catalog()));
        registry.register_by_name("echo", "0 16 * * *").await.unwrap();
        let engine = SchedulerEngine::new(Arc::clone(&registry), 30);

        let ctx = JobContext::new("ignored").with_param("access_token", json!("tok-123"));
        let bag = engine.fire("echo", ctx).await.unwrap();

        assert_eq!(bag.str_or("fired_task", ""), "echo");
        assert_eq!(bag.str_or("token_seen", ""), "tok-123");
        assert_eq!(registry.get("echo").await.unwrap().run_count, 1);
    }

    #[tokio::test]
    async fn shutdown_token_stops_the_loop() {
        let engine = Arc::new(SchedulerEngine::new(Arc::new(TaskRegistry::new(echo_catalog())), 1));
        let token = engine.shutdown_token();
        let looped = Arc::clone(&engine);
        let handle = tokio::spawn(async move { looped.run().await });
        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop should stop after cancel")
            .unwrap();
    }
}
