//! # OpsFlow — Scheduled Analytics Pipeline Engine
//!
//! Cron-driven report and alert pipelines over an order/feedback store.
//!
//! Usage:
//!   opsflow run                                    # Start the scheduler daemon
//!   opsflow fire daily_report                      # Trigger one task right now
//!   opsflow tasks list                             # Show scheduled tasks
//!   opsflow tasks add complaint_monitor --cron "0 18 * * *"
//!   opsflow pipelines                              # List built-in pipelines

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use opsflow_core::config::OpsflowConfig;
use opsflow_core::traits::{RecordStore, Tool};
use opsflow_core::types::JobContext;
use opsflow_notify::WebhookSink;
use opsflow_reports::{complaint_monitor_pipeline, daily_report_pipeline};
use opsflow_scheduler::{
    CreateScheduledPipelineTool, PipelineCatalog, SchedulerEngine, TaskFileStore, TaskRegistry,
};
use opsflow_store::MemoryStore;

#[derive(Parser)]
#[command(name = "opsflow", version, about = "⏰ OpsFlow — Scheduled Analytics Pipeline Engine")]
struct Cli {
    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the scheduler daemon
    Run,
    /// Trigger a scheduled task immediately
    Fire {
        /// Task name
        task: String,
        /// Zero-based shard index for this run
        #[arg(long, default_value_t = 0)]
        shard: i64,
        /// Total shard count
        #[arg(long, default_value_t = 1)]
        shard_total: i64,
        /// Extra seed entries, repeatable: --param access_token=abc123
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
    },
    /// Manage scheduled tasks
    Tasks {
        #[command(subcommand)]
        action: TaskAction,
    },
    /// List built-in pipelines
    Pipelines,
}

#[derive(Subcommand)]
enum TaskAction {
    /// Show scheduled tasks
    List,
    /// Schedule a built-in pipeline (the task is named after it)
    Add {
        /// Pipeline to schedule
        pipeline: String,
        /// Cron expression; minute and hour fields drive firing
        #[arg(long)]
        cron: String,
    },
    /// Remove a scheduled task
    Remove {
        /// Task name
        task: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "opsflow=debug" } else { "opsflow=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = OpsflowConfig::load()?;
    let app = App::assemble(&config)?;

    match cli.command {
        Command::Run => app.run_daemon().await,
        Command::Fire { task, shard, shard_total, params } => {
            app.fire(&task, shard, shard_total, &params).await
        }
        Command::Tasks { action } => match action {
            TaskAction::List => app.list_tasks().await,
            TaskAction::Add { pipeline, cron } => app.add_task(&pipeline, &cron).await,
            TaskAction::Remove { task } => app.remove_task(&task).await,
        },
        Command::Pipelines => {
            for name in app.catalog.names() {
                println!("  {name}");
            }
            Ok(())
        }
    }
}

struct App {
    catalog: Arc<PipelineCatalog>,
    registry: Arc<TaskRegistry>,
    engine: SchedulerEngine,
}

impl App {
    /// Wire the record store, model, webhook sink, pipeline catalog, and
    /// the persistent task registry. The demo store backs the binary until
    /// a real data backend is configured.
    fn assemble(config: &OpsflowConfig) -> Result<App> {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::demo());
        let model = opsflow_llm::create_model(config);
        let sink = Arc::new(WebhookSink::from_config(&config.webhook));

        let mut catalog = PipelineCatalog::new();
        catalog.register(Arc::new(daily_report_pipeline(
            Arc::clone(&store),
            Arc::clone(&model),
            Arc::clone(&sink),
            &config.report,
        )?));
        catalog.register(Arc::new(complaint_monitor_pipeline(store, model, sink, &config.report)?));
        let catalog = Arc::new(catalog);

        let task_store = if config.scheduler.store_dir.is_empty() {
            TaskFileStore::new(&TaskFileStore::default_path())
        } else {
            TaskFileStore::new(Path::new(&config.scheduler.store_dir))
        };
        let registry = Arc::new(TaskRegistry::with_store(Arc::clone(&catalog), task_store));
        let engine = SchedulerEngine::new(Arc::clone(&registry), config.scheduler.tick_secs);

        Ok(App { catalog, registry, engine })
    }

    async fn run_daemon(&self) -> Result<()> {
        let restored = self.registry.restore().await;

        println!("⏰ OpsFlow v{}", env!("CARGO_PKG_VERSION"));
        println!("   📦 Pipelines: {}", self.catalog.names().join(", "));
        println!("   📅 Tasks:     {restored} restored");
        println!("   Press Ctrl+C to stop\n");

        let shutdown = self.engine.shutdown_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!("\n🔔 Shutting down...");
                shutdown.cancel();
            }
        });

        self.engine.run().await;
        Ok(())
    }

    async fn fire(&self, task: &str, shard: i64, shard_total: i64, params: &[String]) -> Result<()> {
        self.registry.restore().await;

        let mut ctx = JobContext::new(task).with_shard(shard, shard_total);
        for pair in params {
            let Some((key, raw)) = pair.split_once('=') else {
                anyhow::bail!("--param expects KEY=VALUE, got '{pair}'");
            };
            // JSON literals pass through typed, anything else stays a string
            let value = serde_json::from_str(raw).unwrap_or_else(|_| json!(raw));
            ctx = ctx.with_param(key, value);
        }
        let bag = self.engine.fire(task, ctx).await?;

        println!("✅ '{task}' finished, final state:");
        println!("{}", serde_json::to_string_pretty(&bag.to_json())?);
        Ok(())
    }

    async fn list_tasks(&self) -> Result<()> {
        self.registry.restore().await;

        let tasks = self.registry.list().await;
        if tasks.is_empty() {
            println!("No scheduled tasks. Add one with: opsflow tasks add <pipeline> --cron \"0 9 * * *\"");
            return Ok(());
        }
        for task in tasks {
            let state = if task.enabled { "enabled" } else { "disabled" };
            let next = task
                .next_run
                .map(|n| n.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|| "-".into());
            println!("  {} → {} [{state}] cron '{}' next {next}", task.name, task.pipeline_name, task.cron);
        }
        Ok(())
    }

    // Registration goes through the same tool a pipeline run would call,
    // so the CLI and the in-run path cannot drift apart.
    async fn add_task(&self, pipeline: &str, cron: &str) -> Result<()> {
        self.registry.restore().await;

        let tool = CreateScheduledPipelineTool::new(Arc::clone(&self.registry));
        let args = json!({ "pipeline": pipeline, "cron": cron }).to_string();
        let result = tool.execute(&args).await?;
        if result.success {
            println!("✅ {}", result.output);
        } else {
            println!("❌ {}", result.output);
        }
        Ok(())
    }

    async fn remove_task(&self, task: &str) -> Result<()> {
        self.registry.restore().await;

        if self.registry.unregister(task).await {
            println!("🗑️ Removed '{task}'");
        } else {
            println!("⚠️ No task named '{task}'");
        }
        Ok(())
    }
}
