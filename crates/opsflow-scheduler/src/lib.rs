//! # OpsFlow Scheduler
//!
//! Cron-driven execution of registered pipelines: a pipeline catalog, a
//! concurrent task registry with file-backed bindings, a tick loop that
//! spawns one tokio task per fire, and a registration tool for runtime
//! scheduling.

pub mod cron;
pub mod engine;
pub mod registry;
pub mod store;
pub mod tools;

pub use engine::SchedulerEngine;
pub use registry::{PipelineCatalog, ScheduledTask, TaskRegistry};
pub use store::{TaskFileStore, TaskRecord};
pub use tools::CreateScheduledPipelineTool;
