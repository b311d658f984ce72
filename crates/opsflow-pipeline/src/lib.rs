//! # OpsFlow Pipeline
//!
//! The execution engine: a per-run state bag with declared merge
//! strategies, a closed set of stage kinds, a sequential runner, and a
//! bounded fan-out iterate stage. Pipelines are plain values built once at
//! startup and shared behind `Arc`.

pub mod iterate;
pub mod pipeline;
pub mod runner;
pub mod stage;
pub mod state;
pub mod template;

pub use iterate::{IterateStage, ItemErrorPolicy};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use runner::PipelineRunner;
pub use stage::{Stage, StageFn, StageKind};
pub use state::{MergeStrategy, StateBag, StateUpdate};
