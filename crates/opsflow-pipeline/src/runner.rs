//! Runner — sequential stage execution with per-key merge.
//!
//! Stages run in declared order over a snapshot of the bag; each returned
//! partial update is merged before the next stage starts. The first
//! transform, classify, or iterate failure abandons the run. Notify
//! failures are captured into the bag instead so a dead webhook never
//! fails a report that already computed.

use std::time::Instant;

use serde_json::Value;
use tracing::{debug, error, warn};

use opsflow_core::{OpsflowError, Result};

use crate::iterate;
use crate::pipeline::Pipeline;
use crate::stage::StageKind;
use crate::state::{StateBag, StateUpdate};

pub struct PipelineRunner;

impl PipelineRunner {
    /// Run every stage over the seeded bag and return the final bag.
    pub async fn execute(pipeline: &Pipeline, seed: StateBag) -> Result<StateBag> {
        let mut bag = seed;
        bag.bind_strategies(pipeline.strategies());

        let total = pipeline.stages().len();
        let started = Instant::now();
        debug!("▶️ pipeline '{}' starting ({total} stages)", pipeline.name());

        for (index, stage) in pipeline.stages().iter().enumerate() {
            debug!("⚙️ [{}/{total}] {} stage '{}'", index + 1, stage.kind_name(), stage.name);
            let update = match &stage.kind {
                StageKind::Transform(f) | StageKind::Classify(f) => f(bag.clone())
                    .await
                    .map_err(|e| stage_error(pipeline.name(), &stage.name, e))
                    .inspect_err(|e| error!("❌ {e}"))?,
                StageKind::Iterate(it) => iterate::run(&stage.name, it, &bag)
                    .await
                    .map_err(|e| stage_error(pipeline.name(), &stage.name, e))
                    .inspect_err(|e| error!("❌ {e}"))?,
                StageKind::Notify(f) => match f(bag.clone()).await {
                    Ok(update) => update,
                    Err(e) => {
                        warn!("⚠️ notify stage '{}' failed, run continues: {e}", stage.name);
                        let mut update = StateUpdate::new();
                        update.insert(format!("{}_result", stage.name), Value::String(format!("send failed: {e}")));
                        update
                    }
                },
            };
            bag.apply_update(update);
        }

        debug!("✅ pipeline '{}' finished in {:?}", pipeline.name(), started.elapsed());
        Ok(bag)
    }
}

// Keep the innermost stage attribution when an error bubbles out of a
// nested sub-pipeline.
fn stage_error(pipeline: &str, stage: &str, err: OpsflowError) -> OpsflowError {
    match err {
        e @ OpsflowError::Stage { .. } => e,
        e => OpsflowError::stage(pipeline, stage, e.to_string()),
    }
}
