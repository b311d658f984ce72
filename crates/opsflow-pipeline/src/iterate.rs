//! Iterate stage — bounded fan-out over an array key, fan-in in order.
//!
//! Each element gets a fresh isolated bag holding only the item key, runs
//! the sub-pipeline, and contributes the value found under the item result
//! key. Elements run concurrently up to the worker limit through an ordered
//! buffered stream, so output index i always corresponds to input index i
//! no matter which element finishes first. Nothing from an inner bag leaks
//! into the outer bag except through the declared output key.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{self, StreamExt, TryStreamExt};
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, warn};

use opsflow_core::Result;

use crate::pipeline::Pipeline;
use crate::runner::PipelineRunner;
use crate::state::{StateBag, StateUpdate};

const DEFAULT_WORKERS: usize = 4;

/// What a failed element does to the batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ItemErrorPolicy {
    /// The failed slot yields JSON null; the batch keeps going.
    #[default]
    SkipElement,
    /// First failure fails the whole run.
    AbortRun,
}

#[derive(Debug, Clone)]
pub struct IterateStage {
    /// Bag key holding the input array.
    pub input_key: String,
    /// Key the current element is seeded under in the inner bag.
    pub item_key: String,
    /// Key read back from the inner bag after the sub-pipeline finishes.
    pub item_result_key: String,
    /// Bag key the ordered result array is written to.
    pub output_key: String,
    pub sub: Arc<Pipeline>,
    pub workers: usize,
    pub on_item_error: ItemErrorPolicy,
}

impl IterateStage {
    pub fn new(
        input_key: impl Into<String>,
        item_key: impl Into<String>,
        item_result_key: impl Into<String>,
        output_key: impl Into<String>,
        sub: Arc<Pipeline>,
    ) -> Self {
        Self {
            input_key: input_key.into(),
            item_key: item_key.into(),
            item_result_key: item_result_key.into(),
            output_key: output_key.into(),
            sub,
            workers: DEFAULT_WORKERS,
            on_item_error: ItemErrorPolicy::default(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn on_error(mut self, policy: ItemErrorPolicy) -> Self {
        self.on_item_error = policy;
        self
    }
}

// Returns a boxed future to break the `Send` inference cycle between this
// function and `PipelineRunner::execute`, which await each other for nested
// iterate stages.
pub(crate) fn run<'a>(
    stage_name: &'a str,
    it: &'a IterateStage,
    bag: &'a StateBag,
) -> BoxFuture<'a, Result<StateUpdate>> {
    async move {
        let items = bag.array_or(&it.input_key);
        let mut update = StateUpdate::new();

        if items.is_empty() {
            debug!("🔁 '{stage_name}': no '{}' elements, emitting empty output", it.input_key);
            update.insert(it.output_key.clone(), Value::Array(Vec::new()));
            return Ok(update);
        }

        let total = items.len();
        debug!("🔁 '{stage_name}': {total} elements, {} workers", it.workers);

        let element_runs = items.into_iter().enumerate().map(|(index, item)| {
            let sub = Arc::clone(&it.sub);
            let item_key = it.item_key.clone();
            let result_key = it.item_result_key.clone();
            let policy = it.on_item_error;
            let stage = stage_name.to_string();
            async move {
                let mut seed = sub.seed_bag();
                seed.insert(item_key, item);
                match PipelineRunner::execute(&sub, seed).await {
                    Ok(inner) => Ok(inner.get(&result_key).cloned().unwrap_or(Value::Null)),
                    Err(e) => match policy {
                        ItemErrorPolicy::SkipElement => {
                            warn!("⚠️ '{stage}' element {}/{total} failed, slot nulled: {e}", index + 1);
                            Ok(Value::Null)
                        }
                        ItemErrorPolicy::AbortRun => Err(e),
                    },
                }
            }
            .boxed()
        });

        // buffered() preserves input order across the worker pool.
        let results: Vec<Value> = stream::iter(element_runs).buffered(it.workers).try_collect().await?;

        update.insert(it.output_key.clone(), Value::Array(results));
        Ok(update)
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::Stage;
    use rand::Rng;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn tenfold_sub(runs: Arc<AtomicUsize>) -> Arc<Pipeline> {
        Arc::new(
            Pipeline::builder("tenfold")
                .stage(Stage::transform("times_ten", move |bag: StateBag| {
                    let runs = Arc::clone(&runs);
                    async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        let jitter = rand::thread_rng().gen_range(1..20);
                        tokio::time::sleep(Duration::from_millis(jitter)).await;
                        let n = bag.u64_or("item", 0);
                        let mut u = StateUpdate::new();
                        u.insert("item_out".into(), json!(n * 10));
                        Ok(u)
                    }
                }))
                .build()
                .unwrap(),
        )
    }

    fn outer(sub: Arc<Pipeline>, policy: ItemErrorPolicy) -> Pipeline {
        Pipeline::builder("outer")
            .stage(Stage::iterate(
                "fan_out",
                IterateStage::new("inputs", "item", "item_out", "outputs", sub)
                    .with_workers(3)
                    .on_error(policy),
            ))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn empty_input_yields_empty_output_without_sub_runs() {
        let runs = Arc::new(AtomicUsize::new(0));
        let pipeline = outer(tenfold_sub(Arc::clone(&runs)), ItemErrorPolicy::SkipElement);
        let bag = PipelineRunner::execute(&pipeline, pipeline.seed_bag()).await.unwrap();
        assert_eq!(bag.get("outputs"), Some(&json!([])));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn output_order_matches_input_despite_latency_jitter() {
        let runs = Arc::new(AtomicUsize::new(0));
        let pipeline = outer(tenfold_sub(Arc::clone(&runs)), ItemErrorPolicy::SkipElement);
        let mut seed = pipeline.seed_bag();
        seed.insert("inputs", json!([0, 1, 2, 3, 4, 5, 6, 7]));
        let bag = PipelineRunner::execute(&pipeline, seed).await.unwrap();
        assert_eq!(bag.get("outputs"), Some(&json!([0, 10, 20, 30, 40, 50, 60, 70])));
        assert_eq!(runs.load(Ordering::SeqCst), 8);
    }

    fn failing_sub() -> Arc<Pipeline> {
        Arc::new(
            Pipeline::builder("picky")
                .stage(Stage::transform("reject_two", |bag: StateBag| async move {
                    let n = bag.u64_or("item", 0);
                    if n == 2 {
                        return Err(opsflow_core::OpsflowError::MalformedResponse("bad element".into()));
                    }
                    let mut u = StateUpdate::new();
                    u.insert("item_out".into(), json!(n));
                    Ok(u)
                }))
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn skipped_element_becomes_null_slot_at_its_index() {
        let pipeline = outer(failing_sub(), ItemErrorPolicy::SkipElement);
        let mut seed = pipeline.seed_bag();
        seed.insert("inputs", json!([1, 2, 3]));
        let bag = PipelineRunner::execute(&pipeline, seed).await.unwrap();
        assert_eq!(bag.get("outputs"), Some(&json!([1, null, 3])));
    }

    #[tokio::test]
    async fn abort_policy_fails_the_whole_run() {
        let pipeline = outer(failing_sub(), ItemErrorPolicy::AbortRun);
        let mut seed = pipeline.seed_bag();
        seed.insert("inputs", json!([1, 2, 3]));
        let result = PipelineRunner::execute(&pipeline, seed).await;
        assert!(matches!(result, Err(opsflow_core::OpsflowError::Stage { .. })));
    }

    #[tokio::test]
    async fn element_without_result_key_yields_null() {
        let silent = Arc::new(
            Pipeline::builder("silent")
                .stage(Stage::transform("noop", |_| async { Ok(StateUpdate::new()) }))
                .build()
                .unwrap(),
        );
        let pipeline = outer(silent, ItemErrorPolicy::SkipElement);
        let mut seed = pipeline.seed_bag();
        seed.insert("inputs", json!(["a", "b"]));
        let bag = PipelineRunner::execute(&pipeline, seed).await.unwrap();
        assert_eq!(bag.get("outputs"), Some(&json!([null, null])));
    }
}
