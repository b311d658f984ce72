//! Stage — one named unit of work inside a pipeline.
//!
//! The kinds are a closed set dispatched by match. Transform and classify
//! share the same shape (an async function over a bag snapshot); they are
//! kept distinct because the runner reports them differently and a
//! classify failure usually means a model problem, not a data problem.
//! Notify stages never fail a run.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use opsflow_core::Result;

use crate::iterate::IterateStage;
use crate::state::{StateBag, StateUpdate};

/// Boxed async stage body: bag snapshot in, partial update out.
pub type StageFn = Arc<dyn Fn(StateBag) -> BoxFuture<'static, Result<StateUpdate>> + Send + Sync>;

/// One unit of work. Names are unique within a pipeline and carry
/// through logs and errors.
#[derive(Clone)]
pub struct Stage {
    pub name: String,
    pub kind: StageKind,
}

#[derive(Clone)]
pub enum StageKind {
    /// Plain computation over the bag.
    Transform(StageFn),
    /// A model call; same shape as Transform, reported separately.
    Classify(StageFn),
    /// Outbound delivery; errors are captured into the bag, never raised.
    Notify(StageFn),
    /// Fan-out over an array key through a sub-pipeline.
    Iterate(IterateStage),
}

impl Stage {
    pub fn transform<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(StateBag) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<StateUpdate>> + Send + 'static,
    {
        Self { name: name.into(), kind: StageKind::Transform(boxed(f)) }
    }

    pub fn classify<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(StateBag) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<StateUpdate>> + Send + 'static,
    {
        Self { name: name.into(), kind: StageKind::Classify(boxed(f)) }
    }

    pub fn notify<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(StateBag) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<StateUpdate>> + Send + 'static,
    {
        Self { name: name.into(), kind: StageKind::Notify(boxed(f)) }
    }

    pub fn iterate(name: impl Into<String>, stage: IterateStage) -> Self {
        Self { name: name.into(), kind: StageKind::Iterate(stage) }
    }

    /// Variant label for logs.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            StageKind::Transform(_) => "transform",
            StageKind::Classify(_) => "classify",
            StageKind::Notify(_) => "notify",
            StageKind::Iterate(_) => "iterate",
        }
    }
}

fn boxed<F, Fut>(f: F) -> StageFn
where
    F: Fn(StateBag) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<StateUpdate>> + Send + 'static,
{
    Arc::new(move |bag| Box::pin(f(bag)))
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("kind", &self.kind_name())
            .finish()
    }
}
