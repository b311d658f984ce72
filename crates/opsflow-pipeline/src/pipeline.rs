//! Pipeline — an ordered list of stages plus the merge strategy table.
//!
//! Stage order is fixed at construction. The builder rejects duplicate
//! stage names so failures always point at one stage.

use std::collections::HashMap;
use std::sync::Arc;

use opsflow_core::{OpsflowError, Result};

use crate::stage::Stage;
use crate::state::{MergeStrategy, StateBag};

#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    stages: Vec<Stage>,
    strategies: Arc<HashMap<String, MergeStrategy>>,
}

impl Pipeline {
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder {
            name: name.into(),
            stages: Vec::new(),
            strategies: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    pub(crate) fn strategies(&self) -> Arc<HashMap<String, MergeStrategy>> {
        Arc::clone(&self.strategies)
    }

    /// Fresh bag bound to this pipeline's strategy table, ready to seed.
    pub fn seed_bag(&self) -> StateBag {
        StateBag::with_strategies(Arc::clone(&self.strategies))
    }
}

pub struct PipelineBuilder {
    name: String,
    stages: Vec<Stage>,
    strategies: HashMap<String, MergeStrategy>,
}

impl PipelineBuilder {
    /// Declare the merge strategy for a key. Undeclared keys replace.
    pub fn merge(mut self, key: impl Into<String>, strategy: MergeStrategy) -> Self {
        self.strategies.insert(key.into(), strategy);
        self
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        let mut seen = std::collections::HashSet::new();
        for stage in &self.stages {
            if !seen.insert(stage.name.as_str()) {
                return Err(OpsflowError::Config(format!(
                    "pipeline '{}' declares stage '{}' twice",
                    self.name, stage.name
                )));
            }
        }
        Ok(Pipeline {
            name: self.name,
            stages: self.stages,
            strategies: Arc::new(self.strategies),
        })
    }
}
