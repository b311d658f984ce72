//! State bag — the per-run key/value store stages read and write.
//!
//! A bag is created fresh for every run, seeded, threaded through the
//! stages, and discarded after the terminal stage. Stages never mutate it
//! directly; they return a partial update and the runner merges it in,
//! resolving each key against the strategy table fixed at pipeline
//! construction.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use opsflow_core::Result;

/// How an incoming value for a key combines with what the bag already holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// New value overwrites the old. The default for undeclared keys.
    #[default]
    Replace,
    /// Push onto an array, creating one over a scalar prior.
    Append,
    /// Numeric addition, absent prior acts as 0.
    Sum,
}

/// Partial update returned by a stage: key to new value.
pub type StateUpdate = serde_json::Map<String, Value>;

/// The per-run state bag.
#[derive(Debug, Clone, Default)]
pub struct StateBag {
    values: HashMap<String, Value>,
    strategies: Arc<HashMap<String, MergeStrategy>>,
}

impl StateBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bag bound to a pipeline's strategy table.
    pub fn with_strategies(strategies: Arc<HashMap<String, MergeStrategy>>) -> Self {
        Self { values: HashMap::new(), strategies }
    }

    pub(crate) fn bind_strategies(&mut self, strategies: Arc<HashMap<String, MergeStrategy>>) {
        self.strategies = strategies;
    }

    /// Raw write, used for seeding. Always replaces.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// String read with a fallback for absent or non-string values.
    pub fn str_or(&self, key: &str, default: &str) -> String {
        match self.values.get(key) {
            Some(Value::String(s)) => s.clone(),
            _ => default.to_string(),
        }
    }

    pub fn f64_or(&self, key: &str, default: f64) -> f64 {
        self.values.get(key).and_then(Value::as_f64).unwrap_or(default)
    }

    pub fn u64_or(&self, key: &str, default: u64) -> u64 {
        self.values.get(key).and_then(Value::as_u64).unwrap_or(default)
    }

    /// Array read; absent or non-array yields an empty list.
    pub fn array_or(&self, key: &str) -> Vec<Value> {
        match self.values.get(key) {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    }

    /// Deserialize a stored value into a concrete type.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.values.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Merge a stage's partial update, key by key, per declared strategy.
    pub fn apply_update(&mut self, update: StateUpdate) {
        for (key, incoming) in update {
            let strategy = self.strategies.get(&key).copied().unwrap_or_default();
            let merged = merge(strategy, self.values.remove(&key), incoming);
            self.values.insert(key, merged);
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Snapshot as a JSON object, for logs and the CLI dump.
    pub fn to_json(&self) -> Value {
        Value::Object(self.values.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

fn merge(strategy: MergeStrategy, prior: Option<Value>, incoming: Value) -> Value {
    match strategy {
        MergeStrategy::Replace => incoming,
        MergeStrategy::Append => {
            let mut items = match prior {
                Some(Value::Array(items)) => items,
                Some(scalar) => vec![scalar],
                None => Vec::new(),
            };
            match incoming {
                Value::Array(more) => items.extend(more),
                single => items.push(single),
            }
            Value::Array(items)
        }
        MergeStrategy::Sum => sum(prior, incoming),
    }
}

// Integer addition while both sides are integers, f64 otherwise.
// Non-numeric operands fall back to replace.
fn sum(prior: Option<Value>, incoming: Value) -> Value {
    let prior = prior.unwrap_or(Value::from(0));
    if let (Some(a), Some(b)) = (prior.as_i64(), incoming.as_i64()) {
        return Value::from(a + b);
    }
    match (prior.as_f64(), incoming.as_f64()) {
        (Some(a), Some(b)) => serde_json::Number::from_f64(a + b).map(Value::Number).unwrap_or(incoming),
        _ => incoming,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bag_with(key: &str, strategy: MergeStrategy) -> StateBag {
        let mut strategies = HashMap::new();
        strategies.insert(key.to_string(), strategy);
        StateBag::with_strategies(Arc::new(strategies))
    }

    fn update(key: &str, value: Value) -> StateUpdate {
        let mut u = StateUpdate::new();
        u.insert(key.to_string(), value);
        u
    }

    #[test]
    fn replace_keeps_only_the_last_write() {
        let mut bag = bag_with("summary", MergeStrategy::Replace);
        bag.apply_update(update("summary", json!("first")));
        bag.apply_update(update("summary", json!("second")));
        assert_eq!(bag.get("summary"), Some(&json!("second")));
    }

    #[test]
    fn undeclared_key_defaults_to_replace() {
        let mut bag = StateBag::new();
        bag.apply_update(update("x", json!(1)));
        bag.apply_update(update("x", json!(2)));
        assert_eq!(bag.get("x"), Some(&json!(2)));
    }

    #[test]
    fn append_grows_an_array_and_wraps_scalar_prior() {
        let mut bag = bag_with("lines", MergeStrategy::Append);
        bag.apply_update(update("lines", json!("a")));
        bag.apply_update(update("lines", json!(["b", "c"])));
        assert_eq!(bag.get("lines"), Some(&json!(["a", "b", "c"])));
    }

    #[test]
    fn sum_treats_absent_prior_as_zero() {
        let mut bag = bag_with("count", MergeStrategy::Sum);
        bag.apply_update(update("count", json!(3)));
        bag.apply_update(update("count", json!(4)));
        assert_eq!(bag.get("count"), Some(&json!(7)));
    }

    #[test]
    fn sum_switches_to_float_when_needed() {
        let mut bag = bag_with("revenue", MergeStrategy::Sum);
        bag.apply_update(update("revenue", json!(1.5)));
        bag.apply_update(update("revenue", json!(2)));
        assert_eq!(bag.f64_or("revenue", 0.0), 3.5);
    }

    #[test]
    fn typed_reads_fall_back_to_defaults() {
        let mut bag = StateBag::new();
        bag.insert("name", json!("daily"));
        assert_eq!(bag.str_or("name", "?"), "daily");
        assert_eq!(bag.str_or("missing", "?"), "?");
        assert_eq!(bag.f64_or("missing", 1.25), 1.25);
        assert_eq!(bag.u64_or("missing", 9), 9);
        assert!(bag.array_or("missing").is_empty());
    }
}
