//! # OpsFlow Core
//!
//! Shared foundation for the OpsFlow workspace: configuration, the error
//! taxonomy, record types, and the trait seams (model, store, tool) the
//! other crates plug into.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::OpsflowConfig;
pub use error::{OpsflowError, Result};
pub use traits::{EntityKind, LanguageModel, RecordStore, Tool};
pub use types::{Feedback, JobContext, Order, Product, ToolDefinition, ToolResult};
