//! Report pipelines — the two built-in analytics flows.
//!
//! `daily_report` aggregates an order/feedback window into a markdown
//! card; `complaint_monitor` classifies each feedback line individually
//! and raises an alert card. Both compute every number mechanically and
//! use the model only for prose, so a model outage degrades commentary,
//! never the figures.

pub mod complaint_monitor;
pub mod daily_report;
pub mod stats;
pub mod window;

pub use complaint_monitor::complaint_monitor_pipeline;
pub use daily_report::daily_report_pipeline;
