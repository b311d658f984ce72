//! Daily operations report pipeline.
//!
//! load_window gathers the month-to-date orders and feedback plus the
//! prior window's orders; aggregate turns them into flat template fields;
//! compose_report substitutes every number mechanically and asks the
//! model for the free-text analyst sections only; send_report delivers
//! the markdown card. Numbers in the delivered report never pass through
//! the model.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use opsflow_core::config::ReportConfig;
use opsflow_core::traits::{EntityKind, LanguageModel, RecordStore};
use opsflow_core::types::{Feedback, Order};
use opsflow_core::Result;
use opsflow_notify::WebhookSink;
use opsflow_pipeline::{MergeStrategy, Pipeline, Stage, StateBag, StateUpdate, template};

use crate::stats::{self, RankMetric};
use crate::window::{self, retry_once};

pub const PIPELINE_NAME: &str = "daily_report";

const REPORT_TEMPLATE: &str = "\
# {store_name} Daily Report ({report_date})

## Overview
- Orders: {total_orders} ({orders_delta} vs prior period)
- Revenue: {total_revenue} ({revenue_delta} vs prior period)
- Average order value: {avg_order_value}

## Top products by quantity
{top_quantity_rows}

## Top products by revenue
{top_revenue_rows}

## Customer sentiment
- Positive {positive_pct} / Neutral {neutral_pct} / Negative {negative_pct}
- Stars: {star_line}
- Feedback received: {feedback_total} ({rated_total} rated)

## Recent feedback
{feedback_excerpts}

## Analyst notes
{insights}

Generated at {report_time}
";

const ANALYST_PROMPT: &str = "\
You are a retail operations analyst. You receive a metrics digest and \
verbatim customer feedback for one store. Write three short markdown \
sections titled 'Key takeaways', 'Risks', and 'Recommendations'. Ground \
every claim in the digest or the feedback, do not restate raw numbers as \
your own calculations, and keep the whole answer under 12 lines.";

/// Keys this pipeline writes, all replace-on-write.
const STATE_KEYS: &[&str] = &[
    "window_start",
    "window_end",
    "orders",
    "prior_orders",
    "feedback",
    "report_date",
    "report_time",
    "store_name",
    "total_orders",
    "prior_order_count",
    "total_revenue",
    "avg_order_value",
    "orders_delta",
    "revenue_delta",
    "top_quantity_rows",
    "top_revenue_rows",
    "positive_pct",
    "neutral_pct",
    "negative_pct",
    "star_line",
    "feedback_total",
    "rated_total",
    "feedback_lines",
    "feedback_excerpts",
    "digest",
    "insights",
    "report_markdown",
    "report_title",
    "send_report_result",
];

pub fn daily_report_pipeline(
    store: Arc<dyn RecordStore>,
    model: Arc<dyn LanguageModel>,
    sink: Arc<WebhookSink>,
    config: &ReportConfig,
) -> Result<Pipeline> {
    let store_prefix = config.store_name_prefix.clone();

    let mut builder = Pipeline::builder(PIPELINE_NAME);
    for key in STATE_KEYS {
        builder = builder.merge(*key, MergeStrategy::Replace);
    }

    let load_store = Arc::clone(&store);
    let load_window = Stage::transform("load_window", move |_bag: StateBag| {
        let store = Arc::clone(&load_store);
        async move {
            let (start, end) = window::report_window(store.as_ref(), EntityKind::Orders).await?;
            let (prior_start, prior_end) = window::prior_window(start, end);

            let orders = retry_once(|| store.orders_in_window(start, end)).await?;
            let prior_orders = retry_once(|| store.orders_in_window(prior_start, prior_end)).await?;
            let feedback = retry_once(|| store.feedback_in_window(start, end)).await?;

            let mut u = StateUpdate::new();
            u.insert("window_start".into(), json!(start.to_rfc3339()));
            u.insert("window_end".into(), json!(end.to_rfc3339()));
            u.insert("orders".into(), serde_json::to_value(&orders)?);
            u.insert("prior_orders".into(), serde_json::to_value(&prior_orders)?);
            u.insert("feedback".into(), serde_json::to_value(&feedback)?);
            Ok(u)
        }
    });

    let aggregate = Stage::transform("aggregate", move |bag: StateBag| {
        let store_prefix = store_prefix.clone();
        async move { aggregate_update(&bag, &store_prefix) }
    });

    let compose_model = Arc::clone(&model);
    let compose_report = Stage::classify("compose_report", move |bag: StateBag| {
        let model = Arc::clone(&compose_model);
        async move {
            let digest = bag.str_or("digest", "");
            let feedback_lines = bag.str_or("feedback_lines", "(no feedback in window)");
            let user = format!("Metrics digest:\n{digest}\n\nVerbatim customer feedback:\n{feedback_lines}");
            let insights = model.complete(ANALYST_PROMPT, &user).await?;

            let mut preview = bag.clone();
            preview.insert("insights", Value::String(insights.clone()));
            let markdown = template::render(REPORT_TEMPLATE, &preview);

            let mut u = StateUpdate::new();
            u.insert("insights".into(), json!(insights));
            u.insert("report_markdown".into(), json!(markdown));
            u.insert("report_title".into(), json!(format!("{} Daily Report", bag.str_or("store_name", "Store"))));
            Ok(u)
        }
    });

    let send_sink = Arc::clone(&sink);
    let send_report = Stage::notify("send_report", move |bag: StateBag| {
        let sink = Arc::clone(&send_sink);
        async move {
            let title = bag.str_or("report_title", "Daily Report");
            let markdown = bag.str_or("report_markdown", "");
            let token = bag.str_or("access_token", "");
            let token = (!token.is_empty()).then_some(token);

            let outcome = match sink.send(&title, &markdown, token.as_deref()).await {
                Ok(body) => body,
                Err(e) => format!("send failed: {e}"),
            };
            let mut u = StateUpdate::new();
            u.insert("send_report_result".into(), json!(outcome));
            Ok(u)
        }
    });

    builder
        .stage(load_window)
        .stage(aggregate)
        .stage(compose_report)
        .stage(send_report)
        .build()
}

// Pure: loaded lists in, flat template fields out.
fn aggregate_update(bag: &StateBag, store_prefix: &str) -> Result<StateUpdate> {
    let orders: Vec<Order> = bag.get_as("orders")?.unwrap_or_default();
    let prior_orders: Vec<Order> = bag.get_as("prior_orders")?.unwrap_or_default();
    let feedback: Vec<Feedback> = bag.get_as("feedback")?.unwrap_or_default();

    let end: DateTime<Utc> = bag.str_or("window_end", "").parse().unwrap_or_else(|_| Utc::now());
    let start: DateTime<Utc> = bag.str_or("window_start", "").parse().unwrap_or(end);

    let (total_orders, revenue) = stats::order_totals(&orders);
    let (prior_count, prior_revenue) = stats::order_totals(&prior_orders);
    let avg = stats::average_order_value(revenue, total_orders);
    let orders_delta = stats::signed_percent(stats::delta_percent(total_orders as f64, prior_count as f64));
    let revenue_delta = stats::signed_percent(stats::delta_percent(revenue, prior_revenue));

    let by_quantity = stats::top_products(&orders, RankMetric::Quantity, 3);
    let by_revenue = stats::top_products(&orders, RankMetric::Revenue, 3);

    let split = stats::sentiment_split(&feedback);
    let (pos, neu, neg) = split.percents();
    let stars = stats::star_counts(&feedback);

    let shard = bag.u64_or("job_shard_index", 0);
    let store_name = format!("{} #{}", store_prefix, shard + 1);

    let feedback_lines: Vec<String> = feedback.iter().map(|f| f.formatted()).collect();
    let excerpts = if feedback_lines.is_empty() {
        "(no feedback in window)".to_string()
    } else {
        feedback_lines.iter().take(5).map(|l| format!("- {l}")).collect::<Vec<_>>().join("\n")
    };

    let digest = format!(
        "Store: {store_name}\n\
         Window: {} to {}\n\
         Orders: {total_orders} (prior period {prior_count}, change {orders_delta})\n\
         Revenue: {} (prior period {}, change {revenue_delta})\n\
         Average order value: {}\n\
         Sentiment of rated feedback: {:.1}% positive, {:.1}% neutral, {:.1}% negative ({} rated of {})\n\
         Top by quantity:\n{}\n\
         Top by revenue:\n{}",
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d"),
        stats::money(revenue),
        stats::money(prior_revenue),
        stats::money(avg),
        pos,
        neu,
        neg,
        split.rated(),
        feedback.len(),
        ranking_rows(&by_quantity, RankMetric::Quantity),
        ranking_rows(&by_revenue, RankMetric::Revenue),
    );

    let mut u = StateUpdate::new();
    u.insert("report_date".into(), json!(end.format("%Y-%m-%d").to_string()));
    u.insert("report_time".into(), json!(end.format("%Y-%m-%d %H:%M:%S UTC").to_string()));
    u.insert("store_name".into(), json!(store_name));
    u.insert("total_orders".into(), json!(total_orders));
    u.insert("prior_order_count".into(), json!(prior_count));
    u.insert("total_revenue".into(), json!(stats::money(revenue)));
    u.insert("avg_order_value".into(), json!(stats::money(avg)));
    u.insert("orders_delta".into(), json!(orders_delta));
    u.insert("revenue_delta".into(), json!(revenue_delta));
    u.insert("top_quantity_rows".into(), json!(ranking_rows(&by_quantity, RankMetric::Quantity)));
    u.insert("top_revenue_rows".into(), json!(ranking_rows(&by_revenue, RankMetric::Revenue)));
    u.insert("positive_pct".into(), json!(stats::percent_text(pos)));
    u.insert("neutral_pct".into(), json!(stats::percent_text(neu)));
    u.insert("negative_pct".into(), json!(stats::percent_text(neg)));
    u.insert("star_line".into(), json!(star_line(stars)));
    u.insert("feedback_total".into(), json!(feedback.len()));
    u.insert("rated_total".into(), json!(split.rated()));
    u.insert("feedback_lines".into(), json!(feedback_lines.join("\n")));
    u.insert("feedback_excerpts".into(), json!(excerpts));
    u.insert("digest".into(), json!(digest));
    Ok(u)
}

/// Exactly three rows; missing ranks render as N/A.
fn ranking_rows(shares: &[stats::ProductShare], metric: RankMetric) -> String {
    (0..3)
        .map(|i| match shares.get(i) {
            Some(s) => match metric {
                RankMetric::Quantity => {
                    format!("{}. {}: {} sold ({} of quantity)", i + 1, s.name, s.quantity, stats::percent_text(s.percent))
                }
                RankMetric::Revenue => {
                    format!("{}. {}: {} ({} of revenue)", i + 1, s.name, stats::money(s.revenue), stats::percent_text(s.percent))
                }
            },
            None => format!("{}. N/A", i + 1),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn star_line(counts: [usize; 5]) -> String {
    let total: usize = counts.iter().sum();
    (1..=5)
        .rev()
        .map(|star| {
            let pct = if total == 0 { 0.0 } else { counts[star - 1] as f64 * 100.0 / total as f64 };
            format!("{star}★ {}", stats::percent_text(pct))
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CannedModel;
    use chrono::TimeZone;
    use opsflow_core::config::WebhookConfig;
    use opsflow_core::{JobContext, OpsflowError};
    use opsflow_pipeline::PipelineRunner;
    use opsflow_store::MemoryStore;

    fn order(id: i64, product_id: i64, name: &str, quantity: u32, unit_price: f64, y: i32, m: u32, d: u32) -> Order {
        Order {
            id,
            product_id,
            product_name: name.into(),
            quantity,
            unit_price,
            total_price: unit_price * quantity as f64,
            created_at: Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap(),
        }
    }

    fn feedback(id: i64, rating: Option<u8>, content: &str) -> Feedback {
        Feedback {
            id,
            user_id: 1000 + id,
            rating,
            content: content.into(),
            created_at: Utc.with_ymd_and_hms(2025, 8, 12, 9, 30, 0).unwrap(),
        }
    }

    fn quiet_sink() -> Arc<WebhookSink> {
        // No token configured: send resolves to a config error, which the
        // notify stage captures as the result string.
        Arc::new(WebhookSink::from_config(&WebhookConfig::default()))
    }

    fn seeded_store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::with_records(
            vec![
                // window (latest month 2025-08): revenue 500 over 2 orders
                order(1, 1, "Espresso", 10, 30.0, 2025, 8, 5),
                order(2, 2, "Cold Brew", 10, 20.0, 2025, 8, 9),
                // prior period: revenue 400 over 1 order
                order(3, 1, "Espresso", 10, 40.0, 2025, 7, 20),
            ],
            vec![feedback(1, Some(5), "Great"), feedback(2, Some(2), "Slow service")],
            vec![],
        ))
    }

    async fn run_with(store: Arc<MemoryStore>, model: Arc<CannedModel>) -> StateBag {
        let pipeline = daily_report_pipeline(store, model, quiet_sink(), &ReportConfig::default()).unwrap();
        let mut seed = pipeline.seed_bag();
        for (k, v) in JobContext::new("daily_report").seed_entries() {
            seed.insert(k, v);
        }
        PipelineRunner::execute(&pipeline, seed).await.unwrap()
    }

    #[tokio::test]
    async fn report_carries_mechanical_numbers_and_model_prose() {
        let model = CannedModel::routed(vec![("Metrics digest", "### Key takeaways\nCold brew is carrying the month.")]);
        let bag = run_with(seeded_store(), Arc::clone(&model)).await;

        let markdown = bag.str_or("report_markdown", "");
        assert!(markdown.contains("Store #1 Daily Report"), "got:\n{markdown}");
        assert!(markdown.contains("Revenue: 500.00 (+25.0% vs prior period)"), "got:\n{markdown}");
        assert!(markdown.contains("Orders: 2 (+100.0% vs prior period)"), "got:\n{markdown}");
        assert!(markdown.contains("Average order value: 250.00"));
        assert!(markdown.contains("Cold brew is carrying the month."));
        assert!(markdown.contains("3. N/A"));
        assert!(markdown.contains("- user 1001"));

        // the model saw the digest but its reply fills only the notes slot
        let seen = model.seen();
        assert!(seen[0].contains("change +25.0%"));
        assert!(seen[0].contains("user 1001"));
    }

    #[tokio::test]
    async fn empty_window_still_reaches_notify_with_zero_aggregates() {
        let model = CannedModel::routed(vec![("Metrics digest", "Nothing to note.")]);
        let bag = run_with(Arc::new(MemoryStore::new()), model).await;

        let markdown = bag.str_or("report_markdown", "");
        assert!(markdown.contains("Orders: 0 (+0.0% vs prior period)"));
        assert!(markdown.contains("Revenue: 0.00 (+0.0% vs prior period)"));
        assert!(markdown.contains("Average order value: 0.00"));
        assert!(markdown.contains("1. N/A"));
        assert!(markdown.contains("(no feedback in window)"));
        // notify ran and captured the unconfigured-webhook outcome
        assert!(bag.str_or("send_report_result", "").starts_with("send failed:"));
    }

    #[tokio::test]
    async fn model_failure_fails_the_run_at_compose() {
        let model = CannedModel::routed(vec![]);
        let pipeline = daily_report_pipeline(seeded_store(), model, quiet_sink(), &ReportConfig::default()).unwrap();
        let err = PipelineRunner::execute(&pipeline, pipeline.seed_bag()).await.unwrap_err();
        match err {
            OpsflowError::Stage { stage, .. } => assert_eq!(stage, "compose_report"),
            other => panic!("expected stage error, got {other}"),
        }
    }

    #[tokio::test]
    async fn shard_index_names_the_store() {
        let model = CannedModel::routed(vec![("Metrics digest", "ok")]);
        let pipeline = daily_report_pipeline(seeded_store(), model, quiet_sink(), &ReportConfig::default()).unwrap();
        let mut seed = pipeline.seed_bag();
        for (k, v) in JobContext::new("daily_report").with_shard(2, 4).seed_entries() {
            seed.insert(k, v);
        }
        let bag = PipelineRunner::execute(&pipeline, seed).await.unwrap();
        assert_eq!(bag.str_or("store_name", ""), "Store #3");
    }
}
