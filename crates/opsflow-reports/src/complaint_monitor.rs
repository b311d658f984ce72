//! Complaint monitor pipeline.
//!
//! Every feedback line in the window is classified independently through
//! a fan-out sub-pipeline; the fan-in summary counts complaints and
//! averages satisfaction; the alert card substitutes those numbers
//! mechanically and asks the model only for suggested actions. A line the
//! classifier fails on (or answers with something unparseable) counts as
//! a non-complaint with no satisfaction score.

use std::sync::Arc;

use serde_json::{Value, json};

use opsflow_core::config::ReportConfig;
use opsflow_core::traits::{EntityKind, LanguageModel, RecordStore};
use opsflow_core::Result;
use opsflow_notify::WebhookSink;
use opsflow_pipeline::{
    IterateStage, ItemErrorPolicy, MergeStrategy, Pipeline, Stage, StateBag, StateUpdate, template,
};

use crate::stats;
use crate::window::{self, retry_once};

pub const PIPELINE_NAME: &str = "complaint_monitor";

const ALERT_TEMPLATE: &str = "\
## Customer Complaint Alert ({report_date})

- Sessions analyzed: {total_sessions}
- Complaints: {complaint_count}
- Mean satisfaction: {mean_satisfaction}/5

### Complaint digests
{complaint_summaries}

### Suggested actions
{recommendations}
";

const CLASSIFIER_PROMPT: &str = "\
You are a customer feedback classifier. You receive one feedback line \
(user, time, rating, text). Reply with ONLY a JSON object, no prose and \
no code fences: {\"complaint\": \"yes\" or \"no\", \"satisfaction\": an \
integer 0 to 5, \"summary\": one sentence describing the feedback}.";

const ADVISOR_PROMPT: &str = "\
You are a customer experience lead. You receive a complaint digest for \
one store. Reply with at most 3 short bullet recommendations, each line \
starting with '- ', most urgent first. No headings, no extra prose.";

const MAX_SUMMARY_LINES: usize = 5;
const MAX_RECOMMENDATIONS: usize = 3;

/// Keys the outer pipeline writes, all replace-on-write.
const STATE_KEYS: &[&str] = &[
    "window_start",
    "window_end",
    "report_date",
    "sessions",
    "analysis_results",
    "total_sessions",
    "complaint_count",
    "mean_satisfaction",
    "complaint_summaries",
    "recommendations",
    "alert_markdown",
    "alert_title",
    "send_alert_result",
];

pub fn complaint_monitor_pipeline(
    store: Arc<dyn RecordStore>,
    model: Arc<dyn LanguageModel>,
    sink: Arc<WebhookSink>,
    config: &ReportConfig,
) -> Result<Pipeline> {
    let mut builder = Pipeline::builder(PIPELINE_NAME);
    for key in STATE_KEYS {
        builder = builder.merge(*key, MergeStrategy::Replace);
    }

    let load_store = Arc::clone(&store);
    let load_feedback = Stage::transform("load_feedback", move |_bag: StateBag| {
        let store = Arc::clone(&load_store);
        async move {
            let (start, end) = window::report_window(store.as_ref(), EntityKind::Feedback).await?;
            let feedback = retry_once(|| store.feedback_in_window(start, end)).await?;
            let sessions: Vec<String> = feedback.iter().map(|f| f.formatted()).collect();

            let mut u = StateUpdate::new();
            u.insert("window_start".into(), json!(start.to_rfc3339()));
            u.insert("window_end".into(), json!(end.to_rfc3339()));
            u.insert("report_date".into(), json!(end.format("%Y-%m-%d").to_string()));
            u.insert("sessions".into(), json!(sessions));
            Ok(u)
        }
    });

    let classify_model = Arc::clone(&model);
    let classify_session = Arc::new(
        Pipeline::builder("classify_session")
            .merge("session", MergeStrategy::Replace)
            .merge("session_analysis", MergeStrategy::Replace)
            .stage(Stage::classify("classify_session", move |bag: StateBag| {
                let model = Arc::clone(&classify_model);
                async move {
                    let line = bag.str_or("session", "");
                    let reply = model.complete(CLASSIFIER_PROMPT, &line).await?;
                    let mut u = StateUpdate::new();
                    u.insert("session_analysis".into(), json!(reply));
                    Ok(u)
                }
            }))
            .build()?,
    );

    let classify_each = Stage::iterate(
        "classify_each",
        IterateStage::new("sessions", "session", "session_analysis", "analysis_results", classify_session)
            .with_workers(config.classify_workers)
            .on_error(ItemErrorPolicy::SkipElement),
    );

    let summarize = Stage::transform("summarize", |bag: StateBag| async move { Ok(summarize_update(&bag)) });

    let compose_model = Arc::clone(&model);
    let compose_alert = Stage::classify("compose_alert", move |bag: StateBag| {
        let model = Arc::clone(&compose_model);
        async move {
            let digest = format!(
                "Sessions analyzed: {}\nComplaints: {}\nMean satisfaction: {}/5\nComplaint digests:\n{}",
                bag.u64_or("total_sessions", 0),
                bag.u64_or("complaint_count", 0),
                bag.u64_or("mean_satisfaction", 0),
                bag.str_or("complaint_summaries", "None"),
            );
            let reply = model.complete(ADVISOR_PROMPT, &digest).await?;
            let recommendations = cap_bullets(&reply, MAX_RECOMMENDATIONS);

            let mut preview = bag.clone();
            preview.insert("recommendations", Value::String(recommendations.clone()));
            let markdown = template::render(ALERT_TEMPLATE, &preview);

            let mut u = StateUpdate::new();
            u.insert("recommendations".into(), json!(recommendations));
            u.insert("alert_markdown".into(), json!(markdown));
            u.insert("alert_title".into(), json!("Customer Complaint Alert"));
            Ok(u)
        }
    });

    let send_sink = Arc::clone(&sink);
    let send_alert = Stage::notify("send_alert", move |bag: StateBag| {
        let sink = Arc::clone(&send_sink);
        async move {
            let title = bag.str_or("alert_title", "Customer Complaint Alert");
            let markdown = bag.str_or("alert_markdown", "");
            let token = bag.str_or("access_token", "");
            let token = (!token.is_empty()).then_some(token);

            let outcome = match sink.send(&title, &markdown, token.as_deref()).await {
                Ok(body) => body,
                Err(e) => format!("send failed: {e}"),
            };
            let mut u = StateUpdate::new();
            u.insert("send_alert_result".into(), json!(outcome));
            Ok(u)
        }
    });

    builder
        .stage(load_feedback)
        .stage(classify_each)
        .stage(summarize)
        .stage(compose_alert)
        .stage(send_alert)
        .build()
}

// Fan-in: parse each classifier slot, count complaints, average scores.
fn summarize_update(bag: &StateBag) -> StateUpdate {
    let slots = bag.array_or("analysis_results");
    let total = slots.len();

    let mut complaint_count = 0u64;
    let mut satisfactions: Vec<u64> = Vec::new();
    let mut summaries: Vec<String> = Vec::new();

    for slot in &slots {
        let Some(parsed) = classification_of(slot) else { continue };
        if let Some(score) = parsed.satisfaction {
            satisfactions.push(score);
        }
        if parsed.complaint {
            complaint_count += 1;
            if summaries.len() < MAX_SUMMARY_LINES {
                summaries.push(format!("- {}", parsed.summary));
            }
        }
    }

    let summaries = if summaries.is_empty() { "None".to_string() } else { summaries.join("\n") };

    let mut u = StateUpdate::new();
    u.insert("total_sessions".into(), json!(total));
    u.insert("complaint_count".into(), json!(complaint_count));
    u.insert("mean_satisfaction".into(), json!(stats::mean_rounded(&satisfactions)));
    u.insert("complaint_summaries".into(), json!(summaries));
    u
}

struct Classification {
    complaint: bool,
    satisfaction: Option<u64>,
    summary: String,
}

// A slot is a raw model reply (string), null for a skipped element, or
// already-structured JSON. Anything unparseable is dropped here.
fn classification_of(slot: &Value) -> Option<Classification> {
    let object = match slot {
        Value::String(raw) => json_payload(raw)?,
        Value::Object(_) => slot.clone(),
        _ => return None,
    };
    let complaint = match &object["complaint"] {
        Value::String(s) => s.eq_ignore_ascii_case("yes"),
        Value::Bool(b) => *b,
        _ => false,
    };
    let satisfaction = object["satisfaction"].as_u64().filter(|s| *s <= 5);
    let summary = object["summary"].as_str().unwrap_or("(no summary)").to_string();
    Some(Classification { complaint, satisfaction, summary })
}

// Models fence JSON despite instructions often enough to strip it here.
fn json_payload(raw: &str) -> Option<Value> {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    serde_json::from_str(text.trim()).ok().filter(Value::is_object)
}

/// Keep at most `max` non-empty lines.
fn cap_bullets(reply: &str, max: usize) -> String {
    reply
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(max)
        .collect::<Vec<_>>()
        .join("\n")
}
