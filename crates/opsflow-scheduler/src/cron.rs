//! Lightweight cron expression parser.
//!
//! Accepts the 5-field form "MIN HOUR DOM MON DOW" and, for compatibility
//! with schedules pasted from Quartz-based systems, the 6/7-field form
//! "SEC MIN HOUR DOM MON DOW [YEAR]" whose seconds (and year) are dropped.
//! Field syntax: *, ?, */N, N, and comma lists. Day-of-month, month, and
//! day-of-week are parsed but not constrained; minute and hour drive the
//! schedule. No cron crate dependency.

use chrono::{DateTime, Duration, Timelike, Utc};

/// Compute the next fire time strictly after `after`, or `None` for an
/// expression this dialect cannot parse.
pub fn next_run_from_cron(expression: &str, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let (minute_spec, hour_spec) = normalize(expression)?;

    let minutes = field_values(minute_spec, 0, 59)?;
    let hours = field_values(hour_spec, 0, 23)?;

    let mut candidate = after + Duration::minutes(1);
    candidate = candidate.with_second(0).unwrap_or(candidate);

    // Minute and hour always recur within a day; 48h covers any match.
    for _ in 0..(48 * 60) {
        if minutes.contains(&candidate.minute()) && hours.contains(&candidate.hour()) {
            return Some(candidate);
        }
        candidate += Duration::minutes(1);
    }

    None
}

/// Whether this dialect can schedule the expression.
pub fn validate(expression: &str) -> bool {
    next_run_from_cron(expression, Utc::now()).is_some()
}

// Reduce any accepted form to its (minute, hour) specs.
fn normalize(expression: &str) -> Option<(&str, &str)> {
    let parts: Vec<&str> = expression.split_whitespace().collect();
    match parts.len() {
        5 => Some((parts[0], parts[1])),
        6 | 7 => Some((parts[1], parts[2])),
        _ => {
            tracing::warn!(
                "invalid cron expression '{expression}' (need 5 fields MIN HOUR DOM MON DOW, or 6/7 with seconds)"
            );
            None
        }
    }
}

/// Expand one cron field into its matching values.
fn field_values(field: &str, min: u32, max: u32) -> Option<Vec<u32>> {
    if field == "*" || field == "?" {
        return Some((min..=max).collect());
    }

    if let Some(step) = field.strip_prefix("*/") {
        let n: u32 = step.parse().ok()?;
        if n == 0 {
            return None;
        }
        return Some((min..=max).step_by(n as usize).collect());
    }

    if field.contains(',') {
        let vals: Result<Vec<u32>, _> = field.split(',').map(|s| s.trim().parse()).collect();
        return vals
            .ok()
            .map(|v| v.into_iter().filter(|x| *x >= min && *x <= max).collect());
    }

    let n: u32 = field.parse().ok()?;
    if n >= min && n <= max { Some(vec![n]) } else { None }
}
