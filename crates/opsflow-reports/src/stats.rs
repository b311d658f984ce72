//! Pure aggregation over order and feedback lists.
//!
//! Everything here is deterministic arithmetic; the pipelines substitute
//! these numbers into report templates mechanically so no model call can
//! alter them.

use opsflow_core::types::{Feedback, Order};

/// One row of a product ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductShare {
    pub name: String,
    pub quantity: u32,
    pub revenue: f64,
    /// Share of the window total for the ranking metric.
    pub percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankMetric {
    Quantity,
    Revenue,
}

/// Order row count and revenue sum for a window.
pub fn order_totals(orders: &[Order]) -> (usize, f64) {
    (orders.len(), orders.iter().map(|o| o.total_price).sum())
}

/// 0 when the window had no orders.
pub fn average_order_value(revenue: f64, orders: usize) -> f64 {
    if orders == 0 { 0.0 } else { revenue / orders as f64 }
}

/// Signed percentage change vs the prior value; 0 when the prior is 0.
pub fn delta_percent(current: f64, prior: f64) -> f64 {
    if prior == 0.0 { 0.0 } else { (current - prior) / prior * 100.0 }
}

/// "+25.0%" style rendering.
pub fn signed_percent(pct: f64) -> String {
    format!("{pct:+.1}%")
}

pub fn percent_text(pct: f64) -> String {
    format!("{pct:.1}%")
}

pub fn money(v: f64) -> String {
    format!("{v:.2}")
}

/// Top `n` products by the metric. Grouping preserves first-seen order
/// and the sort is stable, so ties rank in order of first appearance.
/// Shares are of the window total; zero totals give 0 percent.
pub fn top_products(orders: &[Order], metric: RankMetric, n: usize) -> Vec<ProductShare> {
    let mut grouped: Vec<(i64, ProductShare)> = Vec::new();
    for order in orders {
        match grouped.iter_mut().find(|(id, _)| *id == order.product_id) {
            Some((_, share)) => {
                share.quantity += order.quantity;
                share.revenue += order.total_price;
            }
            None => grouped.push((
                order.product_id,
                ProductShare {
                    name: order.product_name.clone(),
                    quantity: order.quantity,
                    revenue: order.total_price,
                    percent: 0.0,
                },
            )),
        }
    }

    let total_quantity: u32 = grouped.iter().map(|(_, s)| s.quantity).sum();
    let total_revenue: f64 = grouped.iter().map(|(_, s)| s.revenue).sum();

    let mut shares: Vec<ProductShare> = grouped.into_iter().map(|(_, s)| s).collect();
    match metric {
        RankMetric::Quantity => shares.sort_by(|a, b| b.quantity.cmp(&a.quantity)),
        RankMetric::Revenue => {
            shares.sort_by(|a, b| b.revenue.partial_cmp(&a.revenue).unwrap_or(std::cmp::Ordering::Equal))
        }
    }
    shares.truncate(n);

    for share in &mut shares {
        share.percent = match metric {
            RankMetric::Quantity if total_quantity > 0 => share.quantity as f64 * 100.0 / total_quantity as f64,
            RankMetric::Revenue if total_revenue > 0.0 => share.revenue * 100.0 / total_revenue,
            _ => 0.0,
        };
    }
    shares
}

/// Rating 5 is positive, 3 and 4 neutral, below 3 negative. Unrated
/// feedback is excluded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SentimentSplit {
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
}

impl SentimentSplit {
    pub fn rated(&self) -> usize {
        self.positive + self.neutral + self.negative
    }

    /// (positive, neutral, negative) percentages of rated feedback.
    pub fn percents(&self) -> (f64, f64, f64) {
        let rated = self.rated();
        if rated == 0 {
            return (0.0, 0.0, 0.0);
        }
        let pct = |n: usize| n as f64 * 100.0 / rated as f64;
        (pct(self.positive), pct(self.neutral), pct(self.negative))
    }
}

pub fn sentiment_split(feedback: &[Feedback]) -> SentimentSplit {
    let mut split = SentimentSplit::default();
    for fb in feedback {
        match fb.rating {
            Some(5) => split.positive += 1,
            Some(3) | Some(4) => split.neutral += 1,
            Some(_) => split.negative += 1,
            None => {}
        }
    }
    split
}

/// Counts per star 1..=5. A 0 rating carries no star.
pub fn star_counts(feedback: &[Feedback]) -> [usize; 5] {
    let mut counts = [0usize; 5];
    for fb in feedback {
        if let Some(r @ 1..=5) = fb.rating {
            counts[(r - 1) as usize] += 1;
        }
    }
    counts
}

/// Mean rounded half-up to an integer; 0 for an empty slice.
pub fn mean_rounded(values: &[u64]) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mean = values.iter().sum::<u64>() as f64 / values.len() as f64;
    (mean + 0.5).floor() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn order(id: i64, product_id: i64, name: &str, quantity: u32, unit_price: f64) -> Order {
        Order {
            id,
            product_id,
            product_name: name.into(),
            quantity,
            unit_price,
            total_price: unit_price * quantity as f64,
            created_at: Utc.with_ymd_and_hms(2025, 8, 10, 12, 0, 0).unwrap(),
        }
    }

    fn rated(id: i64, rating: Option<u8>) -> Feedback {
        Feedback {
            id,
            user_id: 1000 + id,
            rating,
            content: "text".into(),
            created_at: Utc.with_ymd_and_hms(2025, 8, 10, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn totals_and_average() {
        let orders = vec![order(1, 1, "A", 2, 10.0), order(2, 2, "B", 1, 5.0)];
        let (count, revenue) = order_totals(&orders);
        assert_eq!(count, 2);
        assert_eq!(revenue, 25.0);
        assert_eq!(average_order_value(revenue, count), 12.5);
        assert_eq!(average_order_value(0.0, 0), 0.0);
    }

    #[test]
    fn delta_renders_signed_one_decimal() {
        assert_eq!(signed_percent(delta_percent(500.0, 400.0)), "+25.0%");
        assert_eq!(signed_percent(delta_percent(300.0, 400.0)), "-25.0%");
        assert_eq!(signed_percent(delta_percent(500.0, 0.0)), "+0.0%");
    }

    #[test]
    fn top_three_keeps_first_seen_order_on_ties() {
        // quantities 10, 7, 7, 3: the two 7s keep their input order
        let orders = vec![
            order(1, 1, "Espresso", 10, 1.0),
            order(2, 2, "Cold Brew", 7, 1.0),
            order(3, 3, "Oat Latte", 7, 1.0),
            order(4, 4, "Matcha", 3, 1.0),
        ];
        let top = top_products(&orders, RankMetric::Quantity, 3);
        let names: Vec<&str> = top.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Espresso", "Cold Brew", "Oat Latte"]);
        // percent of the window total quantity (27), not of the top-3 sum
        assert!((top[0].percent - 10.0 * 100.0 / 27.0).abs() < 1e-9);
    }

    #[test]
    fn grouping_merges_repeat_products() {
        let orders = vec![
            order(1, 1, "Espresso", 2, 3.0),
            order(2, 1, "Espresso", 3, 3.0),
            order(3, 2, "Cold Brew", 4, 5.0),
        ];
        let top = top_products(&orders, RankMetric::Revenue, 3);
        assert_eq!(top[0].name, "Cold Brew");
        assert_eq!(top[0].revenue, 20.0);
        assert_eq!(top[1].quantity, 5);
    }

    #[test]
    fn fewer_products_than_requested() {
        let orders = vec![order(1, 1, "Espresso", 1, 3.0)];
        assert_eq!(top_products(&orders, RankMetric::Quantity, 3).len(), 1);
        assert!(top_products(&[], RankMetric::Quantity, 3).is_empty());
    }

    #[test]
    fn sentiment_buckets_and_percents() {
        let feedback = vec![
            rated(1, Some(5)),
            rated(2, Some(4)),
            rated(3, Some(3)),
            rated(4, Some(2)),
            rated(5, Some(0)),
            rated(6, None),
        ];
        let split = sentiment_split(&feedback);
        assert_eq!((split.positive, split.neutral, split.negative), (1, 2, 2));
        let (p, n, neg) = split.percents();
        assert_eq!(p, 20.0);
        assert_eq!(n, 40.0);
        assert_eq!(neg, 40.0);
        assert_eq!(SentimentSplit::default().percents(), (0.0, 0.0, 0.0));
    }

    #[test]
    fn star_counts_skip_zero_and_unrated() {
        let feedback = vec![rated(1, Some(5)), rated(2, Some(5)), rated(3, Some(1)), rated(4, Some(0)), rated(5, None)];
        assert_eq!(star_counts(&feedback), [1, 0, 0, 0, 2]);
    }

    #[test]
    fn mean_rounds_half_up() {
        assert_eq!(mean_rounded(&[1, 2, 5]), 3);
        assert_eq!(mean_rounded(&[3, 4]), 4);
        assert_eq!(mean_rounded(&[]), 0);
    }
}
