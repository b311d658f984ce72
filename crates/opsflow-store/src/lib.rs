//! # OpsFlow Store
//!
//! In-memory `RecordStore` used by demos and tests. Rows live in plain
//! vectors fixed at construction; the trait is read-only so no locking is
//! needed. A real deployment would put a database behind the same trait.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, TimeZone, Utc};

use opsflow_core::error::Result;
use opsflow_core::traits::{EntityKind, RecordStore};
use opsflow_core::types::{Feedback, Order, Product};

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    orders: Vec<Order>,
    feedback: Vec<Feedback>,
    products: Vec<Product>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(orders: Vec<Order>, feedback: Vec<Feedback>, products: Vec<Product>) -> Self {
        Self { orders, feedback, products }
    }

    /// Coffee-shop seed placed relative to the current month, so the
    /// month-window rule always finds a populated window and a populated
    /// prior window no matter when the demo runs.
    pub fn demo() -> Self {
        let now = Utc::now();
        let month_start = Utc
            .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
            .single()
            .unwrap_or(now);
        let window = now - month_start;
        let in_window = |num: i32| month_start + window * num / 4;
        let in_prior = |num: i32| month_start - window * num / 4;

        let products = vec![
            product(1, "Espresso", "Double shot, house blend", 3.5),
            product(2, "Cold Brew", "Slow-steeped 16h", 4.5),
            product(3, "Oat Latte", "Oat milk flat pour", 5.0),
            product(4, "Matcha Latte", "Ceremonial grade", 5.5),
        ];

        let orders = vec![
            order(101, 1, "Espresso", 2, 3.5, in_window(1)),
            order(102, 2, "Cold Brew", 1, 4.5, in_window(1)),
            order(103, 3, "Oat Latte", 3, 5.0, in_window(2)),
            order(104, 1, "Espresso", 1, 3.5, in_window(2)),
            order(105, 4, "Matcha Latte", 2, 5.5, in_window(3)),
            order(106, 2, "Cold Brew", 4, 4.5, in_window(3)),
            order(107, 3, "Oat Latte", 1, 5.0, in_window(3)),
            // prior window rows feed the delta computation
            order(91, 1, "Espresso", 2, 3.5, in_prior(2)),
            order(92, 2, "Cold Brew", 1, 4.5, in_prior(2)),
            order(93, 3, "Oat Latte", 1, 5.0, in_prior(3)),
        ];

        let feedback = vec![
            fb(201, 1001, Some(5), "Best cold brew in the district", in_window(1)),
            fb(202, 1002, Some(4), "Solid espresso, quick line", in_window(2)),
            fb(203, 1003, Some(1), "Waited 25 minutes and the latte arrived cold", in_window(2)),
            fb(204, 1004, Some(3), "Fine, nothing special", in_window(3)),
            fb(205, 1005, None, "Do you have decaf options?", in_window(3)),
        ];

        Self { orders, feedback, products }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn orders_in_window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Order>> {
        Ok(self
            .orders
            .iter()
            .filter(|o| o.created_at >= start && o.created_at < end)
            .cloned()
            .collect())
    }

    async fn feedback_in_window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Feedback>> {
        Ok(self
            .feedback
            .iter()
            .filter(|f| f.created_at >= start && f.created_at < end)
            .cloned()
            .collect())
    }

    async fn product(&self, id: i64) -> Result<Option<Product>> {
        Ok(self.products.iter().find(|p| p.id == id).cloned())
    }

    async fn max_observed_month(&self, entity: EntityKind) -> Result<Option<String>> {
        let latest = match entity {
            EntityKind::Orders => self.orders.iter().map(|o| o.created_at).max(),
            EntityKind::Feedback => self.feedback.iter().map(|f| f.created_at).max(),
        };
        Ok(latest.map(|at| at.format("%Y-%m").to_string()))
    }
}

fn product(id: i64, name: &str, description: &str, price: f64) -> Product {
    Product { id, name: name.to_string(), description: description.to_string(), price }
}

fn order(id: i64, product_id: i64, name: &str, quantity: u32, unit_price: f64, at: DateTime<Utc>) -> Order {
    Order {
        id,
        product_id,
        product_name: name.to_string(),
        quantity,
        unit_price,
        total_price: unit_price * quantity as f64,
        created_at: at,
    }
}

fn fb(id: i64, user_id: i64, rating: Option<u8>, content: &str, at: DateTime<Utc>) -> Feedback {
    Feedback { id, user_id, rating, content: content.to_string(), created_at: at }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn store() -> MemoryStore {
        MemoryStore::with_records(
            vec![
                order(1, 1, "Espresso", 1, 3.5, at(2025, 7, 31, 23)),
                order(2, 1, "Espresso", 1, 3.5, at(2025, 8, 1, 0)),
                order(3, 2, "Cold Brew", 2, 4.5, at(2025, 8, 15, 12)),
            ],
            vec![fb(1, 1001, Some(5), "great", at(2025, 8, 2, 9))],
            vec![product(1, "Espresso", "double shot", 3.5)],
        )
    }

    #[tokio::test]
    async fn window_is_half_open() {
        let s = store();
        let start = at(2025, 8, 1, 0);
        let end = at(2025, 8, 15, 12);
        let orders = s.orders_in_window(start, end).await.unwrap();
        // start boundary included, end boundary excluded
        assert_eq!(orders.iter().map(|o| o.id).collect::<Vec<_>>(), vec![2]);
    }

    #[tokio::test]
    async fn max_observed_month_picks_latest() {
        let s = store();
        assert_eq!(s.max_observed_month(EntityKind::Orders).await.unwrap(), Some("2025-08".into()));
        assert_eq!(s.max_observed_month(EntityKind::Feedback).await.unwrap(), Some("2025-08".into()));
    }

    #[tokio::test]
    async fn empty_store_has_no_observed_month() {
        let s = MemoryStore::new();
        assert_eq!(s.max_observed_month(EntityKind::Orders).await.unwrap(), None);
    }

    #[tokio::test]
    async fn product_lookup_by_id() {
        let s = store();
        assert_eq!(s.product(1).await.unwrap().unwrap().name, "Espresso");
        assert!(s.product(99).await.unwrap().is_none());
    }
}
