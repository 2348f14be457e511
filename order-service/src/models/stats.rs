//! Dashboard aggregates.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub awaiting: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub delivered: i64,
}

impl StatusCounts {
    pub fn total(&self) -> i64 {
        self.awaiting + self.in_progress + self.completed + self.delivered
    }
}

/// Figures shown on the workshop dashboard.
///
/// Counts cover all orders; revenue is the sum of `net_total` over orders
/// delivered between `revenue_from` and `revenue_to`, both inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub orders_by_status: StatusCounts,
    pub total_orders: i64,
    pub delivered_revenue: Decimal,
    pub revenue_from: NaiveDate,
    pub revenue_to: NaiveDate,
}
