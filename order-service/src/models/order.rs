//! Service order model for order-service.

use super::line_item::{LineItem, LineItemInput};
use crate::ledger::{Totals, ValidatedLineItem};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Service order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Awaiting,
    InProgress,
    Completed,
    Delivered,
}

impl OrderStatus {
    /// Every status in lifecycle order.
    pub const ALL: [OrderStatus; 4] = [
        OrderStatus::Awaiting,
        OrderStatus::InProgress,
        OrderStatus::Completed,
        OrderStatus::Delivered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Awaiting => "awaiting",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::Completed => "completed",
            OrderStatus::Delivered => "delivered",
        }
    }

    /// The only status this one may move to.
    pub fn next(&self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Awaiting => Some(OrderStatus::InProgress),
            OrderStatus::InProgress => Some(OrderStatus::Completed),
            OrderStatus::Completed => Some(OrderStatus::Delivered),
            OrderStatus::Delivered => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "awaiting" => Ok(OrderStatus::Awaiting),
            "in_progress" => Ok(OrderStatus::InProgress),
            "completed" => Ok(OrderStatus::Completed),
            "delivered" => Ok(OrderStatus::Delivered),
            _ => Err(format!("Invalid order status: {}", s)),
        }
    }
}

/// A vehicle's repair or service engagement with its billable items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceOrder {
    pub order_id: Uuid,
    pub tenant_id: Uuid,
    pub customer_id: Uuid,
    pub vehicle_id: Uuid,
    pub status: OrderStatus,
    pub line_items: Vec<LineItem>,
    pub discount: Decimal,
    pub gross_total: Decimal,
    pub net_total: Decimal,
    pub notes: Option<String>,
    pub revision: i64,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl ServiceOrder {
    pub fn find_line_item(&self, line_item_id: Uuid) -> Option<&LineItem> {
        self.line_items
            .iter()
            .find(|item| item.line_item_id == line_item_id)
    }

    /// Next free sort position for an appended item.
    pub fn next_sort_order(&self) -> i32 {
        self.line_items
            .iter()
            .map(|item| item.sort_order + 1)
            .max()
            .unwrap_or(0)
    }
}

/// Input for creating a service order.
#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub customer_id: Uuid,
    pub vehicle_id: Uuid,
    #[serde(default)]
    pub items: Vec<LineItemInput>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Validated order header handed to the store on creation.
#[derive(Debug, Clone)]
pub struct NewOrderRecord {
    pub customer_id: Uuid,
    pub vehicle_id: Uuid,
    pub notes: Option<String>,
    pub totals: Totals,
}

/// Changes applied to an order in a single revision-guarded write.
///
/// Unset fields are left as stored. `totals` must be the result of
/// recomputing over the stored items plus `new_items`.
#[derive(Debug, Clone, Default)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub totals: Option<Totals>,
    pub new_items: Vec<ValidatedLineItem>,
}

/// Filter parameters for listing orders.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListOrdersFilter {
    pub status: Option<OrderStatus>,
    pub customer_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    #[serde(default)]
    pub page_size: Option<i32>,
    pub page_token: Option<Uuid>,
}

impl ListOrdersFilter {
    pub const DEFAULT_PAGE_SIZE: i32 = 50;

    /// Requested page size clamped to 1..=100.
    pub fn limit(&self) -> i64 {
        self.page_size
            .unwrap_or(Self::DEFAULT_PAGE_SIZE)
            .clamp(1, 100) as i64
    }
}
