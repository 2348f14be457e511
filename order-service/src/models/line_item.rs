//! Line item model for order-service.

use crate::ledger::{line_subtotal, ValidatedLineItem, ValidationError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn default_quantity() -> i32 {
    1
}

/// Billable service or part entry on an order.
///
/// `subtotal` is derived from `quantity` and `unit_price` whenever the item
/// is loaded; it is never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub line_item_id: Uuid,
    pub service_type_id: Option<Uuid>,
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub sort_order: i32,
    pub created_utc: DateTime<Utc>,
}

impl LineItem {
    /// Build a freshly stored item from its validated input.
    pub fn from_validated(
        line_item_id: Uuid,
        item: ValidatedLineItem,
        sort_order: i32,
        created_utc: DateTime<Utc>,
    ) -> Self {
        Self {
            line_item_id,
            service_type_id: item.service_type_id,
            description: item.description,
            quantity: item.quantity,
            unit_price: item.unit_price,
            subtotal: item.subtotal,
            sort_order,
            created_utc,
        }
    }

    /// Build an item from its stored fields, deriving the subtotal.
    pub fn from_stored(
        line_item_id: Uuid,
        service_type_id: Option<Uuid>,
        description: String,
        quantity: i32,
        unit_price: Decimal,
        sort_order: i32,
        created_utc: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            line_item_id,
            service_type_id,
            description,
            quantity,
            unit_price,
            subtotal: line_subtotal(quantity, unit_price)?,
            sort_order,
            created_utc,
        })
    }
}

/// Input for adding a line item.
#[derive(Debug, Clone, Deserialize)]
pub struct LineItemInput {
    #[serde(default)]
    pub service_type_id: Option<Uuid>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    pub unit_price: Decimal,
}
