//! Persistence interface consumed by [`OrderService`](super::OrderService).
//!
//! Implementations must make every write atomic: an order's header, totals,
//! status and items either change together or not at all. Writes that carry
//! an `expected_revision` must fail with [`StoreError::ConcurrentModification`]
//! when the stored revision differs, and bump the revision on success.

use crate::ledger::{Totals, ValidatedLineItem};
use crate::models::{
    DashboardStats, ListOrdersFilter, NewOrderRecord, OrderPatch, RequestContext, ServiceOrder,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record {0} not found")]
    NotFound(Uuid),

    #[error("Line item {0} not found")]
    ItemNotFound(Uuid),

    #[error("Revision mismatch")]
    ConcurrentModification,

    /// The store refused or holds data that breaks its constraints. Retrying
    /// the same write gives the same answer.
    #[error("Data integrity violation: {0}")]
    Integrity(anyhow::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(#[from] anyhow::Error),
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Customer that owns the vehicle.
    async fn get_vehicle_owner(
        &self,
        ctx: &RequestContext,
        vehicle_id: Uuid,
    ) -> Result<Uuid, StoreError>;

    /// Insert an `awaiting` order together with its items.
    async fn create_order_with_items(
        &self,
        ctx: &RequestContext,
        order: NewOrderRecord,
        items: Vec<ValidatedLineItem>,
    ) -> Result<ServiceOrder, StoreError>;

    async fn get_order(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
    ) -> Result<ServiceOrder, StoreError>;

    async fn list_orders(
        &self,
        ctx: &RequestContext,
        filter: &ListOrdersFilter,
    ) -> Result<Vec<ServiceOrder>, StoreError>;

    /// Apply `patch` if the stored revision equals `expected_revision`.
    async fn update_order(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
        patch: OrderPatch,
        expected_revision: i64,
    ) -> Result<ServiceOrder, StoreError>;

    /// Remove one item and store the recomputed totals in the same write.
    async fn delete_line_item(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
        line_item_id: Uuid,
        totals: Totals,
        expected_revision: i64,
    ) -> Result<ServiceOrder, StoreError>;

    /// Delete an order and, by cascade, its items.
    async fn delete_order(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
        expected_revision: i64,
    ) -> Result<(), StoreError>;

    async fn dashboard_stats(
        &self,
        ctx: &RequestContext,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<DashboardStats, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}
