//! Order orchestration.
//!
//! Every mutation reads the order with its revision, computes the new state
//! with the ledger rules, and writes it back guarded by that revision. The
//! service holds no mutable state; retrying a failed call is left to the
//! caller.

use super::metrics::{ORDERS_TOTAL, TRANSITIONS_TOTAL};
use super::store::{OrderStore, StoreError};
use crate::error::{OrderError, OrderResult};
use crate::ledger::{
    apply_transition, compute_totals, ensure_mutable, normalize_discount, validate_line_item,
    Totals,
};
use crate::models::{
    DashboardStats, LineItemInput, ListOrdersFilter, NewOrder, NewOrderRecord, OrderPatch,
    OrderStatus, RequestContext, ServiceOrder,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    store_timeout: Duration,
}

impl OrderService {
    pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self {
            store,
            store_timeout: Self::DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Bound every store call by `timeout`.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Run one store call under the configured deadline.
    ///
    /// A call that overruns is dropped; the store guarantees nothing of it
    /// was committed.
    async fn call<T, F>(&self, operation: &'static str, fut: F) -> OrderResult<T>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(result) => result.map_err(OrderError::from),
            Err(_) => {
                warn!(
                    operation = operation,
                    timeout_ms = self.store_timeout.as_millis() as u64,
                    "Order store call timed out"
                );
                Err(OrderError::StoreUnavailable(format!(
                    "{} timed out after {}ms",
                    operation,
                    self.store_timeout.as_millis()
                )))
            }
        }
    }

    async fn load(&self, ctx: &RequestContext, order_id: Uuid) -> OrderResult<ServiceOrder> {
        self.call("get_order", self.store.get_order(ctx, order_id))
            .await
    }

    /// Replace stored aggregates with values recomputed from the items.
    fn with_current_totals(mut order: ServiceOrder) -> OrderResult<ServiceOrder> {
        let totals = compute_totals(
            order.line_items.iter().map(|item| item.subtotal),
            order.discount,
        )?;
        order.gross_total = totals.gross_total;
        order.discount = totals.discount;
        order.net_total = totals.net_total;
        Ok(order)
    }

    #[instrument(
        skip(self, ctx, input),
        fields(tenant_id = %ctx.tenant_id, actor_id = ?ctx.actor_id, vehicle_id = %input.vehicle_id)
    )]
    pub async fn create_order(
        &self,
        ctx: &RequestContext,
        input: NewOrder,
    ) -> OrderResult<ServiceOrder> {
        let owner = self
            .call(
                "get_vehicle_owner",
                self.store.get_vehicle_owner(ctx, input.vehicle_id),
            )
            .await
            .map_err(|e| match e {
                OrderError::OrderNotFound(id) => OrderError::VehicleNotFound(id),
                other => other,
            })?;

        if owner != input.customer_id {
            return Err(OrderError::VehicleCustomerMismatch {
                vehicle_id: input.vehicle_id,
                customer_id: input.customer_id,
            });
        }

        let items = input
            .items
            .iter()
            .map(validate_line_item)
            .collect::<Result<Vec<_>, _>>()?;

        let totals = compute_totals(items.iter().map(|item| item.subtotal), Decimal::ZERO)?;

        let record = NewOrderRecord {
            customer_id: input.customer_id,
            vehicle_id: input.vehicle_id,
            notes: input.notes,
            totals,
        };

        let order = self
            .call(
                "create_order",
                self.store.create_order_with_items(ctx, record, items),
            )
            .await?;

        ORDERS_TOTAL
            .with_label_values(&[order.status.as_str()])
            .inc();

        info!(
            order_id = %order.order_id,
            item_count = order.line_items.len(),
            gross_total = %order.gross_total,
            "Service order created"
        );

        Self::with_current_totals(order)
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id, order_id = %order_id))]
    pub async fn get_order(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
    ) -> OrderResult<ServiceOrder> {
        let order = self.load(ctx, order_id).await?;
        Self::with_current_totals(order)
    }

    #[instrument(skip(self, ctx, filter), fields(tenant_id = %ctx.tenant_id))]
    pub async fn list_orders(
        &self,
        ctx: &RequestContext,
        filter: &ListOrdersFilter,
    ) -> OrderResult<Vec<ServiceOrder>> {
        let orders = self
            .call("list_orders", self.store.list_orders(ctx, filter))
            .await?;

        orders.into_iter().map(Self::with_current_totals).collect()
    }

    #[instrument(
        skip(self, ctx, input),
        fields(tenant_id = %ctx.tenant_id, actor_id = ?ctx.actor_id, order_id = %order_id)
    )]
    pub async fn add_line_item(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
        input: LineItemInput,
    ) -> OrderResult<ServiceOrder> {
        let order = self.load(ctx, order_id).await?;
        ensure_mutable(order.status)?;

        let item = validate_line_item(&input)?;
        let totals = compute_totals(
            order
                .line_items
                .iter()
                .map(|existing| existing.subtotal)
                .chain(std::iter::once(item.subtotal)),
            order.discount,
        )?;

        let patch = OrderPatch {
            totals: Some(totals),
            new_items: vec![item],
            ..Default::default()
        };

        let updated = self
            .call(
                "update_order",
                self.store.update_order(ctx, order_id, patch, order.revision),
            )
            .await?;

        info!(
            revision = updated.revision,
            gross_total = %updated.gross_total,
            "Line item added"
        );

        Self::with_current_totals(updated)
    }

    #[instrument(
        skip(self, ctx),
        fields(tenant_id = %ctx.tenant_id, actor_id = ?ctx.actor_id, order_id = %order_id)
    )]
    pub async fn remove_line_item(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
        line_item_id: Uuid,
    ) -> OrderResult<ServiceOrder> {
        let order = self.load(ctx, order_id).await?;
        ensure_mutable(order.status)?;

        if order.find_line_item(line_item_id).is_none() {
            return Err(OrderError::ItemNotFound(line_item_id));
        }

        let totals = compute_totals(
            order
                .line_items
                .iter()
                .filter(|item| item.line_item_id != line_item_id)
                .map(|item| item.subtotal),
            order.discount,
        )?;

        let updated = self
            .call(
                "delete_line_item",
                self.store
                    .delete_line_item(ctx, order_id, line_item_id, totals, order.revision),
            )
            .await?;

        info!(
            revision = updated.revision,
            gross_total = %updated.gross_total,
            "Line item removed"
        );

        Self::with_current_totals(updated)
    }

    #[instrument(
        skip(self, ctx),
        fields(tenant_id = %ctx.tenant_id, actor_id = ?ctx.actor_id, order_id = %order_id)
    )]
    pub async fn set_discount(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
        discount: Decimal,
    ) -> OrderResult<ServiceOrder> {
        let discount = normalize_discount(discount)?;
        let order = self.load(ctx, order_id).await?;
        ensure_mutable(order.status)?;

        let totals = compute_totals(order.line_items.iter().map(|item| item.subtotal), discount)?;

        let patch = OrderPatch {
            totals: Some(totals),
            ..Default::default()
        };

        let updated = self
            .call(
                "update_order",
                self.store.update_order(ctx, order_id, patch, order.revision),
            )
            .await?;

        info!(
            revision = updated.revision,
            discount = %updated.discount,
            net_total = %updated.net_total,
            "Discount applied"
        );

        Self::with_current_totals(updated)
    }

    #[instrument(
        skip(self, ctx),
        fields(tenant_id = %ctx.tenant_id, actor_id = ?ctx.actor_id, order_id = %order_id, target = %target)
    )]
    pub async fn transition_status(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
        target: OrderStatus,
    ) -> OrderResult<ServiceOrder> {
        let order = self.load(ctx, order_id).await?;
        let transition = apply_transition(order.status, order.delivered_at, target, Utc::now())?;

        let patch = OrderPatch {
            status: Some(transition.to),
            delivered_at: transition.delivered_at,
            ..Default::default()
        };

        let updated = self
            .call(
                "update_order",
                self.store.update_order(ctx, order_id, patch, order.revision),
            )
            .await?;

        TRANSITIONS_TOTAL
            .with_label_values(&[transition.from.as_str(), transition.to.as_str()])
            .inc();

        info!(
            from = %transition.from,
            to = %transition.to,
            revision = updated.revision,
            "Order status changed"
        );

        Self::with_current_totals(updated)
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id, order_id = %order_id))]
    pub async fn fetch_totals(&self, ctx: &RequestContext, order_id: Uuid) -> OrderResult<Totals> {
        let order = self.load(ctx, order_id).await?;
        let totals = compute_totals(
            order.line_items.iter().map(|item| item.subtotal),
            order.discount,
        )?;
        Ok(totals)
    }

    #[instrument(
        skip(self, ctx),
        fields(tenant_id = %ctx.tenant_id, actor_id = ?ctx.actor_id, order_id = %order_id)
    )]
    pub async fn delete_order(&self, ctx: &RequestContext, order_id: Uuid) -> OrderResult<()> {
        let order = self.load(ctx, order_id).await?;
        ensure_mutable(order.status)?;

        self.call(
            "delete_order",
            self.store.delete_order(ctx, order_id, order.revision),
        )
        .await?;

        info!("Service order deleted");

        Ok(())
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id, from = %from, to = %to))]
    pub async fn dashboard_stats(
        &self,
        ctx: &RequestContext,
        from: NaiveDate,
        to: NaiveDate,
    ) -> OrderResult<DashboardStats> {
        self.call("dashboard_stats", self.store.dashboard_stats(ctx, from, to))
            .await
    }

    /// Readiness check for the backing store.
    pub async fn health_check(&self) -> OrderResult<()> {
        self.call("health_check", self.store.health_check()).await
    }
}
