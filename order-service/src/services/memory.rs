//! In-process order store.
//!
//! Backs the test suites and `STORE_BACKEND=memory` local runs. Each order
//! lives in its own map entry; a mutation holds only that entry's lock and
//! never awaits while holding it, so writes are all-or-nothing even when the
//! caller is cancelled.

use super::store::{OrderStore, StoreError};
use crate::ledger::{Totals, ValidatedLineItem};
use crate::models::{
    DashboardStats, LineItem, ListOrdersFilter, NewOrderRecord, OrderPatch, OrderStatus,
    RequestContext, ServiceOrder, StatusCounts,
};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: DashMap<Uuid, ServiceOrder>,
    vehicles: DashMap<(Uuid, Uuid), Uuid>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `vehicle_id` belongs to `customer_id` within a tenant.
    pub fn register_vehicle(&self, tenant_id: Uuid, vehicle_id: Uuid, customer_id: Uuid) {
        self.vehicles.insert((tenant_id, vehicle_id), customer_id);
    }

    fn build_items(
        items: Vec<ValidatedLineItem>,
        first_sort_order: i32,
    ) -> impl Iterator<Item = LineItem> {
        let now = Utc::now();
        items.into_iter().enumerate().map(move |(idx, item)| {
            LineItem::from_validated(Uuid::new_v4(), item, first_sort_order + idx as i32, now)
        })
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn get_vehicle_owner(
        &self,
        ctx: &RequestContext,
        vehicle_id: Uuid,
    ) -> Result<Uuid, StoreError> {
        self.vehicles
            .get(&(ctx.tenant_id, vehicle_id))
            .map(|owner| *owner)
            .ok_or(StoreError::NotFound(vehicle_id))
    }

    async fn create_order_with_items(
        &self,
        ctx: &RequestContext,
        order: NewOrderRecord,
        items: Vec<ValidatedLineItem>,
    ) -> Result<ServiceOrder, StoreError> {
        let now = Utc::now();
        let order = ServiceOrder {
            order_id: Uuid::new_v4(),
            tenant_id: ctx.tenant_id,
            customer_id: order.customer_id,
            vehicle_id: order.vehicle_id,
            status: OrderStatus::Awaiting,
            line_items: Self::build_items(items, 0).collect(),
            discount: order.totals.discount,
            gross_total: order.totals.gross_total,
            net_total: order.totals.net_total,
            notes: order.notes,
            revision: 1,
            delivered_at: None,
            created_utc: now,
            updated_utc: now,
        };

        self.orders.insert(order.order_id, order.clone());
        Ok(order)
    }

    async fn get_order(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
    ) -> Result<ServiceOrder, StoreError> {
        self.orders
            .get(&order_id)
            .filter(|order| order.tenant_id == ctx.tenant_id)
            .map(|order| order.clone())
            .ok_or(StoreError::NotFound(order_id))
    }

    async fn list_orders(
        &self,
        ctx: &RequestContext,
        filter: &ListOrdersFilter,
    ) -> Result<Vec<ServiceOrder>, StoreError> {
        let mut orders: Vec<ServiceOrder> = self
            .orders
            .iter()
            .filter(|order| order.tenant_id == ctx.tenant_id)
            .filter(|order| filter.status.map_or(true, |s| order.status == s))
            .filter(|order| filter.customer_id.map_or(true, |c| order.customer_id == c))
            .filter(|order| filter.vehicle_id.map_or(true, |v| order.vehicle_id == v))
            .filter(|order| filter.page_token.map_or(true, |t| order.order_id > t))
            .map(|order| order.clone())
            .collect();

        orders.sort_by_key(|order| order.order_id);
        orders.truncate(filter.limit() as usize);
        Ok(orders)
    }

    async fn update_order(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
        patch: OrderPatch,
        expected_revision: i64,
    ) -> Result<ServiceOrder, StoreError> {
        let mut entry = self
            .orders
            .get_mut(&order_id)
            .filter(|order| order.tenant_id == ctx.tenant_id)
            .ok_or(StoreError::NotFound(order_id))?;

        if entry.revision != expected_revision {
            return Err(StoreError::ConcurrentModification);
        }

        let order = entry.value_mut();
        let first_sort_order = order.next_sort_order();
        order
            .line_items
            .extend(Self::build_items(patch.new_items, first_sort_order));
        if let Some(status) = patch.status {
            order.status = status;
        }
        if patch.delivered_at.is_some() {
            order.delivered_at = patch.delivered_at;
        }
        if let Some(totals) = patch.totals {
            order.gross_total = totals.gross_total;
            order.discount = totals.discount;
            order.net_total = totals.net_total;
        }
        order.revision += 1;
        order.updated_utc = Utc::now();

        Ok(order.clone())
    }

    async fn delete_line_item(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
        line_item_id: Uuid,
        totals: Totals,
        expected_revision: i64,
    ) -> Result<ServiceOrder, StoreError> {
        let mut entry = self
            .orders
            .get_mut(&order_id)
            .filter(|order| order.tenant_id == ctx.tenant_id)
            .ok_or(StoreError::NotFound(order_id))?;

        if entry.revision != expected_revision {
            return Err(StoreError::ConcurrentModification);
        }

        let order = entry.value_mut();
        let position = order
            .line_items
            .iter()
            .position(|item| item.line_item_id == line_item_id)
            .ok_or(StoreError::ItemNotFound(line_item_id))?;

        order.line_items.remove(position);
        order.gross_total = totals.gross_total;
        order.discount = totals.discount;
        order.net_total = totals.net_total;
        order.revision += 1;
        order.updated_utc = Utc::now();

        Ok(order.clone())
    }

    async fn delete_order(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
        expected_revision: i64,
    ) -> Result<(), StoreError> {
        let removed = self.orders.remove_if(&order_id, |_, order| {
            order.tenant_id == ctx.tenant_id && order.revision == expected_revision
        });

        match removed {
            Some(_) => Ok(()),
            None => match self.orders.get(&order_id) {
                Some(order) if order.tenant_id == ctx.tenant_id => {
                    Err(StoreError::ConcurrentModification)
                }
                _ => Err(StoreError::NotFound(order_id)),
            },
        }
    }

    async fn dashboard_stats(
        &self,
        ctx: &RequestContext,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<DashboardStats, StoreError> {
        let mut counts = StatusCounts::default();
        let mut revenue = Decimal::ZERO;

        for order in self.orders.iter().filter(|o| o.tenant_id == ctx.tenant_id) {
            match order.status {
                OrderStatus::Awaiting => counts.awaiting += 1,
                OrderStatus::InProgress => counts.in_progress += 1,
                OrderStatus::Completed => counts.completed += 1,
                OrderStatus::Delivered => counts.delivered += 1,
            }

            if let Some(delivered_at) = order.delivered_at {
                let day = delivered_at.date_naive();
                if order.status.is_terminal() && day >= from && day <= to {
                    revenue += order.net_total;
                }
            }
        }

        Ok(DashboardStats {
            orders_by_status: counts,
            total_orders: counts.total(),
            delivered_revenue: revenue,
            revenue_from: from,
            revenue_to: to,
        })
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
