//! Test helper module for order-service integration tests.
//!
//! Provides an in-memory harness and a store wrapper that can stall or fail
//! calls on demand.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use order_service::ledger::{Totals, ValidatedLineItem};
use order_service::models::{
    DashboardStats, LineItemInput, ListOrdersFilter, NewOrder, NewOrderRecord, OrderPatch,
    RequestContext, ServiceOrder,
};
use order_service::services::{InMemoryOrderStore, OrderService, OrderStore, StoreError};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;
use uuid::Uuid;

// Test constants for tenant context
pub const TEST_TENANT_ID: &str = "11111111-1111-1111-1111-111111111111";
pub const OTHER_TENANT_ID: &str = "99999999-9999-9999-9999-999999999999";

pub fn tenant_id() -> Uuid {
    Uuid::parse_str(TEST_TENANT_ID).unwrap()
}

pub fn ctx() -> RequestContext {
    RequestContext::with_actor(tenant_id(), Uuid::new_v4())
}

pub fn other_ctx() -> RequestContext {
    RequestContext::new(Uuid::parse_str(OTHER_TENANT_ID).unwrap())
}

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn item(quantity: i32, unit_price: &str) -> LineItemInput {
    LineItemInput {
        service_type_id: None,
        description: format!("{} x {}", quantity, unit_price),
        quantity,
        unit_price: dec(unit_price),
    }
}

/// Order service over an in-memory store with one registered vehicle.
pub struct MemoryHarness {
    pub store: Arc<InMemoryOrderStore>,
    pub service: OrderService,
    pub ctx: RequestContext,
    pub customer_id: Uuid,
    pub vehicle_id: Uuid,
}

impl MemoryHarness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryOrderStore::new());
        Self::with_store(store.clone(), store)
    }

    /// Build a harness whose service talks to `service_store`, which is
    /// expected to wrap `store`.
    pub fn with_store(store: Arc<InMemoryOrderStore>, service_store: Arc<dyn OrderStore>) -> Self {
        let customer_id = Uuid::new_v4();
        let vehicle_id = Uuid::new_v4();
        store.register_vehicle(tenant_id(), vehicle_id, customer_id);

        Self {
            store,
            service: OrderService::new(service_store),
            ctx: ctx(),
            customer_id,
            vehicle_id,
        }
    }

    pub fn new_order(&self, items: Vec<LineItemInput>) -> NewOrder {
        NewOrder {
            customer_id: self.customer_id,
            vehicle_id: self.vehicle_id,
            items,
            notes: None,
        }
    }

    pub async fn create(&self, items: Vec<LineItemInput>) -> ServiceOrder {
        self.service
            .create_order(&self.ctx, self.new_order(items))
            .await
            .expect("Failed to create order")
    }
}

/// Store wrapper used to force interleavings, delays and outages.
pub struct ScriptedStore {
    inner: Arc<InMemoryOrderStore>,
    read_barrier: Option<Arc<Barrier>>,
    barrier_parties: usize,
    barrier_uses: AtomicUsize,
    write_delay: Duration,
    failing_reads: AtomicU32,
}

impl ScriptedStore {
    pub fn new(inner: Arc<InMemoryOrderStore>) -> Self {
        Self {
            inner,
            read_barrier: None,
            barrier_parties: 0,
            barrier_uses: AtomicUsize::new(0),
            write_delay: Duration::ZERO,
            failing_reads: AtomicU32::new(0),
        }
    }

    /// Hold the first `parties` order reads until all of them have arrived.
    pub fn with_read_barrier(mut self, parties: usize) -> Self {
        self.read_barrier = Some(Arc::new(Barrier::new(parties)));
        self.barrier_parties = parties;
        self
    }

    /// Sleep before every write.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    /// Fail the next `count` order reads as if the database were down.
    pub fn with_failing_reads(self, count: u32) -> Self {
        self.failing_reads.store(count, Ordering::SeqCst);
        self
    }

    fn before_read(&self) -> Result<(), StoreError> {
        let remaining = self.failing_reads.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_reads.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable(anyhow::anyhow!(
                "connection refused"
            )));
        }
        Ok(())
    }

    /// Park a reader that already holds its snapshot until its peers have
    /// read too, so all of them act on the same revision.
    async fn after_read(&self) {
        if let Some(barrier) = &self.read_barrier {
            if self.barrier_uses.fetch_add(1, Ordering::SeqCst) < self.barrier_parties {
                barrier.wait().await;
            }
        }
    }

    async fn before_write(&self) {
        if !self.write_delay.is_zero() {
            tokio::time::sleep(self.write_delay).await;
        }
    }
}

#[async_trait]
impl OrderStore for ScriptedStore {
    async fn get_vehicle_owner(
        &self,
        ctx: &RequestContext,
        vehicle_id: Uuid,
    ) -> Result<Uuid, StoreError> {
        self.inner.get_vehicle_owner(ctx, vehicle_id).await
    }

    async fn create_order_with_items(
        &self,
        ctx: &RequestContext,
        order: NewOrderRecord,
        items: Vec<ValidatedLineItem>,
    ) -> Result<ServiceOrder, StoreError> {
        self.before_write().await;
        self.inner.create_order_with_items(ctx, order, items).await
    }

    async fn get_order(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
    ) -> Result<ServiceOrder, StoreError> {
        self.before_read()?;
        let order = self.inner.get_order(ctx, order_id).await;
        self.after_read().await;
        order
    }

    async fn list_orders(
        &self,
        ctx: &RequestContext,
        filter: &ListOrdersFilter,
    ) -> Result<Vec<ServiceOrder>, StoreError> {
        self.inner.list_orders(ctx, filter).await
    }

    async fn update_order(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
        patch: OrderPatch,
        expected_revision: i64,
    ) -> Result<ServiceOrder, StoreError> {
        self.before_write().await;
        self.inner
            .update_order(ctx, order_id, patch, expected_revision)
            .await
    }

    async fn delete_line_item(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
        line_item_id: Uuid,
        totals: Totals,
        expected_revision: i64,
    ) -> Result<ServiceOrder, StoreError> {
        self.before_write().await;
        self.inner
            .delete_line_item(ctx, order_id, line_item_id, totals, expected_revision)
            .await
    }

    async fn delete_order(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
        expected_revision: i64,
    ) -> Result<(), StoreError> {
        self.before_write().await;
        self.inner
            .delete_order(ctx, order_id, expected_revision)
            .await
    }

    async fn dashboard_stats(
        &self,
        ctx: &RequestContext,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<DashboardStats, StoreError> {
        self.inner.dashboard_stats(ctx, from, to).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.inner.health_check().await
    }
}
