//! PostgreSQL order store.

use super::store::{OrderStore, StoreError};
use crate::ledger::{Totals, ValidatedLineItem};
use crate::models::{
    DashboardStats, LineItem, ListOrdersFilter, NewOrderRecord, OrderPatch, OrderStatus,
    RequestContext, ServiceOrder, StatusCounts,
};
use crate::services::metrics::DB_QUERY_DURATION;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const ORDER_COLUMNS: &str = "order_id, tenant_id, customer_id, vehicle_id, status, discount, \
     gross_total, net_total, notes, revision, delivered_at, created_utc, updated_utc";

const LINE_ITEM_COLUMNS: &str = "line_item_id, order_id, service_type_id, description, quantity, \
     unit_price, sort_order, created_utc";

#[derive(Debug, FromRow)]
struct OrderRow {
    order_id: Uuid,
    tenant_id: Uuid,
    customer_id: Uuid,
    vehicle_id: Uuid,
    status: String,
    discount: Decimal,
    gross_total: Decimal,
    net_total: Decimal,
    notes: Option<String>,
    revision: i64,
    delivered_at: Option<DateTime<Utc>>,
    created_utc: DateTime<Utc>,
    updated_utc: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, line_items: Vec<LineItem>) -> Result<ServiceOrder, StoreError> {
        let status = self
            .status
            .parse::<OrderStatus>()
            .map_err(|e| StoreError::Integrity(anyhow::anyhow!(e)))?;

        Ok(ServiceOrder {
            order_id: self.order_id,
            tenant_id: self.tenant_id,
            customer_id: self.customer_id,
            vehicle_id: self.vehicle_id,
            status,
            line_items,
            discount: self.discount,
            gross_total: self.gross_total,
            net_total: self.net_total,
            notes: self.notes,
            revision: self.revision,
            delivered_at: self.delivered_at,
            created_utc: self.created_utc,
            updated_utc: self.updated_utc,
        })
    }
}

#[derive(Debug, FromRow)]
struct LineItemRow {
    line_item_id: Uuid,
    order_id: Uuid,
    service_type_id: Option<Uuid>,
    description: String,
    quantity: i32,
    unit_price: Decimal,
    sort_order: i32,
    created_utc: DateTime<Utc>,
}

impl TryFrom<LineItemRow> for LineItem {
    type Error = StoreError;

    fn try_from(row: LineItemRow) -> Result<Self, Self::Error> {
        let line_item_id = row.line_item_id;
        LineItem::from_stored(
            line_item_id,
            row.service_type_id,
            row.description,
            row.quantity,
            row.unit_price,
            row.sort_order,
            row.created_utc,
        )
        .map_err(|e| {
            StoreError::Integrity(anyhow::anyhow!("Stored line item {}: {}", line_item_id, e))
        })
    }
}

/// Split sqlx failures into permanent data errors and outages.
///
/// SQLSTATE class 22 (data exception, e.g. numeric overflow) and class 23
/// (constraint violation) fail the same way on every attempt, as do values
/// that cannot be decoded.
fn store_error(context: &str, e: sqlx::Error) -> StoreError {
    let permanent = match &e {
        sqlx::Error::Database(db) => db
            .code()
            .is_some_and(|code| code.starts_with("22") || code.starts_with("23")),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => true,
        _ => false,
    };

    if permanent {
        warn!(error = %e, context = context, "Order store rejected data");
        StoreError::Integrity(anyhow::anyhow!("{}: {}", context, e))
    } else {
        StoreError::Unavailable(anyhow::anyhow!("{}: {}", context, e))
    }
}

/// Order store backed by a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "order-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn load_line_items(
        conn: &mut PgConnection,
        order_id: Uuid,
    ) -> Result<Vec<LineItem>, StoreError> {
        let rows = sqlx::query_as::<_, LineItemRow>(&format!(
            "SELECT {LINE_ITEM_COLUMNS} FROM service_order_line_items \
             WHERE order_id = $1 ORDER BY sort_order, created_utc"
        ))
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| store_error("Failed to load line items", e))?;

        rows.into_iter().map(LineItem::try_from).collect()
    }

    async fn insert_line_items(
        conn: &mut PgConnection,
        ctx: &RequestContext,
        order_id: Uuid,
        items: Vec<ValidatedLineItem>,
        first_sort_order: i32,
    ) -> Result<(), StoreError> {
        for (idx, item) in items.into_iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO service_order_line_items (
                    line_item_id, order_id, tenant_id, service_type_id, description,
                    quantity, unit_price, sort_order
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(order_id)
            .bind(ctx.tenant_id)
            .bind(item.service_type_id)
            .bind(&item.description)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(first_sort_order + idx as i32)
            .execute(&mut *conn)
            .await
            .map_err(|e| store_error("Failed to insert line item", e))?;
        }
        Ok(())
    }

    /// Explain why a revision-guarded write matched no row.
    async fn classify_miss(
        conn: &mut PgConnection,
        ctx: &RequestContext,
        order_id: Uuid,
    ) -> StoreError {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM service_orders WHERE tenant_id = $1 AND order_id = $2)",
        )
        .bind(ctx.tenant_id)
        .bind(order_id)
        .fetch_one(&mut *conn)
        .await;

        match exists {
            Ok(true) => StoreError::ConcurrentModification,
            Ok(false) => StoreError::NotFound(order_id),
            Err(e) => store_error("Failed to check order", e),
        }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id, vehicle_id = %vehicle_id))]
    async fn get_vehicle_owner(
        &self,
        ctx: &RequestContext,
        vehicle_id: Uuid,
    ) -> Result<Uuid, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_vehicle_owner"])
            .start_timer();

        let owner = sqlx::query_scalar::<_, Uuid>(
            "SELECT customer_id FROM vehicles WHERE tenant_id = $1 AND vehicle_id = $2",
        )
        .bind(ctx.tenant_id)
        .bind(vehicle_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("Failed to get vehicle", e))?;

        timer.observe_duration();

        owner.ok_or(StoreError::NotFound(vehicle_id))
    }

    #[instrument(skip(self, ctx, order, items), fields(tenant_id = %ctx.tenant_id, item_count = items.len()))]
    async fn create_order_with_items(
        &self,
        ctx: &RequestContext,
        order: NewOrderRecord,
        items: Vec<ValidatedLineItem>,
    ) -> Result<ServiceOrder, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_order"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("Failed to begin transaction", e))?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            INSERT INTO service_orders (
                order_id, tenant_id, customer_id, vehicle_id, status,
                discount, gross_total, net_total, notes
            )
            VALUES ($1, $2, $3, $4, 'awaiting', $5, $6, $7, $8)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(ctx.tenant_id)
        .bind(order.customer_id)
        .bind(order.vehicle_id)
        .bind(order.totals.discount)
        .bind(order.totals.gross_total)
        .bind(order.totals.net_total)
        .bind(&order.notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| store_error("Failed to create order", e))?;

        let order_id = row.order_id;
        Self::insert_line_items(&mut tx, ctx, order_id, items, 0).await?;
        let line_items = Self::load_line_items(&mut tx, order_id).await?;

        tx.commit()
            .await
            .map_err(|e| store_error("Failed to commit transaction", e))?;

        timer.observe_duration();

        info!(order_id = %order_id, "Service order created");

        row.into_order(line_items)
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id, order_id = %order_id))]
    async fn get_order(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
    ) -> Result<ServiceOrder, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_order"])
            .start_timer();

        // Header and items must come from the same snapshot.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("Failed to begin transaction", e))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| store_error("Failed to set isolation level", e))?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM service_orders WHERE tenant_id = $1 AND order_id = $2"
        ))
        .bind(ctx.tenant_id)
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| store_error("Failed to get order", e))?
        .ok_or(StoreError::NotFound(order_id))?;

        let line_items = Self::load_line_items(&mut tx, order_id).await?;

        tx.commit()
            .await
            .map_err(|e| store_error("Failed to commit transaction", e))?;

        timer.observe_duration();

        row.into_order(line_items)
    }

    #[instrument(skip(self, ctx, filter), fields(tenant_id = %ctx.tenant_id))]
    async fn list_orders(
        &self,
        ctx: &RequestContext,
        filter: &ListOrdersFilter,
    ) -> Result<Vec<ServiceOrder>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_orders"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("Failed to begin transaction", e))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| store_error("Failed to set isolation level", e))?;

        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM service_orders
            WHERE tenant_id = $1
              AND ($2::varchar IS NULL OR status = $2)
              AND ($3::uuid IS NULL OR customer_id = $3)
              AND ($4::uuid IS NULL OR vehicle_id = $4)
              AND ($5::uuid IS NULL OR order_id > $5)
            ORDER BY order_id
            LIMIT $6
            "#
        ))
        .bind(ctx.tenant_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.customer_id)
        .bind(filter.vehicle_id)
        .bind(filter.page_token)
        .bind(filter.limit())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| store_error("Failed to list orders", e))?;

        let order_ids: Vec<Uuid> = rows.iter().map(|row| row.order_id).collect();
        let item_rows = sqlx::query_as::<_, LineItemRow>(&format!(
            "SELECT {LINE_ITEM_COLUMNS} FROM service_order_line_items \
             WHERE order_id = ANY($1) ORDER BY sort_order, created_utc"
        ))
        .bind(&order_ids)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| store_error("Failed to load line items", e))?;

        tx.commit()
            .await
            .map_err(|e| store_error("Failed to commit transaction", e))?;

        let mut items_by_order: HashMap<Uuid, Vec<LineItem>> = HashMap::new();
        for item in item_rows {
            items_by_order
                .entry(item.order_id)
                .or_default()
                .push(LineItem::try_from(item)?);
        }

        let orders = rows
            .into_iter()
            .map(|row| {
                let items = items_by_order.remove(&row.order_id).unwrap_or_default();
                row.into_order(items)
            })
            .collect::<Result<Vec<_>, _>>()?;

        timer.observe_duration();

        Ok(orders)
    }

    #[instrument(skip(self, ctx, patch), fields(tenant_id = %ctx.tenant_id, order_id = %order_id))]
    async fn update_order(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
        patch: OrderPatch,
        expected_revision: i64,
    ) -> Result<ServiceOrder, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_order"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("Failed to begin transaction", e))?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            UPDATE service_orders
            SET status = COALESCE($4, status),
                delivered_at = COALESCE($5, delivered_at),
                gross_total = COALESCE($6, gross_total),
                discount = COALESCE($7, discount),
                net_total = COALESCE($8, net_total),
                revision = revision + 1,
                updated_utc = NOW()
            WHERE tenant_id = $1 AND order_id = $2 AND revision = $3
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(ctx.tenant_id)
        .bind(order_id)
        .bind(expected_revision)
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.delivered_at)
        .bind(patch.totals.map(|t| t.gross_total))
        .bind(patch.totals.map(|t| t.discount))
        .bind(patch.totals.map(|t| t.net_total))
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| store_error("Failed to update order", e))?;

        let Some(row) = row else {
            let err = Self::classify_miss(&mut tx, ctx, order_id).await;
            tx.rollback().await.ok();
            return Err(err);
        };

        if !patch.new_items.is_empty() {
            let next_sort_order = sqlx::query_scalar::<_, i32>(
                "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM service_order_line_items WHERE order_id = $1",
            )
            .bind(order_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| store_error("Failed to read sort order", e))?;

            Self::insert_line_items(&mut tx, ctx, order_id, patch.new_items, next_sort_order)
                .await?;
        }

        let line_items = Self::load_line_items(&mut tx, order_id).await?;

        tx.commit()
            .await
            .map_err(|e| store_error("Failed to commit transaction", e))?;

        timer.observe_duration();

        info!(order_id = %order_id, revision = row.revision, "Service order updated");

        row.into_order(line_items)
    }

    #[instrument(
        skip(self, ctx, totals),
        fields(tenant_id = %ctx.tenant_id, order_id = %order_id, line_item_id = %line_item_id)
    )]
    async fn delete_line_item(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
        line_item_id: Uuid,
        totals: Totals,
        expected_revision: i64,
    ) -> Result<ServiceOrder, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_line_item"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("Failed to begin transaction", e))?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            UPDATE service_orders
            SET gross_total = $4,
                discount = $5,
                net_total = $6,
                revision = revision + 1,
                updated_utc = NOW()
            WHERE tenant_id = $1 AND order_id = $2 AND revision = $3
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(ctx.tenant_id)
        .bind(order_id)
        .bind(expected_revision)
        .bind(totals.gross_total)
        .bind(totals.discount)
        .bind(totals.net_total)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| store_error("Failed to update order totals", e))?;

        let Some(row) = row else {
            let err = Self::classify_miss(&mut tx, ctx, order_id).await;
            tx.rollback().await.ok();
            return Err(err);
        };

        let deleted = sqlx::query(
            "DELETE FROM service_order_line_items WHERE order_id = $1 AND line_item_id = $2",
        )
        .bind(order_id)
        .bind(line_item_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| store_error("Failed to delete line item", e))?;

        if deleted.rows_affected() == 0 {
            tx.rollback().await.ok();
            return Err(StoreError::ItemNotFound(line_item_id));
        }

        let line_items = Self::load_line_items(&mut tx, order_id).await?;

        tx.commit()
            .await
            .map_err(|e| store_error("Failed to commit transaction", e))?;

        timer.observe_duration();

        info!(order_id = %order_id, line_item_id = %line_item_id, "Line item removed");

        row.into_order(line_items)
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id, order_id = %order_id))]
    async fn delete_order(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
        expected_revision: i64,
    ) -> Result<(), StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_order"])
            .start_timer();

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| store_error("Failed to acquire connection", e))?;

        let result = sqlx::query(
            "DELETE FROM service_orders WHERE tenant_id = $1 AND order_id = $2 AND revision = $3",
        )
        .bind(ctx.tenant_id)
        .bind(order_id)
        .bind(expected_revision)
        .execute(&mut *conn)
        .await
        .map_err(|e| store_error("Failed to delete order", e))?;

        if result.rows_affected() == 0 {
            return Err(Self::classify_miss(&mut conn, ctx, order_id).await);
        }

        timer.observe_duration();

        info!(order_id = %order_id, "Service order deleted");

        Ok(())
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id, from = %from, to = %to))]
    async fn dashboard_stats(
        &self,
        ctx: &RequestContext,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<DashboardStats, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["dashboard_stats"])
            .start_timer();

        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM service_orders WHERE tenant_id = $1 GROUP BY status",
        )
        .bind(ctx.tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("Failed to count orders", e))?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            match status.parse::<OrderStatus>() {
                Ok(OrderStatus::Awaiting) => counts.awaiting = count,
                Ok(OrderStatus::InProgress) => counts.in_progress = count,
                Ok(OrderStatus::Completed) => counts.completed = count,
                Ok(OrderStatus::Delivered) => counts.delivered = count,
                Err(e) => return Err(StoreError::Integrity(anyhow::anyhow!(e))),
            }
        }

        let revenue = sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT COALESCE(SUM(net_total), 0)
            FROM service_orders
            WHERE tenant_id = $1
              AND status = 'delivered'
              AND (delivered_at AT TIME ZONE 'UTC')::date BETWEEN $2 AND $3
            "#,
        )
        .bind(ctx.tenant_id)
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_error("Failed to sum revenue", e))?;

        timer.observe_duration();

        Ok(DashboardStats {
            orders_by_status: counts,
            total_orders: counts.total(),
            delivered_revenue: revenue,
            revenue_from: from,
            revenue_to: to,
        })
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("Health check failed", e))?;
        Ok(())
    }
}
