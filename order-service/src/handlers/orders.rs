//! Service order handlers.

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::retrying;
use crate::error::OrderResult;
use crate::ledger::Totals;
use crate::models::{
    LineItemInput, ListOrdersFilter, NewOrder, OrderStatus, RequestContext, ServiceOrder,
};
use crate::startup::AppState;

// ============================================================================
// Request/Response DTOs
// ============================================================================

/// Request to set an order's discount.
#[derive(Debug, Deserialize)]
pub struct SetDiscountRequest {
    pub discount: Decimal,
}

/// Request to move an order to another status.
#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: OrderStatus,
}

/// One page of orders.
#[derive(Debug, Serialize)]
pub struct ListOrdersResponse {
    pub orders: Vec<ServiceOrder>,
    pub next_page_token: Option<Uuid>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a service order.
///
/// POST /orders
///
/// Not retried: a timed-out insert may still have committed.
pub async fn create_order(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(req): Json<NewOrder>,
) -> OrderResult<(StatusCode, Json<ServiceOrder>)> {
    let order = state.service.create_order(&ctx, req).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// List orders for the caller's tenant.
///
/// GET /orders
pub async fn list_orders(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(filter): Query<ListOrdersFilter>,
) -> OrderResult<Json<ListOrdersResponse>> {
    let orders = retrying(&state, "list_orders", || {
        state.service.list_orders(&ctx, &filter)
    })
    .await?;

    let next_page_token = if orders.len() as i64 == filter.limit() {
        orders.last().map(|order| order.order_id)
    } else {
        None
    };

    Ok(Json(ListOrdersResponse {
        orders,
        next_page_token,
    }))
}

/// Get an order with freshly computed totals.
///
/// GET /orders/:order_id
pub async fn get_order(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(order_id): Path<Uuid>,
) -> OrderResult<Json<ServiceOrder>> {
    let order = retrying(&state, "get_order", || {
        state.service.get_order(&ctx, order_id)
    })
    .await?;
    Ok(Json(order))
}

/// Delete an order and its items.
///
/// DELETE /orders/:order_id
pub async fn delete_order(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(order_id): Path<Uuid>,
) -> OrderResult<StatusCode> {
    retrying(&state, "delete_order", || {
        state.service.delete_order(&ctx, order_id)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Append a line item.
///
/// POST /orders/:order_id/items
pub async fn add_line_item(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(order_id): Path<Uuid>,
    Json(req): Json<LineItemInput>,
) -> OrderResult<(StatusCode, Json<ServiceOrder>)> {
    let order = retrying(&state, "add_line_item", || {
        state.service.add_line_item(&ctx, order_id, req.clone())
    })
    .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// Remove a line item.
///
/// DELETE /orders/:order_id/items/:item_id
pub async fn remove_line_item(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((order_id, item_id)): Path<(Uuid, Uuid)>,
) -> OrderResult<Json<ServiceOrder>> {
    let order = retrying(&state, "remove_line_item", || {
        state.service.remove_line_item(&ctx, order_id, item_id)
    })
    .await?;
    Ok(Json(order))
}

/// Set the order discount.
///
/// PUT /orders/:order_id/discount
pub async fn set_discount(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(order_id): Path<Uuid>,
    Json(req): Json<SetDiscountRequest>,
) -> OrderResult<Json<ServiceOrder>> {
    let order = retrying(&state, "set_discount", || {
        state.service.set_discount(&ctx, order_id, req.discount)
    })
    .await?;
    Ok(Json(order))
}

/// Move the order to its next status.
///
/// POST /orders/:order_id/status
pub async fn transition_status(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(order_id): Path<Uuid>,
    Json(req): Json<TransitionRequest>,
) -> OrderResult<Json<ServiceOrder>> {
    let order = retrying(&state, "transition_status", || {
        state.service.transition_status(&ctx, order_id, req.status)
    })
    .await?;
    Ok(Json(order))
}

/// Recompute totals from the stored items.
///
/// GET /orders/:order_id/totals
pub async fn fetch_totals(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(order_id): Path<Uuid>,
) -> OrderResult<Json<Totals>> {
    let totals = retrying(&state, "fetch_totals", || {
        state.service.fetch_totals(&ctx, order_id)
    })
    .await?;
    Ok(Json(totals))
}
