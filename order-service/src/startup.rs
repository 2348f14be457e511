//! Application startup and lifecycle management.

use crate::config::{OrderServiceConfig, StoreBackend};
use crate::handlers::{dashboard, orders};
use crate::services::{
    get_metrics, init_metrics, InMemoryOrderStore, OrderService, OrderStore, PgOrderStore,
};
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use service_core::retry::RetryConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub service: OrderService,
    pub retry: RetryConfig,
}

impl AppState {
    pub fn new(service: OrderService, retry: RetryConfig) -> Self {
        Self { service, retry }
    }
}

/// Liveness check.
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "order-service",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Readiness check; fails while the order store is unreachable.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.service.health_check().await {
        Ok(_) => {
            tracing::debug!("Readiness check passed");
            (StatusCode::OK, Json(json!({ "status": "ready" })))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed - order store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unavailable",
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    let metrics = get_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        metrics,
    )
}

/// Build the HTTP router over the given state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/orders",
            post(orders::create_order).get(orders::list_orders),
        )
        .route(
            "/orders/:order_id",
            get(orders::get_order).delete(orders::delete_order),
        )
        .route("/orders/:order_id/items", post(orders::add_line_item))
        .route(
            "/orders/:order_id/items/:item_id",
            delete(orders::remove_line_item),
        )
        .route("/orders/:order_id/discount", put(orders::set_discount))
        .route("/orders/:order_id/status", post(orders::transition_status))
        .route("/orders/:order_id/totals", get(orders::fetch_totals))
        .route("/dashboard/stats", get(dashboard::dashboard_stats))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application, connecting the configured store.
    pub async fn build(config: OrderServiceConfig) -> Result<Self, AppError> {
        let store: Arc<dyn OrderStore> = match config.store.backend {
            StoreBackend::Postgres => {
                let store = PgOrderStore::new(
                    &config.database.url,
                    config.database.max_connections,
                    config.database.min_connections,
                )
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to connect to PostgreSQL");
                    e
                })?;

                store.run_migrations().await.map_err(|e| {
                    tracing::error!(error = %e, "Failed to run migrations");
                    e
                })?;

                Arc::new(store)
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory order store; data is lost on shutdown");
                Arc::new(InMemoryOrderStore::new())
            }
        };

        Self::build_with_store(config, store).await
    }

    /// Build the application around an existing store.
    pub async fn build_with_store(
        config: OrderServiceConfig,
        store: Arc<dyn OrderStore>,
    ) -> Result<Self, AppError> {
        init_metrics();

        let service = OrderService::new(store).with_store_timeout(config.store.timeout());
        let state = AppState::new(service, config.retry_config());

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Order service listener bound");

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state);

        tracing::info!(
            service = "order-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, router).await.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
