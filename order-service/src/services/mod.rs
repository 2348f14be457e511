//! Services module for order-service.

pub mod database;
pub mod memory;
pub mod metrics;
mod order_service;
pub mod store;

pub use database::PgOrderStore;
pub use memory::InMemoryOrderStore;
pub use metrics::{get_metrics, init_metrics};
pub use order_service::OrderService;
pub use store::{OrderStore, StoreError};
