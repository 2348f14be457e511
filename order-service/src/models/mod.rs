//! Domain models for order-service.

mod context;
mod line_item;
mod order;
mod stats;

pub use context::RequestContext;
pub use line_item::{LineItem, LineItemInput};
pub use order::{ListOrdersFilter, NewOrder, NewOrderRecord, OrderPatch, OrderStatus, ServiceOrder};
pub use stats::{DashboardStats, StatusCounts};
