//! order-service: service order ledger for the workshop suite.
//!
//! Keeps each service order's line items, totals and status consistent
//! regardless of the storage backend behind [`services::OrderStore`].

pub mod config;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod models;
pub mod services;
pub mod startup;

pub use startup::{build_router, AppState};
