//! HTTP handlers for order-service.

pub mod context;
pub mod dashboard;
pub mod orders;

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};

use service_core::retry::retry_with_backoff;

use crate::error::OrderResult;
use crate::services::metrics::RETRIES_TOTAL;
use crate::startup::AppState;

/// Re-run the whole operation on concurrency conflicts and store outages.
///
/// Each attempt calls `f` afresh, so the service re-reads the order and its
/// current revision.
pub(crate) async fn retrying<T, F, Fut>(
    state: &AppState,
    operation: &'static str,
    f: F,
) -> OrderResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = OrderResult<T>>,
{
    let attempts = AtomicU32::new(0);

    retry_with_backoff(&state.retry, operation, || {
        if attempts.fetch_add(1, Ordering::Relaxed) > 0 {
            RETRIES_TOTAL.with_label_values(&[operation]).inc();
        }
        f()
    })
    .await
}
