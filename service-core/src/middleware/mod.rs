//! HTTP middleware shared by the service routers.

pub mod metrics;
pub mod tracing;

pub use self::metrics::{install_http_metrics, metrics_middleware, render_http_metrics};
pub use self::tracing::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
