use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

/// Handle to the process-wide recorder behind the `metrics` facade.
static HTTP_METRICS: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the Prometheus recorder for [`metrics_middleware`].
///
/// Safe to call more than once. Returns `false` when another recorder was
/// already installed, in which case HTTP metrics are not rendered here.
pub fn install_http_metrics() -> bool {
    HTTP_METRICS
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install Prometheus recorder");
                None
            }
        })
        .is_some()
}

/// HTTP request metrics in Prometheus text format, empty before
/// [`install_http_metrics`].
pub fn render_http_metrics() -> String {
    HTTP_METRICS
        .get()
        .and_then(|handle| handle.as_ref())
        .map(|handle| handle.render())
        .unwrap_or_default()
}

/// Record request count and latency labelled by method, route template and status.
///
/// The route template (`/orders/:order_id`) is used instead of the raw path so
/// ids do not explode label cardinality.
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    let duration = start.elapsed();
    let status = response.status().as_u16().to_string();

    let labels = [("method", method), ("path", path), ("status", status)];

    counter!("http_requests_total", &labels).increment(1);
    histogram!("http_request_duration_seconds", &labels).record(duration.as_secs_f64());

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, middleware::from_fn, routing::get};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_requests_are_counted_by_route_template() {
        assert!(install_http_metrics());
        assert!(install_http_metrics());

        let router = Router::new()
            .route("/orders/:order_id", get(|| async { "ok" }))
            .layer(from_fn(metrics_middleware));

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/orders/42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let rendered = render_http_metrics();
        assert!(rendered.contains("http_requests_total"));
        assert!(rendered.contains("path=\"/orders/:order_id\""));
        assert!(!rendered.contains("/orders/42"));
    }
}
