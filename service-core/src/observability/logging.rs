use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, runtime, trace as sdktrace};
use tracing::Subscriber;
use tracing_subscriber::{
    EnvFilter, Layer, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt,
};

/// `RUST_LOG` takes precedence over `log_level`.
fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
}

fn json_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .json()
        .flatten_event(true)
}

/// JSON logs only.
fn local_subscriber(filter: EnvFilter) -> impl Subscriber + Send + Sync + 'static {
    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer())
}

/// JSON logs plus span export through `tracer`.
fn otlp_subscriber(
    filter: EnvFilter,
    tracer: sdktrace::Tracer,
) -> impl Subscriber + Send + Sync + 'static {
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .with(json_layer())
}

/// Install the global subscriber: env filter, JSON logs and, when an
/// endpoint is given, OTLP span export.
pub fn init_tracing(service_name: &str, log_level: &str, otlp_endpoint: Option<&str>) {
    let Some(endpoint) = otlp_endpoint else {
        local_subscriber(env_filter(log_level)).init();
        return;
    };

    let otlp_exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint);

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(otlp_exporter)
        .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
            KeyValue::new("service.name", service_name.to_string()),
        ])))
        .install_batch(runtime::Tokio);

    match tracer {
        Ok(tracer) => otlp_subscriber(env_filter(log_level), tracer).init(),
        Err(e) => {
            // Fall back to local logs rather than refusing to start.
            local_subscriber(env_filter(log_level)).init();
            tracing::warn!(
                service = service_name,
                otlp_endpoint = endpoint,
                error = %e,
                "Failed to initialize OTLP tracer, exporting logs only"
            );
        }
    }
}
