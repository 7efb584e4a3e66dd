use opentelemetry::trace::TracerProvider as _;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global subscriber, optionally exporting spans to stdout
pub fn init_tracing(otel_stdout: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false));

    if otel_stdout {
        let provider = opentelemetry_sdk::trace::TracerProvider::builder()
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build();
        let tracer = provider.tracer("sprout");
        // the sdk tracer only holds a weak reference to its provider
        let _ = opentelemetry::global::set_tracer_provider(provider);
        registry
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .init();
    } else {
        registry.init();
    }
}
