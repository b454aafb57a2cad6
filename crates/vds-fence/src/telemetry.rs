//! # Telemetry
//!
//! Console logging is always installed. OpenTelemetry export sits on top of
//! it and is chosen at compile time:
//!
//! - `tracing`: fence spans and part events are exported as traces.
//! - `metrics`: the fence instruments below are recorded and exported.
//! - `stdout`: the exporter used for whichever of the two is enabled.
//!
//! Events emitted outside a span only reach the console.
//!
//! ## Instruments
//!
//! | name | kind | unit |
//! |---|---|---|
//! | `fences` | counter | |
//! | `fence_errors` | counter, labelled by error `kind` | |
//! | `parts_dispatched` | counter | |
//! | `fence_duration` | histogram | ms |
//! | `traces_per_fence` | histogram | |
//!
//! The `record_*` and `increment_*` helpers are no-ops until
//! [`init_telemetry`] has run, and always are without `metrics`.
//!
//! ```bash
//! cargo run --features tracing,metrics,stdout -- --query fence.json -o fence.f32
//! ```

#[cfg(all(feature = "stdout", not(any(feature = "tracing", feature = "metrics"))))]
compile_error!(
    "The 'stdout' feature requires at least one of 'tracing' or 'metrics' to be enabled."
);

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use vds_fence_core::Error;

#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry_semantic_conventions as semvcns;

#[cfg(feature = "tracing")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "tracing")]
use opentelemetry_sdk::{propagation::TraceContextPropagator, trace as sdktrace};

const SERVICE_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(feature = "stdout")]
const EXPORT_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);

/// Exporters that must be flushed before the process exits.
pub struct TelemetryProviders {
    #[cfg(feature = "tracing")]
    pub tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes pending spans and metrics and stops the exporters.
    ///
    /// Failures are reported on stderr because the subscriber may already be
    /// unable to deliver them.
    pub fn shutdown(self) {
        #[cfg(feature = "tracing")]
        {
            if let Err(err) = self.tracer_provider.shutdown() {
                eprintln!("failed to shut down tracer provider: {err}");
            }
        }

        #[cfg(feature = "metrics")]
        {
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("failed to shut down meter provider: {err}");
            }
        }
    }
}

/// Installs the global subscriber and, if enabled, the OpenTelemetry
/// providers.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    #[cfg(any(feature = "metrics", feature = "tracing"))]
    let (resource, scope) = (resource(), scope());

    // stderr keeps stdout free for the `stdout` exporters.
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .pretty(),
        );

    #[cfg(feature = "tracing")]
    let (registry, tracer_provider) = {
        opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());
        let provider = build_tracer_provider(resource.clone());
        opentelemetry::global::set_tracer_provider(provider.clone());

        let layer = tracing_opentelemetry::layer()
            .with_tracer(provider.tracer_with_scope(scope.clone()))
            .with_error_records_to_exceptions(true);
        (registry.with(layer), provider)
    };

    #[cfg(feature = "metrics")]
    let (registry, meter_provider) = {
        let provider = build_meter_provider(resource);
        opentelemetry::global::set_meter_provider(provider.clone());
        FenceMetrics::install(&opentelemetry::global::meter_with_scope(scope));

        let layer = tracing_opentelemetry::MetricsLayer::new(provider.clone());
        (registry.with(layer), provider)
    };

    registry.try_init()?;

    Ok(TelemetryProviders {
        #[cfg(feature = "tracing")]
        tracer_provider,
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

#[cfg(any(feature = "metrics", feature = "tracing"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name(SERVICE_NAME)
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(any(feature = "metrics", feature = "tracing"))]
fn scope() -> InstrumentationScope {
    InstrumentationScope::builder(SERVICE_NAME)
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build()
}

#[cfg(feature = "tracing")]
fn build_tracer_provider(resource: Resource) -> sdktrace::SdkTracerProvider {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource);

    #[cfg(feature = "stdout")]
    let builder = builder.with_span_processor(
        sdktrace::BatchSpanProcessor::builder(opentelemetry_stdout::SpanExporter::default())
            .with_batch_config(
                sdktrace::BatchConfigBuilder::default()
                    .with_scheduled_delay(EXPORT_INTERVAL)
                    .build(),
            )
            .build(),
    );

    builder.build()
}

#[cfg(feature = "metrics")]
fn build_meter_provider(resource: Resource) -> sdkmetrics::SdkMeterProvider {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource);

    #[cfg(feature = "stdout")]
    let builder = builder.with_reader(
        sdkmetrics::PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default())
            .with_interval(EXPORT_INTERVAL)
            .build(),
    );

    builder.build()
}

#[cfg(feature = "metrics")]
static METRICS: OnceLock<FenceMetrics> = OnceLock::new();

#[cfg(feature = "metrics")]
struct FenceMetrics {
    fences: Counter<u64>,
    fence_errors: Counter<u64>,
    parts_dispatched: Counter<u64>,
    fence_duration_ms: Histogram<f64>,
    traces_per_fence: Histogram<f64>,
}

#[cfg(feature = "metrics")]
impl FenceMetrics {
    fn install(meter: &Meter) {
        let _ = METRICS.set(Self {
            fences: meter
                .u64_counter("fences")
                .with_description("Fence requests scheduled")
                .build(),
            fence_errors: meter
                .u64_counter("fence_errors")
                .with_description("Fence requests that failed, by error kind")
                .build(),
            parts_dispatched: meter
                .u64_counter("parts_dispatched")
                .with_description("Sub-requests sent to workers")
                .build(),
            fence_duration_ms: meter
                .f64_histogram("fence_duration")
                .with_unit("ms")
                .with_description("Time from dispatch to a complete buffer")
                .build(),
            traces_per_fence: meter
                .f64_histogram("traces_per_fence")
                .with_description("Coordinates requested per fence")
                .build(),
        });
    }

    fn with(f: impl FnOnce(&Self)) {
        if let Some(metrics) = METRICS.get() {
            f(metrics);
        }
    }
}

#[cfg(feature = "metrics")]
pub fn increment_fences() {
    FenceMetrics::with(|m| m.fences.add(1, &[]));
}

#[cfg(not(feature = "metrics"))]
pub fn increment_fences() {}

#[cfg(feature = "metrics")]
pub fn increment_fence_errors(error: &Error) {
    FenceMetrics::with(|m| {
        m.fence_errors
            .add(1, &[KeyValue::new("kind", error.kind())]);
    });
}

#[cfg(not(feature = "metrics"))]
pub fn increment_fence_errors(_error: &Error) {}

#[cfg(feature = "metrics")]
pub fn increment_parts_dispatched(count: u64) {
    FenceMetrics::with(|m| m.parts_dispatched.add(count, &[]));
}

#[cfg(not(feature = "metrics"))]
pub fn increment_parts_dispatched(_count: u64) {}

#[cfg(feature = "metrics")]
pub fn record_fence_duration(duration_ms: f64) {
    FenceMetrics::with(|m| m.fence_duration_ms.record(duration_ms, &[]));
}

#[cfg(not(feature = "metrics"))]
pub fn record_fence_duration(_duration_ms: f64) {}

#[cfg(feature = "metrics")]
pub fn record_traces_per_fence(count: f64) {
    FenceMetrics::with(|m| m.traces_per_fence.record(count, &[]));
}

#[cfg(not(feature = "metrics"))]
pub fn record_traces_per_fence(_count: f64) {}
