//! Telemetry setup for tracing and logging.

use std::io::IsTerminal;

use anyhow::Result;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Environment variable for service name (not exported by opentelemetry_sdk).
const OTEL_SERVICE_NAME: &str = "OTEL_SERVICE_NAME";

const DEFAULT_SERVICE_NAME: &str = "kubectl-resize-pod";

/// Guard that flushes and shuts down OpenTelemetry export on drop.
pub struct TelemetryGuard {
	tracer_provider: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
	fn drop(&mut self) {
		if let Some(provider) = self.tracer_provider.take() {
			if let Err(e) = provider.shutdown() {
				eprintln!("Failed to shutdown tracer provider: {e}");
			}
		}
	}
}

fn otel_export_enabled() -> bool {
	std::env::var(opentelemetry_otlp::OTEL_EXPORTER_OTLP_ENDPOINT).is_ok()
		|| std::env::var(opentelemetry_otlp::OTEL_EXPORTER_OTLP_TRACES_ENDPOINT).is_ok()
}

/// Initialize tracing.
///
/// The `--log-level` flag wins over `RUST_LOG`; without either, only warnings
/// and errors are shown so a successful resize stays quiet. Logs go to stderr,
/// pretty-printed on a terminal and as JSON otherwise. Spans are exported over
/// OTLP when `OTEL_EXPORTER_OTLP_ENDPOINT` or
/// `OTEL_EXPORTER_OTLP_TRACES_ENDPOINT` is set.
pub fn init(log_level: Option<Level>) -> Result<TelemetryGuard> {
	let filter_layer = match log_level {
		Some(level) => EnvFilter::new(level.as_str()),
		None => EnvFilter::builder()
			.with_default_directive(Level::WARN.into())
			.from_env_lossy(),
	};

	let fmt_layer = if std::io::stderr().is_terminal() {
		tracing_subscriber::fmt::layer()
			.with_writer(std::io::stderr)
			.pretty()
			.boxed()
	} else {
		tracing_subscriber::fmt::layer()
			.with_writer(std::io::stderr)
			.json()
			.boxed()
	};

	if !otel_export_enabled() {
		tracing_subscriber::registry()
			.with(filter_layer)
			.with(fmt_layer)
			.init();
		return Ok(TelemetryGuard {
			tracer_provider: None,
		});
	}

	let tracer_provider = build_tracer_provider()?;
	let otel_layer = tracing_opentelemetry::layer()
		.with_error_records_to_exceptions(true)
		.with_tracer(tracer_provider.tracer(DEFAULT_SERVICE_NAME));
	opentelemetry::global::set_tracer_provider(tracer_provider.clone());

	tracing_subscriber::registry()
		.with(filter_layer)
		.with(fmt_layer)
		.with(otel_layer)
		.init();

	Ok(TelemetryGuard {
		tracer_provider: Some(tracer_provider),
	})
}

fn build_tracer_provider() -> Result<SdkTracerProvider> {
	use opentelemetry_sdk::Resource;

	// Resource::builder() already reads OTEL_SERVICE_NAME and OTEL_RESOURCE_ATTRIBUTES
	let mut resource_builder = Resource::builder();
	if std::env::var(OTEL_SERVICE_NAME).is_err() {
		resource_builder = resource_builder.with_service_name(DEFAULT_SERVICE_NAME);
	}

	let exporter = match std::env::var(opentelemetry_otlp::OTEL_EXPORTER_OTLP_PROTOCOL)
		.as_deref()
		.unwrap_or(opentelemetry_otlp::OTEL_EXPORTER_OTLP_PROTOCOL_DEFAULT)
	{
		"grpc" => opentelemetry_otlp::SpanExporter::builder()
			.with_tonic()
			.build()?,
		_ => opentelemetry_otlp::SpanExporter::builder()
			.with_http()
			.build()?,
	};

	Ok(SdkTracerProvider::builder()
		.with_resource(resource_builder.build())
		.with_batch_exporter(exporter)
		.build())
}
