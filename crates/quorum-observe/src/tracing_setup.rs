//! Tracing initialisation for the Quorum server.
//!
//! Installs a structured `fmt` subscriber filtered by `RUST_LOG`, falling
//! back to the directives the caller derives from its verbosity flags.
//! When OpenTelemetry export is enabled, spans are bridged through a stdout
//! exporter (local development; a real deployment swaps in OTLP). The
//! returned guard owns the exporter pipeline and flushes it on drop, so the
//! binary keeps the guard alive for the life of the process.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub type InitError = Box<dyn std::error::Error + Send + Sync>;

/// Keeps the OTel pipeline alive; dropping it flushes buffered spans.
///
/// When OTel export is disabled the guard is inert.
pub struct TracingGuard {
    provider: Option<SdkTracerProvider>,
}

impl Drop for TracingGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(err) = provider.shutdown() {
                eprintln!("warning: failed to flush OTel spans on shutdown: {err}");
            }
        }
    }
}

/// Install the global subscriber.
///
/// `default_filter` is used only when `RUST_LOG` is unset, so operators can
/// always override the server's verbosity flags from the environment.
///
/// # Errors
///
/// Fails if a global subscriber was already installed.
pub fn init_tracing(default_filter: &str, enable_otel: bool) -> Result<TracingGuard, InitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    let registry = tracing_subscriber::registry().with(env_filter).with(fmt_layer);

    if enable_otel {
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build();
        let tracer = provider.tracer("quorum-server");
        registry
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .try_init()?;
        opentelemetry::global::set_tracer_provider(provider.clone());
        Ok(TracingGuard {
            provider: Some(provider),
        })
    } else {
        registry.try_init()?;
        Ok(TracingGuard { provider: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inert_guard_drops_without_side_effects() {
        let guard = TracingGuard { provider: None };
        drop(guard);
    }

    #[test]
    fn double_init_reports_an_error() {
        let first = init_tracing("info", false);
        assert!(first.is_ok());
        // A second install must fail rather than panic.
        assert!(init_tracing("info", false).is_err());
    }
}
