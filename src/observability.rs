//! Observability setup: structured logging and metrics.
//!
//! This module provides:
//! - `tracing` subscriber initialization (pretty in development, JSON otherwise)
//! - Prometheus recorder installation for `metrics` counters and histograms
//! - Span and metric helpers used by the extraction pipeline

use std::time::Duration;

use anyhow::Result;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::prelude::*;

use crate::observability_config::{LogFormat, ObservabilityConfig};

/// Initialize logging and, when enabled, the metrics recorder
pub fn init_observability_with_config(
    config: &ObservabilityConfig,
) -> Result<Option<PrometheusHandle>> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid observability configuration: {}", e))?;

    init_tracing_with_config(config)?;

    let handle = if config.enable_metrics_export {
        Some(init_metrics()?)
    } else {
        None
    };

    tracing::info!(
        environment = %config.environment,
        metrics_enabled = %config.enable_metrics_export,
        "Observability initialized"
    );
    Ok(handle)
}

/// Initialize structured logging with tracing and configuration
pub fn init_tracing_with_config(config: &ObservabilityConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("chat_ocr={}", config.log_level).parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("hyper=warn".parse()?);

    match config.effective_log_format() {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_thread_names(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
    }

    tracing::debug!(
        environment = %config.environment,
        log_level = %config.log_level,
        "Tracing initialized with structured logging"
    );
    Ok(())
}

/// Install the global Prometheus recorder
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    tracing::debug!("Metrics collection initialized");
    Ok(handle)
}

/// Span covering one pipeline run
pub fn pipeline_span(image_kind: &str) -> tracing::Span {
    tracing::info_span!("extraction_pipeline", image_kind = image_kind, component = "ocr")
}

/// Span covering one provider attempt
pub fn attempt_span(provider: &str, attempt: u32) -> tracing::Span {
    tracing::debug_span!("provider_attempt", provider = provider, attempt = attempt)
}

/// Record one provider attempt
pub fn record_attempt_metrics(provider: &str, outcome: &'static str, duration: Duration) {
    let provider = provider.to_string();
    metrics::counter!("ocr_attempts_total", "provider" => provider.clone(), "outcome" => outcome)
        .increment(1);
    metrics::histogram!("ocr_attempt_duration_seconds", "provider" => provider)
        .record(duration.as_secs_f64());
}

/// Record how a pipeline run ended
#[allow(clippy::cast_precision_loss)]
pub fn record_pipeline_outcome(outcome: &'static str, attempts: usize, duration: Duration) {
    metrics::counter!("ocr_pipeline_runs_total", "outcome" => outcome).increment(1);
    metrics::histogram!("ocr_pipeline_duration_seconds").record(duration.as_secs_f64());
    metrics::histogram!("ocr_pipeline_attempts").record(attempts as f64);
}
