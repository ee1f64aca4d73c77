//! # Extraction Pipeline
//!
//! Runs the ordered providers against one image and decides which result to
//! return. The run never fails: it ends with an accepted attempt, the best
//! low-confidence attempt, or synthetic text from the fallback generator.
//!
//! ## Flow
//!
//! 1. Each enabled provider, primary first, runs on its own task raced
//!    against the per-attempt timeout. A timed-out call is cancelled and
//!    aborted, never awaited.
//! 2. An attempt is accepted early when its confidence meets the threshold
//!    and its *raw* text passes the meaningfulness gate. The text is cleaned
//!    only after acceptance.
//! 3. With budget left after one pass, providers that failed transiently
//!    (transport error, timeout, 429/5xx) are retried once each. The
//!    exponential backoff before a retry is spent inside that retry's own
//!    timeout slot, so a run never outlasts `max_attempts` slots.
//! 4. On exhaustion the best attempt by confidence is cleaned and returned
//!    with its confidence raised to [`LOW_CONFIDENCE_FLOOR`]; the earliest
//!    attempt wins ties. Without usable text the fallback generator runs.
//!
//! Registry and configuration are read-only; the attempt history belongs to
//! the run, so concurrent runs on different images share nothing mutable.

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use crate::attempt::ExtractionAttempt;
use crate::config::AppConfig;
use crate::errors::{error_logging, AppResult};
use crate::fallback_text::generate_fallback_text;
use crate::image_input::ImageInput;
use crate::observability;
use crate::ocr_config::{PipelineConfig, FALLBACK_CONFIDENCE, LOW_CONFIDENCE_FLOOR};
use crate::ocr_errors::ProviderError;
use crate::providers::{build_http_client, OcrProvider, ProviderRegistry};
use crate::text_cleaner::TextCleaner;
use crate::validation::assess_text;

/// Error recorded on an attempt that exceeded the per-attempt timeout
pub const TIMED_OUT: &str = "timed out";

/// Time a timed-out provider gets to observe its cancellation token before
/// its task is aborted
pub const CANCEL_GRACE: Duration = Duration::from_secs(1);

/// How a pipeline run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// An attempt met the threshold and passed the gate
    Accepted,
    /// Budget exhausted; best real attempt returned at reduced confidence
    LowConfidence,
    /// No usable text; fallback generator output returned
    Synthetic,
}

impl PipelineOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineOutcome::Accepted => "accepted",
            PipelineOutcome::LowConfidence => "low_confidence",
            PipelineOutcome::Synthetic => "synthetic",
        }
    }
}

/// Final result plus the full attempt history of one run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    pub result: ExtractionAttempt,
    /// Every provider attempt in invocation order, raw text as recognized
    pub attempts: Vec<ExtractionAttempt>,
    pub outcome: PipelineOutcome,
}

/// Provider registry bound to a pipeline configuration
#[derive(Debug, Clone)]
pub struct TextExtractor {
    registry: ProviderRegistry,
    config: PipelineConfig,
}

impl TextExtractor {
    pub fn new(registry: ProviderRegistry, config: PipelineConfig) -> Self {
        Self { registry, config }
    }

    /// Build the registry and pipeline settings from application configuration
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP client or a local engine cannot be
    /// created, or when the resulting pipeline configuration is invalid.
    pub fn from_app_config(app_config: &AppConfig) -> AppResult<Self> {
        let client = build_http_client(&app_config.http)?;
        let registry = ProviderRegistry::from_config(&app_config.providers, client)?;
        let config = app_config.pipeline_for(registry.len());
        config.validate()?;
        Ok(Self::new(registry, config))
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline and return only the final attempt
    pub async fn run(&self, image: &ImageInput) -> ExtractionAttempt {
        self.run_detailed(image).await.result
    }

    /// Run the pipeline and return the full report
    pub async fn run_detailed(&self, image: &ImageInput) -> PipelineReport {
        run_pipeline_detailed(image, &self.registry, &self.config).await
    }

    /// Run the pipeline and return only the final text
    pub async fn extract_text(&self, image: &ImageInput) -> String {
        self.run(image).await.text
    }
}

static DEFAULT_EXTRACTOR: OnceLock<TextExtractor> = OnceLock::new();

/// Process-wide extractor built from environment configuration on first use
pub fn default_extractor() -> &'static TextExtractor {
    DEFAULT_EXTRACTOR.get_or_init(|| {
        let built = AppConfig::from_env()
            .and_then(|config| config.validate().map(|()| config))
            .and_then(|config| TextExtractor::from_app_config(&config));
        match built {
            Ok(extractor) => extractor,
            Err(e) => {
                error_logging::log_config_error(&e, "environment", "default_extractor");
                TextExtractor::new(ProviderRegistry::empty(), PipelineConfig::for_provider_count(0))
            }
        }
    })
}

/// Extract text with the default extractor.
///
/// Returns an empty string only if the run itself panicked.
pub async fn extract_text(image: &ImageInput) -> String {
    let image = image.clone();
    match tokio::spawn(async move { default_extractor().extract_text(&image).await }).await {
        Ok(text) => text,
        Err(e) => {
            error!(error = %e, "Extraction pipeline aborted");
            String::new()
        }
    }
}

/// Run the pipeline with the default providers.
///
/// Without a configuration the default extractor's settings apply, whose
/// budget is sized for the enabled providers.
pub async fn run_pipeline(
    image: &ImageInput,
    config: Option<&PipelineConfig>,
) -> ExtractionAttempt {
    let extractor = default_extractor();
    let config = config.unwrap_or_else(|| extractor.config());
    run_pipeline_detailed(image, extractor.registry(), config).await.result
}

/// Run the pipeline against an explicit registry.
///
/// Without a configuration the defaults are sized for `registry`: one attempt
/// per provider plus a retry allowance.
pub async fn run_pipeline_with_registry(
    image: &ImageInput,
    registry: &ProviderRegistry,
    config: Option<&PipelineConfig>,
) -> ExtractionAttempt {
    match config {
        Some(config) => run_pipeline_detailed(image, registry, config).await.result,
        None => {
            let config = PipelineConfig::for_provider_count(registry.len());
            run_pipeline_detailed(image, registry, &config).await.result
        }
    }
}

/// Run the pipeline and keep the attempt history
pub async fn run_pipeline_detailed(
    image: &ImageInput,
    registry: &ProviderRegistry,
    config: &PipelineConfig,
) -> PipelineReport {
    let span = observability::pipeline_span(image.kind());
    async move {
        let run_start = Instant::now();
        let report = execute(image, registry, config).await;

        observability::record_pipeline_outcome(
            report.outcome.as_str(),
            report.attempts.len(),
            run_start.elapsed(),
        );
        info!(
            outcome = report.outcome.as_str(),
            source_id = %report.result.source_id,
            confidence = report.result.confidence,
            attempts = report.attempts.len(),
            elapsed_ms = run_start.elapsed().as_millis(),
            "Extraction finished"
        );
        report
    }
    .instrument(span)
    .await
}

async fn execute(
    image: &ImageInput,
    registry: &ProviderRegistry,
    config: &PipelineConfig,
) -> PipelineReport {
    let run_start = Instant::now();
    let cleaner = TextCleaner::with_config(config.cleaner.clone());
    let budget = usize::try_from(config.max_attempts).unwrap_or(usize::MAX);
    let mut attempts: Vec<ExtractionAttempt> = Vec::new();
    let mut retry_candidates: Vec<usize> = Vec::new();

    // First pass: every provider once, in priority order
    for (index, provider) in registry.iter().enumerate() {
        if attempts.len() >= budget {
            debug!(budget, "Attempt budget exhausted during first pass");
            break;
        }
        let (attempt, retryable) = run_attempt(
            provider,
            image,
            config.attempt_timeout(),
            attempts.len() + 1,
        )
        .await;
        if let Some(result) = accept(&attempt, config, &cleaner) {
            attempts.push(attempt);
            return PipelineReport {
                result,
                attempts,
                outcome: PipelineOutcome::Accepted,
            };
        }
        if retryable {
            retry_candidates.push(index);
        }
        attempts.push(attempt);
    }

    // Retry pass: transient failures only, each retried once
    for (retry, index) in (1u32..).zip(retry_candidates) {
        if attempts.len() >= budget {
            break;
        }
        let Some(provider) = registry.get(index) else {
            continue;
        };
        // The backoff is charged to this attempt's slot
        let slot = config.attempt_timeout();
        let delay = Duration::from_millis(calculate_retry_delay(retry, config)).min(slot / 2);
        info!(
            provider = provider.id(),
            delay_ms = delay.as_millis(),
            "Retrying provider after transient failure"
        );
        tokio::time::sleep(delay).await;

        let (attempt, _) = run_attempt(provider, image, slot - delay, attempts.len() + 1).await;
        if let Some(result) = accept(&attempt, config, &cleaner) {
            attempts.push(attempt);
            return PipelineReport {
                result,
                attempts,
                outcome: PipelineOutcome::Accepted,
            };
        }
        attempts.push(attempt);
    }

    if let Some(best) = select_best(&attempts) {
        let text = cleaner.clean(&best.text);
        if !text.is_empty() {
            warn!(
                source_id = %best.source_id,
                confidence = best.confidence,
                threshold = config.confidence_threshold,
                "No attempt met the threshold, returning best effort"
            );
            let result = ExtractionAttempt {
                text,
                confidence: best.confidence.max(LOW_CONFIDENCE_FLOOR),
                error: None,
                ..best.clone()
            };
            return PipelineReport {
                result,
                attempts,
                outcome: PipelineOutcome::LowConfidence,
            };
        }
        debug!(source_id = %best.source_id, "Best attempt cleaned to nothing");
    }

    warn!(
        attempts = attempts.len(),
        "No provider produced usable text, generating fallback notice"
    );
    let text = generate_fallback_text(&image.describe().await);
    PipelineReport {
        result: ExtractionAttempt::synthetic(text, FALLBACK_CONFIDENCE, run_start.elapsed()),
        attempts,
        outcome: PipelineOutcome::Synthetic,
    }
}

/// Clean and return the attempt when it clears the threshold and the gate
fn accept(
    attempt: &ExtractionAttempt,
    config: &PipelineConfig,
    cleaner: &TextCleaner,
) -> Option<ExtractionAttempt> {
    if attempt.is_failure() {
        return None;
    }
    let assessment = assess_text(&attempt.text);
    if attempt.confidence >= config.confidence_threshold && assessment.is_meaningful() {
        info!(
            source_id = %attempt.source_id,
            confidence = attempt.confidence,
            "Attempt accepted"
        );
        return Some(ExtractionAttempt {
            text: cleaner.clean(&attempt.text),
            ..attempt.clone()
        });
    }

    warn!(
        source_id = %attempt.source_id,
        confidence = attempt.confidence,
        threshold = config.confidence_threshold,
        rejection = ?assessment.rejection,
        "Attempt not accepted"
    );
    None
}

/// Highest-confidence attempt carrying text; the earliest wins ties
pub fn select_best(attempts: &[ExtractionAttempt]) -> Option<&ExtractionAttempt> {
    attempts
        .iter()
        .filter(|a| a.has_text())
        .fold(None, |best: Option<&ExtractionAttempt>, candidate| match best {
            Some(current) if candidate.confidence <= current.confidence => Some(current),
            _ => Some(candidate),
        })
}

/// Invoke one provider on its own task, bounded by `timeout`.
///
/// On timeout the provider's token is cancelled and the task is left to wind
/// down; it is aborted after [`CANCEL_GRACE`] without the run waiting for it.
/// Returns the recorded attempt and whether the failure is worth a retry.
async fn run_attempt(
    provider: &Arc<dyn OcrProvider>,
    image: &ImageInput,
    timeout: Duration,
    attempt_number: usize,
) -> (ExtractionAttempt, bool) {
    let provider_id = provider.id().to_string();
    let attempt_no = u32::try_from(attempt_number).unwrap_or(u32::MAX);
    let span = observability::attempt_span(&provider_id, attempt_no);
    let started_at = Utc::now();
    let start = Instant::now();
    let cancel = CancellationToken::new();

    let task = {
        let provider = Arc::clone(provider);
        let image = image.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { provider.recognize(&image, &cancel).await }.instrument(span))
    };
    let abort = task.abort_handle();

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => {
            let elapsed = start.elapsed();
            let retryable = result.as_ref().is_err_and(ProviderError::is_transient);
            match &result {
                Ok(_) => observability::record_attempt_metrics(&provider_id, "completed", elapsed),
                Err(e) => {
                    observability::record_attempt_metrics(&provider_id, "failed", elapsed);
                    error_logging::log_provider_error(
                        e,
                        &provider_id,
                        attempt_no,
                        None,
                        Some(elapsed),
                    );
                }
            }
            (
                ExtractionAttempt::from_result(&provider_id, &result, elapsed, started_at),
                retryable,
            )
        }
        Ok(Err(join_error)) => {
            let elapsed = start.elapsed();
            observability::record_attempt_metrics(&provider_id, "failed", elapsed);
            error!(provider = %provider_id, error = %join_error, "Provider task panicked");
            (
                ExtractionAttempt::failure(
                    &provider_id,
                    format!("provider task failed: {join_error}"),
                    elapsed,
                    started_at,
                ),
                false,
            )
        }
        Err(_) => {
            cancel.cancel();
            tokio::spawn(async move {
                tokio::time::sleep(CANCEL_GRACE).await;
                abort.abort();
            });
            let elapsed = start.elapsed();
            observability::record_attempt_metrics(&provider_id, "timed_out", elapsed);
            warn!(
                provider = %provider_id,
                timeout_ms = timeout.as_millis(),
                "Provider attempt timed out"
            );
            (
                ExtractionAttempt::failure(&provider_id, TIMED_OUT, elapsed, started_at),
                true,
            )
        }
    }
}

/// Delay before the `retry`-th retry (1-based), in milliseconds.
///
/// `base · 2^(retry-1)`, capped at the configured maximum, plus up to 25%
/// random jitter.
///
/// # Examples
/// ```
/// use chat_ocr::ocr_config::PipelineConfig;
/// use chat_ocr::pipeline::calculate_retry_delay;
///
/// let config = PipelineConfig::default();
/// let first = calculate_retry_delay(1, &config);
/// assert!((250..=312).contains(&first));
/// ```
pub fn calculate_retry_delay(retry: u32, config: &PipelineConfig) -> u64 {
    let exponent = retry.saturating_sub(1).min(32);
    let delay = config
        .base_retry_delay_ms
        .saturating_mul(1u64 << exponent)
        .min(config.max_retry_delay_ms);

    let jitter_range = delay / 4;
    let jitter = if jitter_range == 0 {
        0
    } else {
        rand::random::<u64>() % jitter_range
    };
    delay + jitter
}
