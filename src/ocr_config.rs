//! # Pipeline Configuration Module
//!
//! This module defines the per-invocation configuration of the extraction
//! pipeline: attempt budget, acceptance threshold, per-attempt timeout,
//! retry backoff and the cleaner toggles.

use crate::errors::{AppError, AppResult};

// Constants for pipeline configuration
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.3;
pub const DEFAULT_PER_ATTEMPT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_BASE_RETRY_DELAY_MS: u64 = 250;
pub const DEFAULT_MAX_RETRY_DELAY_MS: u64 = 2_000;

/// Confidence given to a best-effort result that did not meet the threshold.
///
/// Downstream code compares against this value to tell a low-confidence accept
/// from a real transcription.
pub const LOW_CONFIDENCE_FLOOR: f32 = 0.1;

/// Confidence attached to synthetic text from the fallback generator
pub const FALLBACK_CONFIDENCE: f32 = 0.05;

/// Source id stamped on synthetic results
pub const FALLBACK_SOURCE_ID: &str = "fallback-generator";

/// Toggles for the text cleaner
#[derive(Debug, Clone, PartialEq)]
pub struct CleanerConfig {
    /// Lowercase mostly-uppercase tokens with stray lowercase letters.
    ///
    /// Also rewrites some intended camel case and brand names (e.g. "iPHONE").
    pub normalize_caps_noise: bool,
    /// Apply the digit-for-letter substitution table inside words
    pub fix_digit_confusions: bool,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            normalize_caps_noise: true,
            fix_digit_confusions: true,
        }
    }
}

/// Configuration for a single pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Total attempts across all providers, retries included
    pub max_attempts: u32,
    /// Minimum confidence to accept an attempt outright
    pub confidence_threshold: f32,
    /// Timeout for each provider call in milliseconds
    pub per_attempt_timeout_ms: u64,
    /// Base delay before a retry attempt in milliseconds
    pub base_retry_delay_ms: u64,
    /// Maximum delay before a retry attempt in milliseconds
    pub max_retry_delay_ms: u64,
    /// Text cleaner behaviour
    pub cleaner: CleanerConfig,
}

/// Defaults sized for a single provider; see [`PipelineConfig::for_provider_count`]
impl Default for PipelineConfig {
    fn default() -> Self {
        Self::for_provider_count(1)
    }
}

impl PipelineConfig {
    /// Default configuration sized for a registry of `provider_count` providers.
    ///
    /// The budget is one attempt per provider plus a single retry allowance.
    pub fn for_provider_count(provider_count: usize) -> Self {
        let providers = u32::try_from(provider_count).unwrap_or(u32::MAX - 1);
        Self {
            max_attempts: providers.saturating_add(1).max(1),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            per_attempt_timeout_ms: DEFAULT_PER_ATTEMPT_TIMEOUT_MS,
            base_retry_delay_ms: DEFAULT_BASE_RETRY_DELAY_MS,
            max_retry_delay_ms: DEFAULT_MAX_RETRY_DELAY_MS,
            cleaner: CleanerConfig::default(),
        }
    }

    /// Per-attempt timeout as a `Duration`
    pub fn attempt_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.per_attempt_timeout_ms)
    }

    /// Validate pipeline configuration parameters
    pub fn validate(&self) -> AppResult<()> {
        if self.max_attempts == 0 {
            return Err(AppError::Config(
                "max_attempts must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(AppError::Config(format!(
                "confidence_threshold ({}) must be within [0, 1]",
                self.confidence_threshold
            )));
        }
        if self.per_attempt_timeout_ms == 0 {
            return Err(AppError::Config(
                "per_attempt_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_retry_delay_ms < self.base_retry_delay_ms {
            return Err(AppError::Config(format!(
                "max_retry_delay_ms ({}) must be >= base_retry_delay_ms ({})",
                self.max_retry_delay_ms, self.base_retry_delay_ms
            )));
        }
        Ok(())
    }
}

/// Clamp a confidence value into `[0, 1]`, mapping NaN to 0
pub fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
