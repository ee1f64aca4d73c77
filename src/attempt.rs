//! The extraction attempt record: the unit of work and of pipeline history.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ocr_config::{clamp_confidence, FALLBACK_SOURCE_ID};
use crate::ocr_errors::ProviderError;

/// Normalized text returned by a provider before it becomes an attempt
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecognition {
    pub text: String,
    pub confidence: f32,
}

impl RawRecognition {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// One provider (or generator) invocation and its outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionAttempt {
    /// Recognized text, possibly empty
    pub text: String,
    /// Quality estimate in `[0, 1]`
    pub confidence: f32,
    /// Provider id, or `fallback-generator` for synthetic text
    pub source_id: String,
    /// Wall time spent on the attempt
    pub elapsed_ms: u64,
    /// Set when the provider call itself failed
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl ExtractionAttempt {
    /// A completed provider call
    pub fn success(
        source_id: impl Into<String>,
        text: impl Into<String>,
        confidence: f32,
        elapsed: Duration,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            text: text.into(),
            confidence: clamp_confidence(confidence),
            source_id: source_id.into(),
            elapsed_ms: duration_ms(elapsed),
            error: None,
            started_at,
        }
    }

    /// A failed provider call; text and confidence are zeroed
    pub fn failure(
        source_id: impl Into<String>,
        error: impl Into<String>,
        elapsed: Duration,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            source_id: source_id.into(),
            elapsed_ms: duration_ms(elapsed),
            error: Some(error.into()),
            started_at,
        }
    }

    /// Synthetic text from the fallback generator
    pub fn synthetic(text: impl Into<String>, confidence: f32, elapsed: Duration) -> Self {
        Self {
            text: text.into(),
            confidence: clamp_confidence(confidence),
            source_id: FALLBACK_SOURCE_ID.to_string(),
            elapsed_ms: duration_ms(elapsed),
            error: None,
            started_at: Utc::now(),
        }
    }

    /// Fold a provider result into an attempt
    pub fn from_result(
        source_id: &str,
        result: &Result<RawRecognition, ProviderError>,
        elapsed: Duration,
        started_at: DateTime<Utc>,
    ) -> Self {
        match result {
            Ok(raw) => {
                Self::success(source_id, raw.text.clone(), raw.confidence, elapsed, started_at)
            }
            Err(e) => Self::failure(source_id, e.to_string(), elapsed, started_at),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_synthetic(&self) -> bool {
        self.source_id == FALLBACK_SOURCE_ID
    }

    /// Whether the attempt carries any non-whitespace text
    pub fn has_text(&self) -> bool {
        !self.is_failure() && !self.text.trim().is_empty()
    }
}

fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
