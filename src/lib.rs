//! # chat-ocr
//!
//! Resilient text extraction for chat screenshots. Ordered recognition
//! providers are tried under per-attempt timeouts; the first meaningful,
//! confident result is cleaned and returned, otherwise the best effort or a
//! synthetic notice. A run always yields text.

pub mod attempt;
pub mod config;
pub mod errors;
pub mod fallback_text;
pub mod image_input;
pub mod observability;
pub mod observability_config;
pub mod ocr_config;
pub mod ocr_errors;
pub mod pipeline;
pub mod providers;
pub mod text_cleaner;
pub mod validation;

// Re-export types for easier access
pub use attempt::{ExtractionAttempt, RawRecognition};
pub use image_input::ImageInput;
pub use ocr_config::PipelineConfig;
pub use ocr_errors::ProviderError;
pub use pipeline::{
    extract_text, run_pipeline, run_pipeline_detailed, run_pipeline_with_registry,
    PipelineOutcome, PipelineReport, TextExtractor,
};
pub use providers::{OcrProvider, ProviderRegistry};
pub use text_cleaner::clean_text;
pub use validation::is_meaningful;
