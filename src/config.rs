//! # Unified Application Configuration
//!
//! All settings are resolved once at startup from environment variables
//! (the binary loads `.env` first with `dotenvy`). Each section validates
//! itself; [`AppConfig::validate`] runs them all.
//!
//! Loading goes through a lookup function so tests can feed a fixed map
//! instead of mutating the process environment.

use std::str::FromStr;

use crate::errors::{AppError, AppResult};
use crate::observability_config::ObservabilityConfig;
use crate::ocr_config::{CleanerConfig, PipelineConfig};

pub const DEFAULT_OCR_SPACE_ENDPOINT: &str = "https://api.ocr.space/parse/image";
pub const DEFAULT_GOOGLE_VISION_ENDPOINT: &str =
    "https://vision.googleapis.com/v1/images:annotate";
pub const DEFAULT_PROVIDER_ORDER: &[&str] = &["tesseract", "ocr_space", "google_vision"];

/// OCR.space settings
#[derive(Debug, Clone, PartialEq)]
pub struct OcrSpaceConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub endpoint: String,
    /// Three-letter language code understood by the service
    pub language: String,
    /// OCR engine number (1 or 2)
    pub engine: u8,
}

impl Default for OcrSpaceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            endpoint: DEFAULT_OCR_SPACE_ENDPOINT.to_string(),
            language: "eng".to_string(),
            engine: 2,
        }
    }
}

impl OcrSpaceConfig {
    /// Enabled and carrying a credential
    pub fn is_enabled(&self) -> bool {
        self.enabled && has_credential(self.api_key.as_deref())
    }

    pub fn validate(&self) -> AppResult<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        validate_endpoint("OCR_SPACE_ENDPOINT", &self.endpoint)?;
        if !matches!(self.engine, 1 | 2) {
            return Err(AppError::Config(format!(
                "OCR.space engine must be 1 or 2, got {}",
                self.engine
            )));
        }
        Ok(())
    }
}

/// Google Cloud Vision settings
#[derive(Debug, Clone, PartialEq)]
pub struct GoogleVisionConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub endpoint: String,
    /// BCP-47 hints passed as `imageContext.languageHints`
    pub language_hints: Vec<String>,
}

impl Default for GoogleVisionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            endpoint: DEFAULT_GOOGLE_VISION_ENDPOINT.to_string(),
            language_hints: Vec::new(),
        }
    }
}

impl GoogleVisionConfig {
    /// Enabled and carrying a credential
    pub fn is_enabled(&self) -> bool {
        self.enabled && has_credential(self.api_key.as_deref())
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.is_enabled() {
            validate_endpoint("GOOGLE_VISION_ENDPOINT", &self.endpoint)?;
        }
        Ok(())
    }
}

/// Local Tesseract settings (used only with the `tesseract` feature)
#[derive(Debug, Clone, PartialEq)]
pub struct TesseractConfig {
    pub enabled: bool,
    /// Tesseract language string, e.g. `eng` or `eng+fra`
    pub languages: String,
    /// Directory holding `*.traineddata`; system default when unset
    pub tessdata_path: Option<String>,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            languages: "eng".to_string(),
            tessdata_path: None,
        }
    }
}

impl TesseractConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.enabled && self.languages.trim().is_empty() {
            return Err(AppError::Config(
                "TESSERACT_LANGUAGES cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Provider order and per-provider settings
#[derive(Debug, Clone, PartialEq)]
pub struct ProvidersConfig {
    /// Provider ids, primary first
    pub order: Vec<String>,
    pub ocr_space: OcrSpaceConfig,
    pub google_vision: GoogleVisionConfig,
    pub tesseract: TesseractConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            order: DEFAULT_PROVIDER_ORDER.iter().map(|s| s.to_string()).collect(),
            ocr_space: OcrSpaceConfig::default(),
            google_vision: GoogleVisionConfig::default(),
            tesseract: TesseractConfig::default(),
        }
    }
}

impl ProvidersConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.order.is_empty() {
            return Err(AppError::Config(
                "PROVIDER_ORDER must name at least one provider".to_string(),
            ));
        }
        self.ocr_space.validate()?;
        self.google_vision.validate()?;
        self.tesseract.validate()?;
        Ok(())
    }
}

/// Shared HTTP client settings
#[derive(Debug, Clone, PartialEq)]
pub struct HttpConfig {
    /// Whole-request timeout in seconds; the per-attempt timeout is usually tighter
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            user_agent: format!("chat-ocr/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.timeout_secs == 0 {
            return Err(AppError::Config("HTTP timeout cannot be 0".to_string()));
        }
        if self.timeout_secs > 300 {
            return Err(AppError::Config(
                "HTTP timeout cannot be greater than 300 seconds".to_string(),
            ));
        }
        Ok(())
    }
}

/// Unified application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Pipeline settings; `max_attempts` here is replaced per registry size
    /// unless `max_attempts_override` is set
    pub pipeline: PipelineConfig,
    /// Explicit `OCR_MAX_ATTEMPTS`
    pub max_attempts_override: Option<u32>,
    pub providers: ProvidersConfig,
    pub http: HttpConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let mut config = Self::default();

        // Pipeline
        config.max_attempts_override = parse_opt(&lookup, "OCR_MAX_ATTEMPTS")?;
        if let Some(threshold) = parse_opt(&lookup, "OCR_CONFIDENCE_THRESHOLD")? {
            config.pipeline.confidence_threshold = threshold;
        }
        if let Some(timeout) = parse_opt(&lookup, "OCR_ATTEMPT_TIMEOUT_MS")? {
            config.pipeline.per_attempt_timeout_ms = timeout;
        }
        if let Some(delay) = parse_opt(&lookup, "OCR_RETRY_BASE_DELAY_MS")? {
            config.pipeline.base_retry_delay_ms = delay;
        }
        if let Some(delay) = parse_opt(&lookup, "OCR_RETRY_MAX_DELAY_MS")? {
            config.pipeline.max_retry_delay_ms = delay;
        }
        config.pipeline.cleaner = CleanerConfig {
            normalize_caps_noise: parse_bool(&lookup, "OCR_NORMALIZE_CAPS_NOISE", true),
            ..CleanerConfig::default()
        };

        // Providers
        if let Some(order) = non_empty(&lookup, "PROVIDER_ORDER") {
            config.providers.order = split_list(&order);
        }

        let ocr_space = &mut config.providers.ocr_space;
        ocr_space.enabled = parse_bool(&lookup, "OCR_SPACE_ENABLED", true);
        ocr_space.api_key = non_empty(&lookup, "OCR_SPACE_API_KEY");
        if let Some(endpoint) = non_empty(&lookup, "OCR_SPACE_ENDPOINT") {
            ocr_space.endpoint = endpoint;
        }
        if let Some(language) = non_empty(&lookup, "OCR_SPACE_LANGUAGE") {
            ocr_space.language = language;
        }
        if let Some(engine) = parse_opt(&lookup, "OCR_SPACE_ENGINE")? {
            ocr_space.engine = engine;
        }

        let google = &mut config.providers.google_vision;
        google.enabled = parse_bool(&lookup, "GOOGLE_VISION_ENABLED", true);
        google.api_key = non_empty(&lookup, "GOOGLE_VISION_API_KEY");
        if let Some(endpoint) = non_empty(&lookup, "GOOGLE_VISION_ENDPOINT") {
            google.endpoint = endpoint;
        }
        if let Some(hints) = non_empty(&lookup, "GOOGLE_VISION_LANGUAGE_HINTS") {
            google.language_hints = split_list(&hints);
        }

        let tesseract = &mut config.providers.tesseract;
        tesseract.enabled = parse_bool(&lookup, "TESSERACT_ENABLED", true);
        if let Some(languages) = non_empty(&lookup, "TESSERACT_LANGUAGES") {
            tesseract.languages = languages;
        }
        tesseract.tessdata_path = non_empty(&lookup, "TESSDATA_PREFIX");

        // HTTP
        if let Some(timeout) = parse_opt(&lookup, "HTTP_CLIENT_TIMEOUT_SECS")? {
            config.http.timeout_secs = timeout;
        }

        config.observability = ObservabilityConfig::from_lookup(&lookup);

        Ok(config)
    }

    /// Pipeline configuration for a registry of `provider_count` providers
    pub fn pipeline_for(&self, provider_count: usize) -> PipelineConfig {
        let mut pipeline = self.pipeline.clone();
        pipeline.max_attempts = self
            .max_attempts_override
            .unwrap_or_else(|| PipelineConfig::for_provider_count(provider_count).max_attempts);
        pipeline
    }

    /// Validate all configuration sections
    pub fn validate(&self) -> AppResult<()> {
        if self.max_attempts_override == Some(0) {
            return Err(AppError::Config(
                "OCR_MAX_ATTEMPTS must be greater than 0".to_string(),
            ));
        }
        self.pipeline.validate()?;
        self.providers.validate()?;
        self.http.validate()?;
        self.observability
            .validate()
            .map_err(AppError::Config)?;
        Ok(())
    }

    /// Get a summary of the current configuration for logging
    pub fn summary(&self) -> String {
        format!(
            "Configuration: provider_order={}, ocr_space_key={}, google_vision_key={}, \
             threshold={}, attempt_timeout_ms={}, max_attempts={}, environment={}",
            self.providers.order.join(","),
            redacted(self.providers.ocr_space.api_key.as_deref()),
            redacted(self.providers.google_vision.api_key.as_deref()),
            self.pipeline.confidence_threshold,
            self.pipeline.per_attempt_timeout_ms,
            self.max_attempts_override
                .map_or_else(|| "auto".to_string(), |n| n.to_string()),
            self.observability.environment
        )
    }
}

fn has_credential(key: Option<&str>) -> bool {
    key.is_some_and(|k| !k.trim().is_empty())
}

fn redacted(key: Option<&str>) -> &'static str {
    if has_credential(key) {
        "[REDACTED]"
    } else {
        "[UNSET]"
    }
}

fn validate_endpoint(name: &str, endpoint: &str) -> AppResult<()> {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Ok(())
    } else {
        Err(AppError::Config(format!(
            "{name} must be an http(s) URL, got '{endpoint}'"
        )))
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_opt<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> AppResult<Option<T>> {
    non_empty(lookup, key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|_| AppError::Config(format!("{key} must be a valid number, got '{raw}'")))
        })
        .transpose()
}

pub(crate) fn parse_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: bool,
) -> bool {
    match non_empty(lookup, key).map(|v| v.to_lowercase()).as_deref() {
        Some("true" | "1" | "yes" | "on") => true,
        Some("false" | "0" | "no" | "off") => false,
        _ => default,
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
