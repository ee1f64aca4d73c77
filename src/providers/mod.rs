//! # Recognition Providers
//!
//! Each backend implements [`OcrProvider`]. Adapters report a
//! [`RawRecognition`] or a [`ProviderError`]; the provided
//! [`OcrProvider::extract`] method folds either into an [`ExtractionAttempt`],
//! so nothing escapes the adapter boundary as an error.
//!
//! [`ProviderRegistry`] is the ordered list of enabled providers, primary
//! first. It is built once from configuration and shared read-only.

pub mod google_vision;
pub mod ocr_space;
#[cfg(feature = "tesseract")]
pub mod tesseract;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::attempt::{ExtractionAttempt, RawRecognition};
use crate::config::ProvidersConfig;
use crate::errors::{AppError, AppResult};
use crate::image_input::ImageInput;
use crate::ocr_errors::ProviderError;

/// Confidence assigned when a backend reports nothing usable
pub const DEFAULT_UNREPORTED_CONFIDENCE: f32 = 0.5;

/// A text-recognition backend
#[async_trait]
pub trait OcrProvider: Send + Sync {
    /// Stable identifier, recorded as the attempt's source id
    fn id(&self) -> &str;

    /// Recognize text in the image.
    ///
    /// `cancel` is triggered when the caller has given up on this call;
    /// adapters should stop at their next await point.
    async fn recognize(
        &self,
        image: &ImageInput,
        cancel: &CancellationToken,
    ) -> Result<RawRecognition, ProviderError>;

    /// Run one recognition and record it as an attempt
    async fn extract(&self, image: &ImageInput) -> ExtractionAttempt {
        let started_at = Utc::now();
        let start = Instant::now();
        let result = self.recognize(image, &CancellationToken::new()).await;
        ExtractionAttempt::from_result(self.id(), &result, start.elapsed(), started_at)
    }
}

/// Run a future unless the token fires first
pub(crate) async fn cancellable<T, F>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<T, ProviderError>
where
    F: std::future::Future<Output = Result<T, ProviderError>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(ProviderError::Cancelled),
        result = fut => result,
    }
}

/// Mean of the reported confidences, or `None` when nothing was reported
pub(crate) fn mean_confidence(values: impl IntoIterator<Item = f32>) -> Option<f32> {
    let (sum, count) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((0.0f32, 0u32), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let mean = sum / count as f32;
    Some(mean)
}

/// Ordered, read-only list of enabled providers
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Arc<Vec<Arc<dyn OcrProvider>>>,
}

impl ProviderRegistry {
    /// Registry from providers in priority order
    pub fn new(providers: Vec<Arc<dyn OcrProvider>>) -> Self {
        Self {
            providers: Arc::new(providers),
        }
    }

    /// Registry with no providers; every run ends in synthetic text
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the registry from configuration, skipping disabled providers
    ///
    /// # Errors
    ///
    /// Returns `AppError::Provider` if the shared HTTP client cannot be built.
    pub fn from_config(config: &ProvidersConfig, client: reqwest::Client) -> AppResult<Self> {
        let mut providers: Vec<Arc<dyn OcrProvider>> = Vec::new();

        for name in &config.order {
            match name.as_str() {
                ocr_space::PROVIDER_ID => {
                    if config.ocr_space.is_enabled() {
                        providers.push(Arc::new(ocr_space::OcrSpaceProvider::new(
                            client.clone(),
                            config.ocr_space.clone(),
                        )));
                    } else {
                        info!("Provider {name} disabled (feature off or API key missing)");
                    }
                }
                google_vision::PROVIDER_ID => {
                    if config.google_vision.is_enabled() {
                        providers.push(Arc::new(google_vision::GoogleVisionProvider::new(
                            client.clone(),
                            config.google_vision.clone(),
                        )));
                    } else {
                        info!("Provider {name} disabled (feature off or API key missing)");
                    }
                }
                "tesseract" => Self::push_tesseract(&mut providers, config)?,
                other => warn!("Unknown provider '{other}' in provider order, skipping"),
            }
        }

        let registry = Self::new(providers);
        info!(providers = ?registry.ids(), "Provider registry initialized");
        Ok(registry)
    }

    #[cfg(feature = "tesseract")]
    fn push_tesseract(
        providers: &mut Vec<Arc<dyn OcrProvider>>,
        config: &ProvidersConfig,
    ) -> AppResult<()> {
        if config.tesseract.enabled {
            let provider = tesseract::TesseractProvider::new(config.tesseract.clone())
                .map_err(|e| AppError::Provider(e.to_string()))?;
            providers.push(Arc::new(provider));
        } else {
            info!("Provider tesseract disabled");
        }
        Ok(())
    }

    #[cfg(not(feature = "tesseract"))]
    fn push_tesseract(
        _providers: &mut Vec<Arc<dyn OcrProvider>>,
        config: &ProvidersConfig,
    ) -> AppResult<()> {
        if config.tesseract.enabled {
            info!(
                "Provider tesseract requested but not compiled in (enable the `tesseract` feature)"
            );
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<dyn OcrProvider>> {
        self.providers.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn OcrProvider>> {
        self.providers.iter()
    }

    /// Provider ids in priority order
    pub fn ids(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.id().to_string()).collect()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.ids())
            .finish()
    }
}

/// Build the HTTP client shared by all network providers
pub fn build_http_client(config: &crate::config::HttpConfig) -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.timeout_secs))
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| AppError::Provider(format!("Failed to build HTTP client: {e}")))
}
