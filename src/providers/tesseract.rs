//! Local Tesseract adapter, compiled with the `tesseract` feature.
//!
//! Engines are expensive to initialize (hundreds of milliseconds), so one
//! engine per language set is cached and reused. Recognition runs on the
//! blocking pool; an engine is used by one call at a time.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use leptess::LepTess;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::OcrProvider;
use crate::attempt::RawRecognition;
use crate::config::TesseractConfig;
use crate::image_input::ImageInput;
use crate::ocr_errors::ProviderError;

pub const PROVIDER_ID: &str = "tesseract";

/// Engines keyed by `languages:tessdata_path`
#[derive(Default)]
pub struct EngineCache {
    engines: Mutex<HashMap<String, Arc<Mutex<LepTess>>>>,
}

impl EngineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the engine for the configured languages
    ///
    /// # Errors
    ///
    /// Fails when Tesseract cannot load the requested language data.
    pub fn get(&self, config: &TesseractConfig) -> anyhow::Result<Arc<Mutex<LepTess>>> {
        let key = format!(
            "{}:{}",
            config.languages,
            config.tessdata_path.as_deref().unwrap_or("default")
        );

        if let Some(engine) = self.engines.lock().get(&key) {
            return Ok(Arc::clone(engine));
        }

        info!(languages = %config.languages, "Creating Tesseract engine");
        let engine = LepTess::new(config.tessdata_path.as_deref(), &config.languages)
            .map_err(|e| anyhow::anyhow!("Failed to initialize Tesseract: {}", e))?;
        let engine = Arc::new(Mutex::new(engine));

        // A concurrent caller may have inserted first; keep whichever landed
        let mut engines = self.engines.lock();
        Ok(Arc::clone(engines.entry(key).or_insert(engine)))
    }

    pub fn len(&self) -> usize {
        self.engines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.lock().is_empty()
    }
}

pub struct TesseractProvider {
    config: TesseractConfig,
    engines: EngineCache,
}

impl TesseractProvider {
    /// Create the provider and warm the engine so a missing language pack
    /// disables the provider at startup rather than on first use
    pub fn new(config: TesseractConfig) -> anyhow::Result<Self> {
        let engines = EngineCache::new();
        engines.get(&config)?;
        Ok(Self { config, engines })
    }
}

#[async_trait]
impl OcrProvider for TesseractProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    async fn recognize(
        &self,
        image: &ImageInput,
        cancel: &CancellationToken,
    ) -> Result<RawRecognition, ProviderError> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }

        let loaded = image.load().await?;
        let engine = self
            .engines
            .get(&self.config)
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        let cancel = cancel.clone();

        let (text, mean_conf) = tokio::task::spawn_blocking(move || {
            let mut tess = engine.lock();
            if cancel.is_cancelled() {
                return Err(ProviderError::Cancelled);
            }
            tess.set_image_from_mem(&loaded.bytes).map_err(|e| {
                ProviderError::Format(format!("Tesseract could not decode image: {e}"))
            })?;
            let text = tess
                .get_utf8_text()
                .map_err(|e| {
                    ProviderError::Payload(format!("Tesseract produced invalid UTF-8: {e}"))
                })?;
            Ok((text, tess.mean_text_conf()))
        })
        .await
        .map_err(|e| ProviderError::Unavailable(format!("Tesseract task failed: {e}")))??;

        debug!(mean_conf, chars = text.len(), "Tesseract recognition finished");

        #[allow(clippy::cast_precision_loss)]
        let confidence = mean_conf.max(0) as f32 / 100.0;
        Ok(RawRecognition::new(text.trim(), confidence))
    }
}
