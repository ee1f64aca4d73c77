//! # Provider Adapter Tests
//!
//! HTTP adapters against unreachable endpoints and unsupported inputs, the
//! registry built from configuration, and image handle resolution.

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use chat_ocr::config::{GoogleVisionConfig, OcrSpaceConfig, ProvidersConfig};
    use chat_ocr::image_input::ImageInput;
    use chat_ocr::ocr_config::PipelineConfig;
    use chat_ocr::pipeline::{run_pipeline_detailed, PipelineOutcome};
    use chat_ocr::providers::google_vision::GoogleVisionProvider;
    use chat_ocr::providers::ocr_space::OcrSpaceProvider;
    use chat_ocr::providers::{OcrProvider, ProviderRegistry};
    use tempfile::NamedTempFile;

    // Nothing listens on port 1
    const REFUSING_ENDPOINT: &str = "http://127.0.0.1:1/ocr";

    fn png_bytes() -> Vec<u8> {
        let image = image::DynamicImage::new_rgb8(6, 6);
        let mut buffer = Vec::new();
        image
            .write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Png)
            .unwrap();
        buffer
    }

    fn ocr_space_config() -> OcrSpaceConfig {
        OcrSpaceConfig {
            api_key: Some("test-key".to_string()),
            endpoint: REFUSING_ENDPOINT.to_string(),
            ..OcrSpaceConfig::default()
        }
    }

    fn google_vision_config() -> GoogleVisionConfig {
        GoogleVisionConfig {
            api_key: Some("test-key".to_string()),
            endpoint: REFUSING_ENDPOINT.to_string(),
            ..GoogleVisionConfig::default()
        }
    }

    #[tokio::test]
    async fn test_connection_refused_becomes_failed_attempt() {
        let provider = OcrSpaceProvider::new(reqwest::Client::new(), ocr_space_config());
        let attempt = provider.extract(&ImageInput::from_bytes(png_bytes())).await;

        assert_eq!(attempt.source_id, "ocr_space");
        assert_eq!(attempt.confidence, 0.0);
        assert!(attempt.text.is_empty());
        let error = attempt.error.expect("attempt should record the failure");
        assert!(error.contains("[PROVIDER_TRANSPORT]"), "unexpected error: {error}");
    }

    #[tokio::test]
    async fn test_google_vision_connection_refused() {
        let provider = GoogleVisionProvider::new(reqwest::Client::new(), google_vision_config());
        let attempt = provider.extract(&ImageInput::from_bytes(png_bytes())).await;

        assert!(attempt.is_failure());
        assert_eq!(attempt.source_id, "google_vision");
    }

    #[tokio::test]
    async fn test_unsupported_encoding_is_format_error() {
        let provider = OcrSpaceProvider::new(reqwest::Client::new(), ocr_space_config());
        let image = ImageInput::from_bytes_with_type(b"<svg></svg>".to_vec(), "image/svg+xml");
        let attempt = provider.extract(&image).await;

        let error = attempt.error.unwrap();
        assert!(error.contains("[PROVIDER_FORMAT]"), "unexpected error: {error}");
    }

    #[tokio::test]
    async fn test_non_image_data_uri_is_rejected() {
        let provider = GoogleVisionProvider::new(reqwest::Client::new(), google_vision_config());
        let image = ImageInput::DataUri("data:text/plain;base64,aGVsbG8=".to_string());
        let attempt = provider.extract(&image).await;

        assert!(attempt.error.unwrap().contains("[PROVIDER_FORMAT]"));
    }

    #[tokio::test]
    async fn test_missing_file_is_failed_attempt() {
        let provider = OcrSpaceProvider::new(reqwest::Client::new(), ocr_space_config());
        let image = ImageInput::File("/definitely/not/here.png".into());
        let attempt = provider.extract(&image).await;

        assert!(attempt.error.unwrap().contains("[PROVIDER_UNAVAILABLE]"));
    }

    /// Unreachable providers are retried once, then the run falls back
    #[tokio::test]
    async fn test_pipeline_over_unreachable_providers() {
        let client = reqwest::Client::new();
        let registry = ProviderRegistry::new(vec![
            Arc::new(OcrSpaceProvider::new(client.clone(), ocr_space_config()))
                as Arc<dyn OcrProvider>,
            Arc::new(GoogleVisionProvider::new(client, google_vision_config())),
        ]);
        let config = PipelineConfig {
            max_attempts: 3,
            per_attempt_timeout_ms: 2_000,
            base_retry_delay_ms: 1,
            max_retry_delay_ms: 2,
            ..PipelineConfig::default()
        };

        let report =
            run_pipeline_detailed(&ImageInput::from_bytes(png_bytes()), &registry, &config).await;

        assert_eq!(report.outcome, PipelineOutcome::Synthetic);
        assert_eq!(report.attempts.len(), 3);
        assert_eq!(report.attempts[2].source_id, "ocr_space");
        assert!(report.attempts.iter().all(|a| a.is_failure()));
        assert!(report.result.text.contains("6x6 px"));
    }

    #[tokio::test]
    async fn test_file_input_describes_image() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&png_bytes()).unwrap();

        let registry = ProviderRegistry::empty();
        let report = run_pipeline_detailed(
            &ImageInput::File(file.path().to_path_buf()),
            &registry,
            &PipelineConfig::default(),
        )
        .await;

        assert_eq!(report.outcome, PipelineOutcome::Synthetic);
        assert!(report.result.text.contains("image/png"));
        assert!(report.result.text.contains("6x6 px"));
    }

    #[test]
    fn test_registry_respects_order_and_enablement() {
        let mut config = ProvidersConfig::default();
        config.order = vec!["google_vision".to_string(), "ocr_space".to_string()];
        config.ocr_space = ocr_space_config();
        config.google_vision = google_vision_config();

        let registry = ProviderRegistry::from_config(&config, reqwest::Client::new()).unwrap();
        assert_eq!(registry.ids(), vec!["google_vision", "ocr_space"]);

        config.google_vision.enabled = false;
        let registry = ProviderRegistry::from_config(&config, reqwest::Client::new()).unwrap();
        assert_eq!(registry.ids(), vec!["ocr_space"]);
    }
}
