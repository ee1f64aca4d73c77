//! OCR.space adapter.
//!
//! Posts the screenshot as a base64 data URI. The service reports no
//! confidence, so one is derived from the processing flags: a fixed default
//! for a clean parse, halved when some pages errored but text came back.

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{cancellable, OcrProvider, DEFAULT_UNREPORTED_CONFIDENCE};
use crate::attempt::RawRecognition;
use crate::config::OcrSpaceConfig;
use crate::image_input::ImageInput;
use crate::ocr_errors::ProviderError;

pub const PROVIDER_ID: &str = "ocr_space";

/// OCR.space exit code for a fully parsed image
const EXIT_CODE_PARSED: i32 = 1;

/// Media types accepted by the service
const SUPPORTED_MEDIA_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/bmp",
    "image/tiff",
    "image/webp",
];

pub struct OcrSpaceProvider {
    client: reqwest::Client,
    config: OcrSpaceConfig,
}

impl OcrSpaceProvider {
    pub fn new(client: reqwest::Client, config: OcrSpaceConfig) -> Self {
        Self { client, config }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OcrSpaceResponse {
    #[serde(default)]
    parsed_results: Vec<ParsedResult>,
    #[serde(rename = "OCRExitCode", default)]
    ocr_exit_code: i32,
    #[serde(default)]
    is_errored_on_processing: bool,
    #[serde(default)]
    error_message: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ParsedResult {
    #[serde(default)]
    parsed_text: String,
}

#[async_trait]
impl OcrProvider for OcrSpaceProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    async fn recognize(
        &self,
        image: &ImageInput,
        cancel: &CancellationToken,
    ) -> Result<RawRecognition, ProviderError> {
        let loaded = image.load().await?;
        if !SUPPORTED_MEDIA_TYPES.contains(&loaded.media_type.as_str()) {
            return Err(ProviderError::Format(format!(
                "OCR.space does not accept {}",
                loaded.media_type
            )));
        }

        let api_key = self.config.api_key.clone().unwrap_or_default();
        let form = [
            ("base64Image", loaded.to_data_uri()),
            ("language", self.config.language.clone()),
            ("OCREngine", self.config.engine.to_string()),
            ("scale", "true".to_string()),
        ];

        debug!(
            endpoint = %self.config.endpoint,
            image_bytes = loaded.bytes.len(),
            "Sending image to OCR.space"
        );

        let request = self
            .client
            .post(&self.config.endpoint)
            .header("apikey", api_key)
            .form(&form)
            .send();
        let response =
            cancellable(cancel, async { request.await.map_err(ProviderError::from) }).await?;

        let status = response.status();
        let body =
            cancellable(cancel, async { response.text().await.map_err(ProviderError::from) })
                .await?;
        if !status.is_success() {
            return Err(ProviderError::Status {
                code: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        parse_response(&body)
    }
}

/// Interpret an OCR.space response body
pub fn parse_response(body: &str) -> Result<RawRecognition, ProviderError> {
    let response: OcrSpaceResponse = serde_json::from_str(body)?;

    let text = response
        .parsed_results
        .iter()
        .map(|r| r.parsed_text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if text.is_empty() && response.is_errored_on_processing {
        return Err(ProviderError::Payload(format!(
            "processing failed (exit code {}): {}",
            response.ocr_exit_code,
            error_message_text(response.error_message.as_ref())
        )));
    }

    let confidence = if response.ocr_exit_code == EXIT_CODE_PARSED
        && !response.is_errored_on_processing
    {
        DEFAULT_UNREPORTED_CONFIDENCE
    } else {
        DEFAULT_UNREPORTED_CONFIDENCE / 2.0
    };

    Ok(RawRecognition::new(text, confidence))
}

// ErrorMessage is either a string or a list of strings
fn error_message_text(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join("; "),
        _ => "no error message".to_string(),
    }
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX_BODY_CHARS: usize = 200;
    if body.chars().count() > MAX_BODY_CHARS {
        format!("{}...", body.chars().take(MAX_BODY_CHARS).collect::<String>())
    } else {
        body.to_string()
    }
}
