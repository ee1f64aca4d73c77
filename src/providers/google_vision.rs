//! Google Cloud Vision adapter (`images:annotate`, document text detection).
//!
//! Confidence is the mean of page confidences; when pages carry none, the
//! mean of block confidences; when nothing is reported, a fixed default.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::ocr_space::truncate_body;
use super::{cancellable, mean_confidence, OcrProvider, DEFAULT_UNREPORTED_CONFIDENCE};
use crate::attempt::RawRecognition;
use crate::config::GoogleVisionConfig;
use crate::image_input::ImageInput;
use crate::ocr_errors::ProviderError;

pub const PROVIDER_ID: &str = "google_vision";

pub struct GoogleVisionProvider {
    client: reqwest::Client,
    config: GoogleVisionConfig,
}

impl GoogleVisionProvider {
    pub fn new(client: reqwest::Client, config: GoogleVisionConfig) -> Self {
        Self { client, config }
    }
}

#[derive(Serialize)]
struct AnnotateRequest<'a> {
    requests: Vec<AnnotateImageRequest<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageRequest<'a> {
    image: ImageContent,
    features: Vec<Feature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_context: Option<ImageContext<'a>>,
}

#[derive(Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Serialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageContext<'a> {
    language_hints: &'a [String],
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    #[serde(default)]
    full_text_annotation: Option<TextAnnotation>,
    #[serde(default)]
    error: Option<Status>,
}

#[derive(Debug, Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    text: String,
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    blocks: Vec<Block>,
}

#[derive(Debug, Deserialize)]
struct Block {
    #[serde(default)]
    confidence: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct Status {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

#[async_trait]
impl OcrProvider for GoogleVisionProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    async fn recognize(
        &self,
        image: &ImageInput,
        cancel: &CancellationToken,
    ) -> Result<RawRecognition, ProviderError> {
        let loaded = image.load().await?;
        if !loaded.media_type.starts_with("image/") {
            return Err(ProviderError::Format(format!(
                "Cloud Vision expects an image, got {}",
                loaded.media_type
            )));
        }

        let payload = AnnotateRequest {
            requests: vec![AnnotateImageRequest {
                image: ImageContent {
                    content: loaded.to_base64(),
                },
                features: vec![Feature {
                    kind: "DOCUMENT_TEXT_DETECTION",
                }],
                image_context: (!self.config.language_hints.is_empty()).then(|| ImageContext {
                    language_hints: &self.config.language_hints,
                }),
            }],
        };

        debug!(
            endpoint = %self.config.endpoint,
            image_bytes = loaded.bytes.len(),
            "Sending image to Cloud Vision"
        );

        let api_key = self.config.api_key.clone().unwrap_or_default();
        let request = self
            .client
            .post(&self.config.endpoint)
            .query(&[("key", api_key)])
            .json(&payload)
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

/// Interpret an `images:annotate` response body
pub fn parse_response(body: &str) -> Result<RawRecognition, ProviderError> {
    let response: AnnotateResponse = serde_json::from_str(body)?;
    let first = response
        .responses
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Payload("response contained no results".to_string()))?;

    if let Some(status) = first.error {
        return Err(ProviderError::Payload(format!(
            "annotation error {}: {}",
            status.code, status.message
        )));
    }

    // No annotation means no text was found, which is a valid empty result
    let Some(annotation) = first.full_text_annotation else {
        return Ok(RawRecognition::new(String::new(), 0.0));
    };

    let confidence = mean_confidence(annotation.pages.iter().filter_map(|p| p.confidence))
        .or_else(|| {
            mean_confidence(
                annotation
                    .pages
                    .iter()
                    .flat_map(|p| p.blocks.iter())
                    .filter_map(|b| b.confidence),
            )
        })
        .unwrap_or(DEFAULT_UNREPORTED_CONFIDENCE);

    Ok(RawRecognition::new(annotation.text.trim(), confidence))
}
