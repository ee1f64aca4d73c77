//! # Image Input Module
//!
//! The image handle accepted by the pipeline and the metadata derived from it.
//!
//! An image reaches the pipeline in one of three encodings:
//!
//! - raw bytes already in memory (optionally with a declared media type)
//! - a file on disk
//! - an already-encoded `data:` URI
//!
//! Providers call [`ImageInput::load`] to obtain bytes; the fallback generator
//! uses [`ImageInput::describe`], which never fails and only reads headers.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use tracing::debug;

use crate::ocr_errors::ProviderError;

/// Largest image accepted by any provider (20MB)
pub const MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024;

/// An image handle supplied by the caller
#[derive(Debug, Clone)]
pub enum ImageInput {
    /// Raw encoded image bytes with an optional declared media type
    Bytes {
        data: Arc<[u8]>,
        media_type: Option<String>,
    },
    /// Path to an image file
    File(PathBuf),
    /// A `data:<media-type>;base64,<payload>` URI
    DataUri(String),
}

/// Bytes and media type resolved from an [`ImageInput`]
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub bytes: Vec<u8>,
    pub media_type: String,
}

impl LoadedImage {
    /// Base64 payload without the data URI prefix
    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(&self.bytes)
    }

    /// Full `data:` URI for providers that accept one
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.to_base64())
    }
}

/// Best-effort metadata about an image, used for diagnostics and synthetic text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageDescriptor {
    pub size_bytes: Option<u64>,
    pub media_type: Option<String>,
    pub dimensions: Option<(u32, u32)>,
    pub source: &'static str,
}

impl ImageInput {
    /// Wrap in-memory bytes without a declared media type
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        ImageInput::Bytes {
            data: Arc::from(data.into()),
            media_type: None,
        }
    }

    /// Wrap in-memory bytes with a declared media type
    pub fn from_bytes_with_type(data: impl Into<Vec<u8>>, media_type: impl Into<String>) -> Self {
        ImageInput::Bytes {
            data: Arc::from(data.into()),
            media_type: Some(media_type.into()),
        }
    }

    /// Short label of the encoding, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            ImageInput::Bytes { .. } => "bytes",
            ImageInput::File(_) => "file",
            ImageInput::DataUri(_) => "data-uri",
        }
    }

    /// Resolve the image into bytes and a media type
    ///
    /// # Errors
    ///
    /// - `ProviderError::Format` for malformed data URIs, empty or oversized images
    /// - `ProviderError::Unavailable` when the file cannot be read
    pub async fn load(&self) -> Result<LoadedImage, ProviderError> {
        let (bytes, declared) = match self {
            ImageInput::Bytes { data, media_type } => (data.to_vec(), media_type.clone()),
            ImageInput::File(path) => {
                let bytes = tokio::fs::read(path).await.map_err(|e| {
                    ProviderError::Unavailable(format!(
                        "cannot read image file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                (bytes, None)
            }
            ImageInput::DataUri(uri) => {
                let (media_type, payload) = parse_data_uri(uri)?;
                (payload, Some(media_type))
            }
        };

        if bytes.is_empty() {
            return Err(ProviderError::Format("image is empty".to_string()));
        }
        if bytes.len() as u64 > MAX_IMAGE_BYTES {
            return Err(ProviderError::Format(format!(
                "image too large: {} bytes (maximum allowed: {} bytes)",
                bytes.len(),
                MAX_IMAGE_BYTES
            )));
        }

        let media_type = declared
            .or_else(|| sniff_media_type(&bytes))
            .unwrap_or_else(|| "application/octet-stream".to_string());

        Ok(LoadedImage { bytes, media_type })
    }

    /// Describe the image from whatever metadata is cheaply available. Never fails.
    pub async fn describe(&self) -> ImageDescriptor {
        match self {
            ImageInput::Bytes { data, media_type } => ImageDescriptor {
                size_bytes: Some(data.len() as u64),
                media_type: media_type.clone().or_else(|| sniff_media_type(data)),
                dimensions: header_dimensions(data),
                source: "bytes",
            },
            ImageInput::File(path) => {
                let size_bytes = tokio::fs::metadata(path).await.map(|m| m.len()).ok();
                let header_path = path.clone();
                let (media_type, dimensions) =
                    tokio::task::spawn_blocking(move || file_header(&header_path))
                        .await
                        .unwrap_or_else(|e| {
                            debug!("Image header probe failed: {e}");
                            (None, None)
                        });
                ImageDescriptor {
                    size_bytes,
                    media_type,
                    dimensions,
                    source: "file",
                }
            }
            ImageInput::DataUri(uri) => match parse_data_uri(uri) {
                Ok((media_type, payload)) => ImageDescriptor {
                    size_bytes: Some(payload.len() as u64),
                    media_type: Some(media_type),
                    dimensions: header_dimensions(&payload),
                    source: "data-uri",
                },
                Err(e) => {
                    debug!("Could not decode data URI for description: {e}");
                    ImageDescriptor {
                        source: "data-uri",
                        ..Default::default()
                    }
                }
            },
        }
    }
}

/// Split a base64 `data:` URI into media type and decoded payload
pub fn parse_data_uri(uri: &str) -> Result<(String, Vec<u8>), ProviderError> {
    let rest = uri
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| ProviderError::Format("not a data URI".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| ProviderError::Format("data URI has no payload separator".to_string()))?;
    let media_type = header
        .strip_suffix(";base64")
        .ok_or_else(|| ProviderError::Format("only base64 data URIs are supported".to_string()))?;
    let media_type = if media_type.is_empty() {
        "application/octet-stream".to_string()
    } else {
        media_type.to_string()
    };
    let bytes = BASE64_STANDARD
        .decode(payload.trim())
        .map_err(|e| ProviderError::Format(format!("invalid base64 payload: {e}")))?;
    Ok((media_type, bytes))
}

/// Detect the media type from magic bytes
pub fn sniff_media_type(bytes: &[u8]) -> Option<String> {
    image::guess_format(bytes)
        .ok()
        .map(|format| format.to_mime_type().to_string())
}

/// Media type and dimensions from a file's header. Blocking.
fn file_header(path: &std::path::Path) -> (Option<String>, Option<(u32, u32)>) {
    let reader = image::ImageReader::open(path)
        .ok()
        .and_then(|r| r.with_guessed_format().ok());
    let media_type = reader
        .as_ref()
        .and_then(|r| r.format())
        .map(|f| f.to_mime_type().to_string());
    let dimensions = reader.and_then(|r| r.into_dimensions().ok());
    (media_type, dimensions)
}

fn header_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}
