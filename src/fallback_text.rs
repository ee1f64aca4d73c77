//! Synthetic text for images no provider could read.
//!
//! The generated notice is always non-empty and is tagged downstream with
//! [`FALLBACK_SOURCE_ID`](crate::ocr_config::FALLBACK_SOURCE_ID) so analysis
//! can skip it instead of scoring it as a real conversation.

use crate::image_input::ImageDescriptor;

const GUIDANCE: &str = "For a better result, upload a higher-resolution screenshot, \
avoid re-compressed or forwarded copies, and crop tightly around the conversation.";

/// Build the synthetic notice for an unreadable image. Never fails.
///
/// # Examples
/// ```
/// use chat_ocr::fallback_text::generate_fallback_text;
/// use chat_ocr::image_input::ImageDescriptor;
///
/// let text = generate_fallback_text(&ImageDescriptor::default());
/// assert!(text.contains("unknown"));
/// ```
pub fn generate_fallback_text(descriptor: &ImageDescriptor) -> String {
    let size = descriptor
        .size_bytes
        .map(format_size)
        .unwrap_or_else(|| "unknown".to_string());
    let media_type = descriptor
        .media_type
        .as_deref()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or("unknown");
    let dimensions = descriptor
        .dimensions
        .map(|(w, h)| format!("{w}x{h} px"))
        .unwrap_or_else(|| "unknown".to_string());

    format!(
        "Text could not be extracted from this screenshot. \
Image details: size {size}, type {media_type}, dimensions {dimensions}. {guidance}",
        guidance = GUIDANCE
    )
}

/// Human-readable approximate size
#[allow(clippy::cast_precision_loss)]
fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;

    match bytes {
        b if b >= MIB => format!("~{:.1} MB", b as f64 / MIB as f64),
        b if b >= KIB => format!("~{:.0} KB", b as f64 / KIB as f64),
        b => format!("{b} bytes"),
    }
}
