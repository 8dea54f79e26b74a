//! Inline image encoding.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::DocumentError;

/// Detect an image MIME type from magic bytes.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else if bytes.starts_with(b"BM") {
        Some("image/bmp")
    } else {
        None
    }
}

/// Encode image bytes as a `data:` URI.
pub fn to_data_uri(bytes: &[u8]) -> Result<String, DocumentError> {
    if bytes.is_empty() {
        return Err(DocumentError::EmptyImage);
    }
    let mime = sniff_mime(bytes).ok_or(DocumentError::UnsupportedImage)?;
    Ok(format!("data:{mime};base64,{}", STANDARD.encode(bytes)))
}
