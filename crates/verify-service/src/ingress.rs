//! Image ingress: raw upload bytes and base64 camera frames to rasters.

use crate::error::VerifyError;
use base64::{engine::general_purpose::STANDARD, Engine};
use image::DynamicImage;

/// Strip an optional data-URL header (`data:image/jpeg;base64,`).
///
/// When the value contains a comma only the segment after the first comma is
/// kept, up to any further comma.
pub fn strip_data_url(data: &str) -> &str {
    if data.contains(',') {
        data.split(',').nth(1).unwrap_or_default()
    } else {
        data
    }
}

/// Decode the base64 payload of a camera frame into bytes.
///
/// Line breaks and other ASCII whitespace are ignored, so MIME-wrapped
/// encoders (76 columns) are accepted. Padding stays strict.
pub fn decode_base64_frame(data: &str) -> Result<Vec<u8>, VerifyError> {
    if data.is_empty() {
        return Err(VerifyError::MissingImageData);
    }

    let payload: String = strip_data_url(data)
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    STANDARD
        .decode(payload)
        .map_err(|e| VerifyError::Base64DecodeFailure(e.to_string()))
}

/// Decode encoded image bytes (JPEG, PNG, ...) into a colour raster.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, VerifyError> {
    image::load_from_memory(bytes).map_err(|e| {
        tracing::debug!(error = %e, len = bytes.len(), "image decode failed");
        VerifyError::ImageDecodeFailure
    })
}

/// Full path for a `/process_frame` payload.
pub fn decode_frame(data: &str) -> Result<DynamicImage, VerifyError> {
    let bytes = decode_base64_frame(data)?;
    decode_image(&bytes)
}
