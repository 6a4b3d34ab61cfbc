use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failures a request can end in. Every variant is rendered as
/// `{"status": "error", "message": ...}` at the HTTP boundary.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("No file part")]
    NoFilePart,

    #[error("No selected file")]
    EmptyFilename,

    #[error("No image data provided")]
    MissingImageData,

    #[error("Failed to decode base64: {0}")]
    Base64DecodeFailure(String),

    #[error("Failed to decode image")]
    ImageDecodeFailure,

    #[error("Image too large")]
    PayloadTooLarge,

    #[error("Failed to load face detection cascade")]
    CascadeLoadFailure,

    #[error("No face detected")]
    NoFaceDetected,

    #[error("No ID record found")]
    NoIdentityRecord,

    #[error("{0}")]
    Internal(String),
}

impl VerifyError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            VerifyError::NoFilePart
            | VerifyError::EmptyFilename
            | VerifyError::MissingImageData
            | VerifyError::Base64DecodeFailure(_)
            | VerifyError::ImageDecodeFailure => StatusCode::BAD_REQUEST,
            VerifyError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            // Expected outcomes while a client streams frames; reported in the body only.
            VerifyError::NoFaceDetected | VerifyError::NoIdentityRecord => StatusCode::OK,
            VerifyError::CascadeLoadFailure | VerifyError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            VerifyError::NoFilePart => "no_file_part",
            VerifyError::EmptyFilename => "empty_filename",
            VerifyError::MissingImageData => "missing_image_data",
            VerifyError::Base64DecodeFailure(_) => "base64_decode_failure",
            VerifyError::ImageDecodeFailure => "image_decode_failure",
            VerifyError::PayloadTooLarge => "payload_too_large",
            VerifyError::CascadeLoadFailure => "cascade_load_failure",
            VerifyError::NoFaceDetected => "no_face_detected",
            VerifyError::NoIdentityRecord => "no_identity_record",
            VerifyError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for VerifyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = Json(json!({
            "status": "error",
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for VerifyError {
    fn from(err: anyhow::Error) -> Self {
        VerifyError::internal(format!("{err:#}"))
    }
}

impl From<std::io::Error> for VerifyError {
    fn from(err: std::io::Error) -> Self {
        VerifyError::internal(err.to_string())
    }
}
