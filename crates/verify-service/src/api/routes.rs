use super::{SUCCESS_PAGE_PATH, VERIFY_PAGE_PATH};
use crate::error::VerifyError;
use crate::state::VerifyServiceState;
use axum::{
    extract::{
        multipart::{Multipart, MultipartError, MultipartRejection},
        rejection::JsonRejection,
        State,
    },
    http::StatusCode,
    response::{Html, IntoResponse},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

const IC_FIELD: &str = "ic_image";

/// A body over the size limit is reported as such; any other multipart
/// failure means the form carried no usable file part.
fn multipart_failure(e: MultipartError) -> VerifyError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        tracing::warn!(error = %e, "IC upload exceeds the body limit");
        VerifyError::PayloadTooLarge
    } else {
        tracing::debug!(error = %e, "malformed multipart body");
        VerifyError::NoFilePart
    }
}

/// Reply to a successful IC upload
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub status: String,
    pub message: String,
    pub redirect: String,
}

/// Live frame submitted by the verification page or the mobile client
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FrameRequest {
    /// Base64 image, optionally prefixed with a data-URL header
    #[serde(default)]
    pub image: Option<String>,
}

/// Verdict for one live frame
#[derive(Debug, Serialize, Deserialize)]
pub struct FrameResponse {
    /// "success" or "fail"
    pub status: String,
    pub score: u8,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

pub async fn index() -> Html<&'static str> {
    Html(include_str!("../../templates/index.html"))
}

pub async fn verify_page() -> Html<&'static str> {
    Html(include_str!("../../templates/verify.html"))
}

pub async fn success_page() -> Html<&'static str> {
    Html(include_str!("../../templates/success.html"))
}

/// Enroll the identity document sent as multipart field `ic_image`
pub async fn upload_ic(
    State(state): State<VerifyServiceState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, VerifyError> {
    let mut multipart = multipart.map_err(|e| {
        tracing::debug!(error = %e, "upload is not a multipart form");
        VerifyError::NoFilePart
    })?;

    let mut upload = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(multipart_failure(e)),
        };

        // Only file parts count; a plain form value with the same name does not.
        if field.name() != Some(IC_FIELD) {
            continue;
        }
        let Some(file_name) = field.file_name().map(str::to_owned) else {
            continue;
        };
        if file_name.is_empty() {
            return Err(VerifyError::EmptyFilename);
        }

        let bytes = field.bytes().await.map_err(multipart_failure)?;
        upload = Some((file_name, bytes));
        break;
    }

    let (file_name, bytes) = upload.ok_or(VerifyError::NoFilePart)?;
    tracing::info!(file_name = %file_name, size = bytes.len(), "IC upload received");

    let enrollment = state.enroll_identity(&bytes).await?;
    tracing::info!(
        photo = %enrollment.photo_reference,
        persisted = enrollment.persisted,
        face = ?enrollment.face,
        "IC enrollment complete"
    );

    Ok(Json(UploadResponse {
        status: "success".to_string(),
        message: "IC uploaded successfully".to_string(),
        redirect: VERIFY_PAGE_PATH.to_string(),
    }))
}

/// Check a live camera frame against the enrolled identity
pub async fn process_frame(
    State(state): State<VerifyServiceState>,
    payload: Result<Json<FrameRequest>, JsonRejection>,
) -> Result<Json<FrameResponse>, VerifyError> {
    let Json(request) = payload.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            tracing::warn!(error = %e, "frame exceeds the body limit");
            return VerifyError::PayloadTooLarge;
        }
        tracing::debug!(error = %e, "frame request is not valid JSON");
        VerifyError::MissingImageData
    })?;

    let frame = request
        .image
        .filter(|image| !image.is_empty())
        .ok_or(VerifyError::MissingImageData)?;

    let verification = state.verify_frame(&frame).await?;
    let decision = verification.decision;

    let response = if verification.stateless {
        FrameResponse {
            status: "success".to_string(),
            score: decision.score,
            message: "Identity Verified (stateless mode)".to_string(),
            redirect: Some(SUCCESS_PAGE_PATH.to_string()),
        }
    } else if decision.passed() {
        FrameResponse {
            status: "success".to_string(),
            score: decision.score,
            message: "Identity Verified".to_string(),
            redirect: Some(SUCCESS_PAGE_PATH.to_string()),
        }
    } else {
        FrameResponse {
            status: "fail".to_string(),
            score: decision.score,
            message: "Face mismatch".to_string(),
            redirect: None,
        }
    };

    Ok(Json(response))
}

/// Health check endpoint
pub async fn health(State(state): State<VerifyServiceState>) -> impl IntoResponse {
    let mode = if state.is_stateless() {
        "stateless"
    } else {
        "stateful"
    };

    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "message": "Backend is running",
            "mode": mode,
            "store": state.store_kind(),
            "warmup": state.warmup_status().await.as_str(),
        })),
    )
}

/// Metrics endpoint (Prometheus format)
pub async fn metrics() -> impl IntoResponse {
    match telemetry::metrics::gather_text() {
        Ok(text) => text.into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}
