use crate::face::EmbeddingExtractor;
use image::{DynamicImage, RgbImage};
use std::time::Instant;

/// Side of the blank image pushed through the model at startup
const WARMUP_SIDE: u32 = 100;

/// Outcome of the one-time model warm-up
#[derive(Debug, Clone, PartialEq)]
pub enum WarmupStatus {
    Pending,
    Ready,
    /// Warm-up failed; the service keeps running and the first real request
    /// pays the initialisation cost or surfaces the real error.
    Failed(String),
}

impl WarmupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarmupStatus::Pending => "pending",
            WarmupStatus::Ready => "ready",
            WarmupStatus::Failed(_) => "failed",
        }
    }
}

/// Run one embedding over a blank frame. Never fails the caller.
pub async fn warm_up(extractor: &dyn EmbeddingExtractor) -> WarmupStatus {
    tracing::info!(model = extractor.model_name(), "warming up embedding model");
    let started = Instant::now();
    let blank = DynamicImage::ImageRgb8(RgbImage::new(WARMUP_SIDE, WARMUP_SIDE));

    match extractor.extract(&blank).await {
        Ok(_) => {
            tracing::info!(
                model = extractor.model_name(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "embedding model ready"
            );
            WarmupStatus::Ready
        }
        Err(e) => {
            tracing::warn!(
                model = extractor.model_name(),
                error = %format!("{e:#}"),
                "embedding model warm-up failed, continuing without it"
            );
            WarmupStatus::Failed(format!("{e:#}"))
        }
    }
}
