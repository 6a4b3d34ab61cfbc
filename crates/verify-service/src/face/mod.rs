//! Face location and embedding extraction.
//!
//! The detector and the embedding model are opaque capabilities behind the
//! [`FaceDetector`] and [`EmbeddingExtractor`] traits. This module owns the
//! policy around them: which face is the subject and how it is cropped.

pub mod detector;
pub mod embedder;
pub mod mock;
pub mod session;

use crate::error::VerifyError;
use anyhow::Result;
use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use detector::OnnxFaceDetector;
pub use embedder::OnnxEmbeddingExtractor;

/// Axis-aligned face box in source image pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub confidence: f32,
}

impl FaceBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence: 1.0,
        }
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Intersect with a `width` x `height` image; `None` if nothing remains.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<FaceBox> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let w = self.width.min(width - self.x);
        let h = self.height.min(height - self.y);
        if w == 0 || h == 0 {
            return None;
        }
        Some(FaceBox {
            width: w,
            height: h,
            ..*self
        })
    }
}

/// Locates faces in an image
#[async_trait]
pub trait FaceDetector: Send + Sync {
    /// Model identifier for logs
    fn name(&self) -> &str;

    /// Bounding boxes of every detected face, in detector order.
    async fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceBox>>;
}

/// Maps a face crop to a fixed-length embedding
#[async_trait]
pub trait EmbeddingExtractor: Send + Sync {
    /// Model identifier, e.g. "Facenet512"
    fn model_name(&self) -> &str;

    /// Length of every embedding this extractor produces
    fn dimension(&self) -> usize;

    /// Embed an RGB face crop.
    async fn extract(&self, face: &DynamicImage) -> Result<Vec<f32>>;
}

/// Largest box by area. Ties keep the earliest box.
pub fn select_largest(boxes: &[FaceBox]) -> Option<FaceBox> {
    boxes.iter().copied().fold(None, |best, candidate| match best {
        Some(current) if current.area() >= candidate.area() => Some(current),
        _ => Some(candidate),
    })
}

/// Crop a face region and normalise it to RGB channel order.
pub fn crop_face(image: &DynamicImage, face: &FaceBox) -> Option<DynamicImage> {
    let region = face.clamp_to(image.width(), image.height())?;
    let crop = image.crop_imm(region.x, region.y, region.width, region.height);
    Some(DynamicImage::ImageRgb8(crop.to_rgb8()))
}

/// Runs the detector and applies the subject-selection policy.
#[derive(Clone)]
pub struct FaceLocator {
    detector: Arc<dyn FaceDetector>,
}

impl FaceLocator {
    pub fn new(detector: Arc<dyn FaceDetector>) -> Self {
        Self { detector }
    }

    pub fn detector_name(&self) -> &str {
        self.detector.name()
    }

    /// The subject face and its RGB crop, or `None` when nothing was found.
    pub async fn locate(
        &self,
        image: &DynamicImage,
    ) -> Result<Option<(FaceBox, DynamicImage)>, VerifyError> {
        let boxes = self.detector.detect(image).await?;
        tracing::debug!(faces = boxes.len(), detector = self.detector.name(), "faces detected");

        let Some(subject) = select_largest(&boxes) else {
            return Ok(None);
        };

        let crop = crop_face(image, &subject).ok_or_else(|| {
            VerifyError::internal(format!(
                "face box {subject:?} lies outside the {}x{} image",
                image.width(),
                image.height()
            ))
        })?;

        Ok(Some((subject, crop)))
    }

    /// Like [`FaceLocator::locate`] but a missing face is an error.
    pub async fn require_face(
        &self,
        image: &DynamicImage,
    ) -> Result<(FaceBox, DynamicImage), VerifyError> {
        self.locate(image).await?.ok_or(VerifyError::NoFaceDetected)
    }
}
