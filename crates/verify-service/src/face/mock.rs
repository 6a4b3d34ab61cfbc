/// Model-free face backend for demos and local development.
///
/// The detector reports one centred square face covering most of the frame and
/// the extractor embeds a coarse luminance thumbnail. Identical pictures match
/// with distance 0; it tells nothing about real identity.
use super::{EmbeddingExtractor, FaceBox, FaceDetector};
use anyhow::Result;
use async_trait::async_trait;
use image::DynamicImage;

/// Fraction of the shorter image side used as the face box side
const FACE_FRACTION: f32 = 0.6;

/// Embedding values span [0, LUMA_SCALE]
const LUMA_SCALE: f32 = 4.0;

pub struct CenterFaceDetector {
    min_size: u32,
}

impl CenterFaceDetector {
    pub fn new(min_size: u32) -> Self {
        Self { min_size }
    }
}

#[async_trait]
impl FaceDetector for CenterFaceDetector {
    fn name(&self) -> &str {
        "mock_center_face"
    }

    async fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceBox>> {
        let (width, height) = (image.width(), image.height());
        let side = (width.min(height) as f32 * FACE_FRACTION) as u32;
        if side < self.min_size || side == 0 {
            return Ok(vec![]);
        }

        Ok(vec![FaceBox {
            x: (width - side) / 2,
            y: (height - side) / 2,
            width: side,
            height: side,
            confidence: 1.0,
        }])
    }
}

pub struct LuminanceEmbeddingExtractor {
    dimension: usize,
}

impl LuminanceEmbeddingExtractor {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbeddingExtractor for LuminanceEmbeddingExtractor {
    fn model_name(&self) -> &str {
        "mock_luminance"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn extract(&self, face: &DynamicImage) -> Result<Vec<f32>> {
        let side = (self.dimension as f64).sqrt().ceil().max(1.0) as u32;
        let thumb = face
            .resize_exact(side, side, image::imageops::FilterType::Triangle)
            .to_luma8();

        Ok(thumb
            .pixels()
            .take(self.dimension)
            .map(|p| p[0] as f32 / 255.0 * LUMA_SCALE)
            .collect())
    }
}
