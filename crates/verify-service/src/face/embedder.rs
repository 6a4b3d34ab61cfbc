//! FaceNet-style embedding extractor via ONNX Runtime.
//!
//! Embeddings are returned unnormalised; the match threshold is expressed as
//! an L2 distance between raw model outputs.

use super::session::{create_session, SessionOptions};
use super::EmbeddingExtractor;
use crate::config::EmbeddingConfig;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use image::DynamicImage;
use ndarray::Array4;
use ort::{session::Session, value::Value};
use std::sync::{Arc, Mutex};

const FACENET_MEAN: f32 = 127.5;
const FACENET_STD: f32 = 128.0;

pub struct OnnxEmbeddingExtractor {
    config: EmbeddingConfig,
    session: Arc<Mutex<Session>>,
}

impl OnnxEmbeddingExtractor {
    pub fn load(config: EmbeddingConfig, options: &SessionOptions) -> Result<Self> {
        let (session, provider) = create_session(&config.model_path, options)?;

        tracing::info!(
            path = %config.model_path,
            model = %config.model_name,
            dimension = config.dimension,
            provider = %provider,
            "Initialized face embedding model"
        );

        Ok(Self {
            config,
            session: Arc::new(Mutex::new(session)),
        })
    }
}

/// Square-resize an RGB crop into a NCHW tensor centred on zero.
fn preprocess(face: &DynamicImage, size: u32) -> Array4<f32> {
    let rgb = face
        .resize_exact(size, size, image::imageops::FilterType::Triangle)
        .to_rgb8();

    let size = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - FACENET_MEAN) / FACENET_STD;
        }
    }
    tensor
}

#[async_trait]
impl EmbeddingExtractor for OnnxEmbeddingExtractor {
    fn model_name(&self) -> &str {
        &self.config.model_name
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    async fn extract(&self, face: &DynamicImage) -> Result<Vec<f32>> {
        let input = preprocess(face, self.config.input_size);
        let session = Arc::clone(&self.session);

        let embedding = tokio::task::spawn_blocking(move || -> Result<Vec<f32>> {
            let mut session = session
                .lock()
                .map_err(|e| anyhow!("Failed to lock embedding session: {}", e))?;
            let input_tensor = Value::from_array(input)?;
            let outputs = session.run(ort::inputs![input_tensor])?;
            let (_, data) = outputs[0].try_extract_tensor::<f32>()?;
            Ok(data.to_vec())
        })
        .await??;

        if embedding.len() != self.config.dimension {
            return Err(anyhow!(
                "expected {}-dim embedding from {}, got {}",
                self.config.dimension,
                self.config.model_name,
                embedding.len()
            ));
        }

        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_config_defaults() {
        let config = EmbeddingConfig::default();
        assert_eq!(config.model_name, "Facenet512");
        assert_eq!(config.dimension, 512);
        assert_eq!(config.input_size, 160);
    }

    #[test]
    fn test_preprocess_shape_and_channels() {
        let face = DynamicImage::ImageRgb8(RgbImage::from_pixel(90, 120, Rgb([255, 127, 0])));
        let tensor = preprocess(&face, 160);
        assert_eq!(tensor.shape(), &[1, 3, 160, 160]);

        let r = tensor[[0, 0, 80, 80]];
        let g = tensor[[0, 1, 80, 80]];
        let b = tensor[[0, 2, 80, 80]];
        assert!((r - (255.0 - 127.5) / 128.0).abs() < 1e-4);
        assert!(g.abs() < 0.01);
        assert!((b + 127.5 / 128.0).abs() < 1e-4);
    }
}
