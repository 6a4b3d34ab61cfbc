/// Face detector using ONNX Runtime
///
/// Runs a single-stage face detection model (YOLO-style output layout
/// `[1, 5, N]`: cx, cy, w, h, confidence) over the grayscale rendition of the
/// input image. Raw candidates are grouped with IoU suppression; a group only
/// survives if enough raw candidates support it, and groups smaller than the
/// configured minimum face size are dropped.
use super::session::{create_session, SessionOptions};
use super::{FaceBox, FaceDetector};
use crate::config::DetectorConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use image::DynamicImage;
use ndarray::{Array, IxDyn};
use ort::{session::Session, value::Value};
use std::sync::{Arc, Mutex};

pub struct OnnxFaceDetector {
    config: DetectorConfig,
    session: Arc<Mutex<Session>>,
    execution_provider: String,
}

impl OnnxFaceDetector {
    pub fn load(config: DetectorConfig, options: &SessionOptions) -> Result<Self> {
        let (session, execution_provider) = create_session(&config.model_path, options)?;

        tracing::info!(
            path = %config.model_path,
            provider = %execution_provider,
            min_neighbors = config.min_neighbors,
            min_size = config.min_size,
            "Initialized face detection model"
        );

        Ok(Self {
            config,
            session: Arc::new(Mutex::new(session)),
            execution_provider,
        })
    }

    pub fn execution_provider(&self) -> &str {
        &self.execution_provider
    }
}

/// Resize to the model input and lay out the luma channel as NCHW, replicated
/// across three channels, normalised to [0, 1].
fn preprocess(img: &DynamicImage, size: u32) -> Array<f32, IxDyn> {
    let gray = img
        .resize_exact(size, size, image::imageops::FilterType::Triangle)
        .to_luma8();

    let mut input = Array::zeros(IxDyn(&[1, 3, size as usize, size as usize]));
    for (x, y, pixel) in gray.enumerate_pixels() {
        let v = pixel[0] as f32 / 255.0;
        for c in 0..3 {
            input[[0, c, y as usize, x as usize]] = v;
        }
    }
    input
}

/// Decode raw candidates above the confidence threshold, scaled back to the
/// original image and clipped to its bounds. Non-finite or empty boxes are
/// dropped.
fn decode_candidates(
    output: &Array<f32, IxDyn>,
    config: &DetectorConfig,
    original_width: u32,
    original_height: u32,
) -> Result<Vec<FaceBox>> {
    let shape = output.shape();
    if shape.len() != 3 || shape[1] < 5 {
        return Err(anyhow!("unexpected detection output shape {:?}", shape));
    }

    let scale_x = original_width as f32 / config.input_size as f32;
    let scale_y = original_height as f32 / config.input_size as f32;
    let max_x = original_width as f32;
    let max_y = original_height as f32;

    let mut boxes = Vec::new();
    for i in 0..shape[2] {
        let confidence = output[[0, 4, i]];
        if !confidence.is_finite() || confidence < config.confidence_threshold {
            continue;
        }

        let cx = output[[0, 0, i]];
        let cy = output[[0, 1, i]];
        let w = output[[0, 2, i]];
        let h = output[[0, 3, i]];
        if ![cx, cy, w, h].iter().all(|v| v.is_finite()) || w <= 0.0 || h <= 0.0 {
            continue;
        }

        let x1 = ((cx - w / 2.0) * scale_x).clamp(0.0, max_x) as u32;
        let y1 = ((cy - h / 2.0) * scale_y).clamp(0.0, max_y) as u32;
        let x2 = ((cx + w / 2.0) * scale_x).clamp(0.0, max_x) as u32;
        let y2 = ((cy + h / 2.0) * scale_y).clamp(0.0, max_y) as u32;
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        boxes.push(FaceBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence,
        });
    }

    Ok(boxes)
}

fn calculate_iou(a: &FaceBox, b: &FaceBox) -> f32 {
    let right = |f: &FaceBox| u64::from(f.x) + u64::from(f.width);
    let bottom = |f: &FaceBox| u64::from(f.y) + u64::from(f.height);

    let x1 = u64::from(a.x.max(b.x));
    let y1 = u64::from(a.y.max(b.y));
    let x2 = right(a).min(right(b));
    let y2 = bottom(a).min(bottom(b));

    let intersection = if x2 > x1 && y2 > y1 {
        ((x2 - x1) as f32) * ((y2 - y1) as f32)
    } else {
        0.0
    };

    let union = a.area() as f32 + b.area() as f32 - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Non-maximum suppression that also counts, for every kept box, how many
/// suppressed candidates overlapped it. Boxes with fewer than `min_neighbors`
/// supporters or smaller than `min_size` are rejected.
fn group_candidates(
    mut candidates: Vec<FaceBox>,
    iou_threshold: f32,
    min_neighbors: usize,
    min_size: u32,
) -> Vec<FaceBox> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept = Vec::new();
    while !candidates.is_empty() {
        let current = candidates.remove(0);
        let before = candidates.len();
        candidates.retain(|other| calculate_iou(&current, other) < iou_threshold);
        let neighbors = before - candidates.len();

        if neighbors >= min_neighbors && current.width >= min_size && current.height >= min_size {
            kept.push(current);
        }
    }
    kept
}

#[async_trait]
impl FaceDetector for OnnxFaceDetector {
    fn name(&self) -> &str {
        &self.config.model_path
    }

    async fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceBox>> {
        let (width, height) = (image.width(), image.height());
        let input = preprocess(image, self.config.input_size);
        let session = Arc::clone(&self.session);

        let output = tokio::task::spawn_blocking(move || -> Result<Array<f32, IxDyn>> {
            let mut session = session
                .lock()
                .map_err(|e| anyhow!("Failed to lock detection session: {}", e))?;
            let input_tensor = Value::from_array(input)?;
            let outputs = session.run(ort::inputs![input_tensor])?;

            let output_value = outputs
                .get("output0")
                .or_else(|| outputs.get("output"))
                .or_else(|| outputs.get("boxes"))
                .context("No detection output tensor found")?;
            let (shape, data) = output_value.try_extract_tensor::<f32>()?;

            let shape_usize: Vec<usize> = shape.as_ref().iter().map(|&x| x as usize).collect();
            Ok(Array::from_shape_vec(IxDyn(&shape_usize), data.to_vec())?)
        })
        .await
        .context("detection task failed to complete")??;

        let candidates = decode_candidates(&output, &self.config, width, height)?;
        let raw = candidates.len();
        let faces = group_candidates(
            candidates,
            self.config.iou_threshold,
            self.config.min_neighbors,
            self.config.min_size,
        );

        tracing::debug!(raw_candidates = raw, faces = faces.len(), "face detection finished");
        Ok(faces)
    }
}
