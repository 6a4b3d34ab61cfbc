use anyhow::{Context, Result};
use ort::{
    execution_providers::{CPUExecutionProvider, CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::GraphOptimizationLevel, builder::SessionBuilder, Session},
};
use std::path::Path;

/// ONNX session options shared by the detector and the extractor
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// CPU, CUDA or TensorRT
    pub execution_provider: String,
    pub device_id: i32,
    pub intra_threads: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            execution_provider: "CPU".to_string(),
            device_id: 0,
            intra_threads: 4,
        }
    }
}

fn builder(options: &SessionOptions) -> Result<SessionBuilder> {
    Session::builder()
        .context("Failed to create session builder")?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(options.intra_threads)
        .context("Failed to set intra threads")
}

/// Load a model, falling back TensorRT -> CUDA -> CPU.
/// Returns the session and the provider that was actually configured.
pub fn create_session(model_path: &str, options: &SessionOptions) -> Result<(Session, String)> {
    if !Path::new(model_path).exists() {
        anyhow::bail!("model file not found: {model_path}");
    }

    match options.execution_provider.to_uppercase().as_str() {
        "TENSORRT" => {
            tracing::info!("Attempting TensorRT for {}", model_path);
            let result = builder(options)?
                .with_execution_providers([
                    TensorRTExecutionProvider::default()
                        .with_device_id(options.device_id)
                        .build(),
                    CUDAExecutionProvider::default()
                        .with_device_id(options.device_id)
                        .build(),
                    CPUExecutionProvider::default().build(),
                ])
                .context("Failed to set execution providers")?
                .commit_from_file(model_path);

            match result {
                Ok(session) => Ok((session, "TensorRT".to_string())),
                Err(e) => {
                    tracing::warn!("TensorRT failed, trying CUDA: {}", e);
                    try_cuda(model_path, options)
                }
            }
        }
        "CUDA" => try_cuda(model_path, options),
        _ => try_cpu(model_path, options),
    }
}

fn try_cuda(model_path: &str, options: &SessionOptions) -> Result<(Session, String)> {
    tracing::info!("Attempting CUDA for {}", model_path);
    let result = builder(options)?
        .with_execution_providers([
            CUDAExecutionProvider::default()
                .with_device_id(options.device_id)
                .build(),
            CPUExecutionProvider::default().build(),
        ])
        .context("Failed to set execution providers")?
        .commit_from_file(model_path);

    match result {
        Ok(session) => Ok((session, "CUDA".to_string())),
        Err(e) => {
            tracing::warn!("CUDA failed, using CPU: {}", e);
            try_cpu(model_path, options)
        }
    }
}

fn try_cpu(model_path: &str, options: &SessionOptions) -> Result<(Session, String)> {
    tracing::info!("Using CPU for {}", model_path);
    let session = builder(options)?
        .commit_from_file(model_path)
        .context("Failed to load model from file")?;
    Ok((session, "CPU".to_string()))
}
