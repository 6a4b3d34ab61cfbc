use anyhow::{bail, Context, Result};
use std::{env, net::SocketAddr, path::PathBuf, str::FromStr};

/// Name the uploaded identity document is archived under; also its
/// photo reference in the identity store.
pub const IC_PHOTO_NAME: &str = "user_ic.jpg";

#[derive(Clone, Debug, PartialEq)]
pub enum IdentityStoreType {
    /// No backing store: enrollment is not persisted and verification passes.
    None,
    Memory,
    Postgres,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FaceBackend {
    Onnx,
    /// Model-free detector and extractor, for demos without model files.
    Mock,
}

#[derive(Clone, Debug)]
pub struct DetectorConfig {
    pub model_path: String,
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    /// Raw candidates that must overlap a kept box
    pub min_neighbors: usize,
    /// Smallest accepted face side, in source pixels
    pub min_size: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: "models/face_detector.onnx".to_string(),
            input_size: 640,
            confidence_threshold: 0.5,
            iou_threshold: 0.4,
            min_neighbors: 2,
            min_size: 100,
        }
    }
}

#[derive(Clone, Debug)]
pub struct EmbeddingConfig {
    pub model_path: String,
    pub model_name: String,
    pub input_size: u32,
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_path: "models/facenet512.onnx".to_string(),
            model_name: "Facenet512".to_string(),
            input_size: 160,
            dimension: 512,
        }
    }
}

#[derive(Clone, Debug)]
pub struct VerifyServiceConfig {
    pub bind_addr: SocketAddr,
    pub store_type: IdentityStoreType,
    pub database_url: Option<String>,
    pub upload_dir: PathBuf,
    /// Maximum embedding distance still counted as a match
    pub threshold: f64,
    pub backend: FaceBackend,
    pub detector: DetectorConfig,
    pub embedding: EmbeddingConfig,
    /// CPU, CUDA or TensorRT; unavailable providers fall back towards CPU
    pub execution_provider: String,
    pub intra_threads: usize,
}

impl Default for VerifyServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            store_type: IdentityStoreType::None,
            database_url: None,
            upload_dir: PathBuf::from("uploads"),
            threshold: 20.0,
            backend: FaceBackend::Onnx,
            detector: DetectorConfig::default(),
            embedding: EmbeddingConfig::default(),
            execution_provider: "CPU".to_string(),
            intra_threads: 4,
        }
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid {name}: {raw:?}")),
        Err(_) => Ok(default),
    }
}

impl VerifyServiceConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let bind = env::var("VERIFY_SERVICE_ADDR").unwrap_or_else(|_| "0.0.0.0:5000".to_string());
        let bind_addr: SocketAddr = bind.parse().context("invalid VERIFY_SERVICE_ADDR")?;

        let database_url = env::var("DB_URI").ok().filter(|v| !v.trim().is_empty());

        let store_type = match env::var("IDENTITY_STORE").ok().as_deref().map(str::to_lowercase) {
            Some(ref s) if s == "postgres" || s == "postgresql" => IdentityStoreType::Postgres,
            Some(ref s) if s == "memory" => IdentityStoreType::Memory,
            Some(ref s) if s == "none" => IdentityStoreType::None,
            Some(other) => bail!("invalid IDENTITY_STORE: {other:?}"),
            None if database_url.is_some() => IdentityStoreType::Postgres,
            None => IdentityStoreType::None,
        };

        if store_type == IdentityStoreType::Postgres && database_url.is_none() {
            bail!("DB_URI required for the postgres identity store");
        }

        let threshold: f64 = parse_var("PASSING_THRESHOLD_DISTANCE", defaults.threshold)?;
        if !(threshold.is_finite() && threshold > 0.0) {
            bail!("PASSING_THRESHOLD_DISTANCE must be a positive number, got {threshold}");
        }

        let backend = match env::var("FACE_BACKEND").unwrap_or_default().to_lowercase().as_str() {
            "mock" => FaceBackend::Mock,
            "" | "onnx" => FaceBackend::Onnx,
            other => bail!("invalid FACE_BACKEND: {other:?}"),
        };

        let detector = DetectorConfig {
            model_path: env::var("FACE_DETECTION_MODEL")
                .unwrap_or(defaults.detector.model_path),
            min_neighbors: parse_var("FACE_MIN_NEIGHBORS", defaults.detector.min_neighbors)?,
            min_size: parse_var("FACE_MIN_SIZE", defaults.detector.min_size)?,
            ..DetectorConfig::default()
        };

        let embedding = EmbeddingConfig {
            model_path: env::var("FACE_EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding.model_path),
            model_name: env::var("FACE_MODEL_NAME").unwrap_or(defaults.embedding.model_name),
            dimension: parse_var("FACE_EMBEDDING_DIM", defaults.embedding.dimension)?,
            ..EmbeddingConfig::default()
        };

        Ok(Self {
            bind_addr,
            store_type,
            database_url,
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            threshold,
            backend,
            detector,
            embedding,
            execution_provider: env::var("FACE_EXECUTION_PROVIDER")
                .unwrap_or(defaults.execution_provider),
            intra_threads: parse_var("FACE_INTRA_THREADS", defaults.intra_threads)?,
        })
    }

    pub fn is_stateless(&self) -> bool {
        self.store_type == IdentityStoreType::None
    }
}
