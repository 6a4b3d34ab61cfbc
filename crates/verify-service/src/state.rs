use crate::config::{VerifyServiceConfig, IC_PHOTO_NAME};
use crate::decision::{Decision, DecisionPolicy};
use crate::error::VerifyError;
use crate::face::{EmbeddingExtractor, FaceBox, FaceDetector, FaceLocator};
use crate::ingress;
use crate::store::{IdentityRecord, IdentityStore, StoreError};
use crate::warmup::{self, WarmupStatus};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use telemetry::metrics::{
    VERIFY_ATTEMPTS, VERIFY_ENROLLMENTS, VERIFY_MATCH_DISTANCE, VERIFY_PIPELINE_LATENCY,
};
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Clone)]
pub struct VerifyServiceState {
    inner: Arc<VerifyServiceStateInner>,
}

struct VerifyServiceStateInner {
    policy: DecisionPolicy,
    upload_dir: PathBuf,
    locator: FaceLocator,
    extractor: Arc<dyn EmbeddingExtractor>,
    store: Option<Arc<dyn IdentityStore>>,
    warmup: RwLock<WarmupStatus>,
}

/// Result of enrolling an identity document
#[derive(Debug, Clone)]
pub struct Enrollment {
    pub photo_reference: String,
    /// Face used for the embedding; `None` means the whole image was embedded
    pub face: Option<FaceBox>,
    /// False when nothing was stored (stateless mode or store unreachable)
    pub persisted: bool,
}

/// Result of checking one live frame
#[derive(Debug, Clone)]
pub struct Verification {
    pub decision: Decision,
    pub face: FaceBox,
    /// The decision is the fixed stateless pass, no comparison took place
    pub stateless: bool,
}

fn observe_stage(stage: &str, started: Instant) {
    VERIFY_PIPELINE_LATENCY
        .with_label_values(&[stage])
        .observe(started.elapsed().as_secs_f64());
}

impl VerifyServiceState {
    /// Stateless service: enrollment is not persisted and every verification passes.
    pub fn new(
        config: &VerifyServiceConfig,
        detector: Arc<dyn FaceDetector>,
        extractor: Arc<dyn EmbeddingExtractor>,
    ) -> Self {
        Self::build(config, detector, extractor, None)
    }

    pub fn with_store(
        config: &VerifyServiceConfig,
        detector: Arc<dyn FaceDetector>,
        extractor: Arc<dyn EmbeddingExtractor>,
        store: Arc<dyn IdentityStore>,
    ) -> Self {
        Self::build(config, detector, extractor, Some(store))
    }

    fn build(
        config: &VerifyServiceConfig,
        detector: Arc<dyn FaceDetector>,
        extractor: Arc<dyn EmbeddingExtractor>,
        store: Option<Arc<dyn IdentityStore>>,
    ) -> Self {
        telemetry::metrics::VERIFY_STATELESS_MODE.set(i64::from(store.is_none()));

        Self {
            inner: Arc::new(VerifyServiceStateInner {
                policy: DecisionPolicy::new(config.threshold),
                upload_dir: config.upload_dir.clone(),
                locator: FaceLocator::new(detector),
                extractor,
                store,
                warmup: RwLock::new(WarmupStatus::Pending),
            }),
        }
    }

    pub fn is_stateless(&self) -> bool {
        self.inner.store.is_none()
    }

    pub fn store_kind(&self) -> &'static str {
        self.inner.store.as_ref().map_or("none", |s| s.kind())
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.inner.policy
    }

    pub fn upload_dir(&self) -> &Path {
        &self.inner.upload_dir
    }

    pub async fn warmup_status(&self) -> WarmupStatus {
        self.inner.warmup.read().await.clone()
    }

    /// Run the one-time model warm-up and remember its outcome.
    pub async fn warm_up(&self) -> WarmupStatus {
        let status = warmup::warm_up(self.inner.extractor.as_ref()).await;
        *self.inner.warmup.write().await = status.clone();
        status
    }

    async fn extract(&self, face: &DynamicImage) -> Result<Vec<f32>, VerifyError> {
        let started = Instant::now();
        let embedding = self.inner.extractor.extract(face).await?;
        observe_stage("embed", started);
        Ok(embedding)
    }

    async fn locate(
        &self,
        image: &DynamicImage,
    ) -> Result<Option<(FaceBox, DynamicImage)>, VerifyError> {
        let started = Instant::now();
        let located = self.inner.locator.locate(image).await;
        observe_stage("detect", started);
        located
    }

    /// Archive the uploaded document, embed its face and make it the enrolled identity.
    pub async fn enroll_identity(&self, bytes: &[u8]) -> Result<Enrollment, VerifyError> {
        let result = self.enroll_inner(bytes).await;
        let outcome = match &result {
            Ok(e) if e.persisted => "stored",
            Ok(_) => "stateless",
            Err(e) => e.kind(),
        };
        VERIFY_ENROLLMENTS.with_label_values(&[outcome]).inc();
        result
    }

    async fn enroll_inner(&self, bytes: &[u8]) -> Result<Enrollment, VerifyError> {
        tokio::fs::create_dir_all(&self.inner.upload_dir).await?;
        let path = self.inner.upload_dir.join(IC_PHOTO_NAME);
        tokio::fs::write(&path, bytes).await?;

        let image = ingress::decode_image(bytes)?;

        let (face, subject) = match self.locate(&image).await? {
            Some((face, crop)) => (Some(face), crop),
            None => {
                warn!(
                    detector = self.inner.locator.detector_name(),
                    width = image.width(),
                    height = image.height(),
                    "no face found on identity document, embedding the whole image"
                );
                (None, DynamicImage::ImageRgb8(image.to_rgb8()))
            }
        };

        let embedding = self.extract(&subject).await?;

        let persisted = match &self.inner.store {
            Some(store) => {
                let record = IdentityRecord {
                    photo_reference: IC_PHOTO_NAME.to_string(),
                    embedding,
                };
                match store.enroll(record).await {
                    Ok(()) => {
                        info!(store = store.kind(), path = %path.display(), "new IC registered");
                        true
                    }
                    Err(StoreError::Unavailable(reason)) => {
                        warn!(%reason, "identity store unavailable, skipping storage (stateless mode)");
                        false
                    }
                    Err(e @ StoreError::Query(_)) => return Err(VerifyError::internal(e.to_string())),
                }
            }
            None => {
                warn!("no identity store configured, skipping storage (stateless mode)");
                false
            }
        };

        Ok(Enrollment {
            photo_reference: IC_PHOTO_NAME.to_string(),
            face,
            persisted,
        })
    }

    /// Compare the face in a base64 camera frame against the enrolled identity.
    pub async fn verify_frame(&self, frame: &str) -> Result<Verification, VerifyError> {
        let result = self.verify_inner(frame).await;
        let outcome = match &result {
            Ok(v) if v.stateless => "stateless",
            Ok(v) if v.decision.passed() => "pass",
            Ok(_) => "fail",
            Err(e) => e.kind(),
        };
        VERIFY_ATTEMPTS.with_label_values(&[outcome]).inc();
        result
    }

    async fn verify_inner(&self, frame: &str) -> Result<Verification, VerifyError> {
        let image = ingress::decode_frame(frame)?;

        let started = Instant::now();
        let located = self.inner.locator.require_face(&image).await;
        observe_stage("detect", started);
        let (face, crop) = located?;
        let embedding = self.extract(&crop).await?;

        let stateless = Verification {
            decision: self.inner.policy.stateless(),
            face,
            stateless: true,
        };

        let Some(store) = &self.inner.store else {
            return Ok(stateless);
        };

        let nearest = match store.find_nearest(&embedding).await {
            Ok(Some(nearest)) => nearest,
            Ok(None) => return Err(VerifyError::NoIdentityRecord),
            Err(StoreError::Unavailable(reason)) => {
                warn!(%reason, "identity store unavailable, answering in stateless mode");
                return Ok(stateless);
            }
            Err(e @ StoreError::Query(_)) => return Err(VerifyError::internal(e.to_string())),
        };

        let decision = self.inner.policy.decide(nearest.distance);
        let verdict = if decision.passed() { "pass" } else { "fail" };
        VERIFY_MATCH_DISTANCE
            .with_label_values(&[verdict])
            .observe(nearest.distance);

        info!(
            photo = %nearest.photo_reference,
            distance = nearest.distance,
            score = decision.score,
            verdict,
            "frame verified"
        );

        Ok(Verification {
            decision,
            face,
            stateless: false,
        })
    }
}
