use super::{euclidean_distance, IdentityRecord, IdentityStore, NearestIdentity, StoreError};
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Single-slot in-process store
#[derive(Default)]
pub struct MemoryIdentityStore {
    record: RwLock<Option<IdentityRecord>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current record
    pub async fn current(&self) -> Option<IdentityRecord> {
        self.record.read().await.clone()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn enroll(&self, record: IdentityRecord) -> Result<(), StoreError> {
        *self.record.write().await = Some(record);
        Ok(())
    }

    async fn find_nearest(&self, query: &[f32]) -> Result<Option<NearestIdentity>, StoreError> {
        let record = self.record.read().await;
        let Some(r) = record.as_ref() else {
            return Ok(None);
        };

        let distance = euclidean_distance(&r.embedding, query).ok_or_else(|| {
            StoreError::Query(format!(
                "embedding dimension mismatch: stored {}, query {}",
                r.embedding.len(),
                query.len()
            ))
        })?;

        Ok(Some(NearestIdentity {
            photo_reference: r.photo_reference.clone(),
            distance,
        }))
    }
}
