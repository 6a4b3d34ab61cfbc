pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::MemoryIdentityStore;
pub use postgres::PgIdentityStore;

/// The enrolled identity document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub photo_reference: String,
    pub embedding: Vec<f32>,
}

/// Result of a nearest-neighbour lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearestIdentity {
    pub photo_reference: String,
    /// L2 distance between the stored embedding and the query
    pub distance: f64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store cannot be reached. Callers degrade to stateless mode.
    #[error("identity store unavailable: {0}")]
    Unavailable(String),

    #[error("identity store query failed: {0}")]
    Query(String),
}

/// Holds at most one identity record. Enrolling replaces it.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Backend name for logs and health output
    fn kind(&self) -> &'static str;

    /// Replace the stored record. Last enroll wins.
    async fn enroll(&self, record: IdentityRecord) -> Result<(), StoreError>;

    /// Distance from `query` to the stored embedding, `None` when empty.
    async fn find_nearest(&self, query: &[f32]) -> Result<Option<NearestIdentity>, StoreError>;
}

/// L2 distance, accumulated in f64. Both vectors must come from the same
/// extractor; `None` when their lengths differ.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() {
        return None;
    }

    let sum: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = f64::from(*x) - f64::from(*y);
            d * d
        })
        .sum();

    Some(sum.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance() {
        assert_eq!(euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]), Some(5.0));
        assert_eq!(euclidean_distance(&[1.5, -2.0, 7.0], &[1.5, -2.0, 7.0]), Some(0.0));
        assert_eq!(euclidean_distance(&[], &[]), Some(0.0));
    }

    #[test]
    fn test_euclidean_distance_dimension_mismatch() {
        assert_eq!(euclidean_distance(&[3.0], &[0.0, 4.0]), None);
        assert_eq!(euclidean_distance(&[0.0, 4.0], &[3.0]), None);
    }
}
