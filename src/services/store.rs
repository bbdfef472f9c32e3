use async_trait::async_trait;
use thiserror::Error;

use crate::core::similarity::SimilarityMetric;
use crate::models::{Candidate, DeliveryAddress, Identity, MatchRecord, Profile, RateLimitEntry};

/// Errors raised by a durable store backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Document store keyed by `(platform, username)`
///
/// Profile history is append-only: `append_version` adds a revision and
/// replaces the latest pointer, it never rewrites earlier revisions.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Latest revision without its embedding, `None` if nothing was stored
    async fn latest(&self, who: &Identity) -> Result<Option<Profile>, StoreError>;

    /// Append a revision, returning its 1-based version number
    async fn append_version(&self, who: &Identity, profile: Profile) -> Result<u32, StoreError>;

    /// All revisions, oldest first
    async fn history(&self, who: &Identity) -> Result<Vec<Profile>, StoreError>;

    async fn match_requests(&self, who: &Identity) -> Result<Vec<RateLimitEntry>, StoreError>;

    async fn push_match_request(
        &self,
        who: &Identity,
        entry: RateLimitEntry,
    ) -> Result<(), StoreError>;

    async fn match_history(&self, who: &Identity) -> Result<Vec<MatchRecord>, StoreError>;

    /// Insert a match record with set semantics on `(observer, matched)`.
    /// Returns `false` when the pair was already recorded.
    async fn add_match(&self, record: MatchRecord) -> Result<bool, StoreError>;

    async fn resolved_address(&self, who: &Identity) -> Result<Option<DeliveryAddress>, StoreError>;

    async fn set_resolved_address(
        &self,
        who: &Identity,
        address: &DeliveryAddress,
    ) -> Result<(), StoreError>;

    /// Whether the given version is visible to nearest-neighbour queries
    async fn is_searchable(&self, who: &Identity, version: u32) -> Result<bool, StoreError>;

    async fn health_check(&self) -> Result<bool, StoreError>;
}

/// Approximate nearest-neighbour index over latest-profile embeddings
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Up to `limit` hits ordered by descending score, drawn from a pool of
    /// `num_candidates` approximate neighbours
    async fn nearest(
        &self,
        query: &[f32],
        num_candidates: usize,
        limit: usize,
        metric: SimilarityMetric,
    ) -> Result<Vec<Candidate>, StoreError>;
}
