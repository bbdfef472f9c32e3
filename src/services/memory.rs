use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::core::similarity::SimilarityMetric;
use crate::models::{
    Candidate, DeliveryAddress, Identity, MatchRecord, Profile, ProfileDocument, RateLimitEntry,
};
use crate::services::store::{ProfileRepository, StoreError, VectorIndex};

/// In-process document store with an exact (brute-force) vector index
///
/// Used for local runs without Postgres and throughout the test suite.
#[derive(Default)]
pub struct InMemoryStore {
    documents: RwLock<HashMap<Identity, ProfileDocument>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    /// Snapshot of the full document for one identity
    pub async fn document(&self, who: &Identity) -> Option<ProfileDocument> {
        self.documents.read().await.get(who).cloned()
    }
}

#[async_trait]
impl ProfileRepository for InMemoryStore {
    async fn latest(&self, who: &Identity) -> Result<Option<Profile>, StoreError> {
        let documents = self.documents.read().await;
        Ok(documents
            .get(who)
            .and_then(|doc| doc.latest_profile.as_ref())
            .map(Profile::without_embedding))
    }

    async fn append_version(&self, who: &Identity, profile: Profile) -> Result<u32, StoreError> {
        let mut documents = self.documents.write().await;
        let doc = documents
            .entry(who.clone())
            .or_insert_with(|| ProfileDocument::new(who.clone()));

        doc.profile_versions.push(profile.clone());
        doc.latest_profile = Some(profile);
        doc.last_updated = Utc::now();

        Ok(doc.profile_versions.len() as u32)
    }

    async fn history(&self, who: &Identity) -> Result<Vec<Profile>, StoreError> {
        let documents = self.documents.read().await;
        Ok(documents
            .get(who)
            .map(|doc| doc.profile_versions.clone())
            .unwrap_or_default())
    }

    async fn match_requests(&self, who: &Identity) -> Result<Vec<RateLimitEntry>, StoreError> {
        let documents = self.documents.read().await;
        Ok(documents
            .get(who)
            .map(|doc| doc.match_requests.clone())
            .unwrap_or_default())
    }

    async fn push_match_request(
        &self,
        who: &Identity,
        entry: RateLimitEntry,
    ) -> Result<(), StoreError> {
        let mut documents = self.documents.write().await;
        documents
            .entry(who.clone())
            .or_insert_with(|| ProfileDocument::new(who.clone()))
            .match_requests
            .push(entry);
        Ok(())
    }

    async fn match_history(&self, who: &Identity) -> Result<Vec<MatchRecord>, StoreError> {
        let documents = self.documents.read().await;
        Ok(documents
            .get(who)
            .map(|doc| doc.match_history.clone())
            .unwrap_or_default())
    }

    async fn add_match(&self, record: MatchRecord) -> Result<bool, StoreError> {
        let mut documents = self.documents.write().await;
        let doc = documents
            .entry(record.observer.clone())
            .or_insert_with(|| ProfileDocument::new(record.observer.clone()));

        if doc.match_history.iter().any(|m| m.matched == record.matched) {
            return Ok(false);
        }

        doc.match_history.push(record);
        Ok(true)
    }

    async fn resolved_address(&self, who: &Identity) -> Result<Option<DeliveryAddress>, StoreError> {
        let documents = self.documents.read().await;
        Ok(documents.get(who).and_then(|doc| doc.resolved_address.clone()))
    }

    async fn set_resolved_address(
        &self,
        who: &Identity,
        address: &DeliveryAddress,
    ) -> Result<(), StoreError> {
        let mut documents = self.documents.write().await;
        documents
            .entry(who.clone())
            .or_insert_with(|| ProfileDocument::new(who.clone()))
            .resolved_address = Some(address.clone());
        Ok(())
    }

    async fn is_searchable(&self, who: &Identity, version: u32) -> Result<bool, StoreError> {
        let documents = self.documents.read().await;
        Ok(documents
            .get(who)
            .map(|doc| doc.profile_versions.len() as u32 >= version)
            .unwrap_or(false))
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        Ok(true)
    }
}

#[async_trait]
impl VectorIndex for InMemoryStore {
    async fn nearest(
        &self,
        query: &[f32],
        num_candidates: usize,
        limit: usize,
        metric: SimilarityMetric,
    ) -> Result<Vec<Candidate>, StoreError> {
        let documents = self.documents.read().await;

        let mut hits: Vec<Candidate> = documents
            .values()
            .filter_map(|doc| {
                let latest = doc.latest_profile.as_ref()?;
                let embedding = latest.embedding.as_ref()?;
                Some(Candidate {
                    identity: doc.identity.clone(),
                    profile: latest.without_embedding(),
                    score: metric.score(query, embedding),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.identity.cmp(&b.identity))
        });
        hits.truncate(limit.min(num_candidates));

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PrivateAttrs, PublicAttrs};

    fn profile_with(summary: &str, embedding: Option<Vec<f32>>) -> Profile {
        let public = PublicAttrs {
            summary: Some(summary.to_string()),
            ..Default::default()
        };
        Profile {
            embedding,
            ..Profile::new(public, PrivateAttrs::default())
        }
    }

    #[tokio::test]
    async fn test_append_keeps_history_and_moves_latest() {
        let store = InMemoryStore::new();
        let who = Identity::new("telegram", "alice");

        let v1 = store.append_version(&who, profile_with("first", None)).await.unwrap();
        let v2 = store.append_version(&who, profile_with("second", None)).await.unwrap();

        assert_eq!((v1, v2), (1, 2));
        let history = store.history(&who).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].public.summary.as_deref(), Some("first"));

        let latest = store.latest(&who).await.unwrap().unwrap();
        assert_eq!(latest.public.summary.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_latest_strips_embedding() {
        let store = InMemoryStore::new();
        let who = Identity::new("telegram", "alice");
        store
            .append_version(&who, profile_with("x", Some(vec![1.0, 0.0])))
            .await
            .unwrap();

        let latest = store.latest(&who).await.unwrap().unwrap();
        assert!(latest.embedding.is_none());
        assert!(store.document(&who).await.unwrap().profile_versions[0]
            .embedding
            .is_some());
    }

    #[tokio::test]
    async fn test_add_match_is_set_like() {
        let store = InMemoryStore::new();
        let record = MatchRecord {
            observer: Identity::new("telegram", "alice"),
            matched: Identity::new("telegram", "bob"),
            timestamp: Utc::now(),
        };

        assert!(store.add_match(record.clone()).await.unwrap());
        assert!(!store.add_match(record.clone()).await.unwrap());
        assert_eq!(store.match_history(&record.observer).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_nearest_orders_by_score_and_skips_unembedded() {
        let store = InMemoryStore::new();
        store
            .append_version(&Identity::new("telegram", "near"), profile_with("a", Some(vec![1.0, 0.1])))
            .await
            .unwrap();
        store
            .append_version(&Identity::new("telegram", "far"), profile_with("b", Some(vec![0.0, 1.0])))
            .await
            .unwrap();
        store
            .append_version(&Identity::new("telegram", "blank"), profile_with("c", None))
            .await
            .unwrap();

        let hits = store
            .nearest(&[1.0, 0.0], 100, 10, SimilarityMetric::Cosine)
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].identity.username, "near");
        assert!(hits[0].score > hits[1].score);
        assert!(hits[0].profile.embedding.is_none());
    }
}
