use std::sync::Arc;

use crate::models::{DeliveryAddress, Identity, Profile, ProfileLookup};
use crate::services::cache::{CacheKey, CacheManager};
use crate::services::store::{ProfileRepository, StoreError};

/// Cache lifetimes for profile lookups, in seconds
#[derive(Debug, Clone, Copy)]
pub struct LookupTtl {
    pub present_secs: u64,
    /// For `Missing` and `Empty` lookups
    pub empty_secs: u64,
}

impl Default for LookupTtl {
    fn default() -> Self {
        Self {
            present_secs: 3600,
            empty_secs: 300,
        }
    }
}

/// Versioned profile storage with an optional lookup cache in front
#[derive(Clone)]
pub struct ProfileStore {
    repo: Arc<dyn ProfileRepository>,
    cache: Option<Arc<CacheManager>>,
    ttl: LookupTtl,
}

impl ProfileStore {
    pub fn new(repo: Arc<dyn ProfileRepository>) -> Self {
        Self {
            repo,
            cache: None,
            ttl: LookupTtl::default(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<CacheManager>, ttl: LookupTtl) -> Self {
        self.cache = Some(cache);
        self.ttl = ttl;
        self
    }

    pub fn repository(&self) -> Arc<dyn ProfileRepository> {
        self.repo.clone()
    }

    /// Latest revision, distinguishing "never stored" from "placeholder"
    pub async fn get_latest(&self, who: &Identity) -> Result<ProfileLookup, StoreError> {
        let key = CacheKey::profile(who);

        if let Some(cache) = &self.cache {
            match cache.get::<ProfileLookup>(&key).await {
                Ok(lookup) => {
                    tracing::debug!("Profile cache hit for {}", who);
                    return Ok(lookup);
                }
                Err(crate::services::cache::CacheError::CacheMiss(_)) => {}
                Err(e) => tracing::warn!("Profile cache read failed for {}: {}", who, e),
            }
        }

        let lookup = ProfileLookup::from_latest(self.repo.latest(who).await?);

        if let Some(cache) = &self.cache {
            let ttl = if lookup.is_present() {
                self.ttl.present_secs
            } else {
                self.ttl.empty_secs
            };
            if let Err(e) = cache.set_with_ttl(&key, &lookup, ttl).await {
                tracing::warn!("Profile cache write failed for {}: {}", who, e);
            }
        }

        Ok(lookup)
    }

    /// Append a revision and return its version number
    pub async fn append_version(&self, who: &Identity, profile: Profile) -> Result<u32, StoreError> {
        let version = self.repo.append_version(who, profile).await?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.delete(&CacheKey::profile(who)).await {
                tracing::warn!("Profile cache invalidation failed for {}: {}", who, e);
            }
        }

        tracing::info!("Stored profile version {} for {}", version, who);
        Ok(version)
    }

    pub async fn get_history(&self, who: &Identity) -> Result<Vec<Profile>, StoreError> {
        let history = self.repo.history(who).await?;
        Ok(history.iter().map(Profile::without_embedding).collect())
    }

    pub async fn set_address(&self, who: &Identity, address: &DeliveryAddress) -> Result<(), StoreError> {
        self.repo.set_resolved_address(who, address).await
    }

    pub async fn is_searchable(&self, who: &Identity, version: u32) -> Result<bool, StoreError> {
        self.repo.is_searchable(who, version).await
    }

    pub async fn health_check(&self) -> Result<bool, StoreError> {
        self.repo.health_check().await
    }
}
