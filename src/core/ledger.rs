use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::models::{ExclusionSet, Identity, LimitStatus, MatchRecord, RateLimitEntry};
use crate::services::store::{ProfileRepository, StoreError};

/// Length of the rolling rate-limit window
pub fn window() -> Duration {
    Duration::hours(24)
}

/// Evaluate the rolling window at `now`.
///
/// Entries at or before `now - 24h` no longer count. When the surviving
/// counts reach `daily_limit`, the reset time is the oldest survivor + 24h.
pub fn evaluate_window(entries: &[RateLimitEntry], now: DateTime<Utc>, daily_limit: u32) -> LimitStatus {
    let cutoff = now - window();
    let surviving = entries.iter().filter(|e| e.timestamp > cutoff);

    let (used, oldest) = surviving.fold((0u32, None::<DateTime<Utc>>), |(sum, oldest), e| {
        let oldest = match oldest {
            Some(t) if t <= e.timestamp => Some(t),
            _ => Some(e.timestamp),
        };
        (sum.saturating_add(e.count), oldest)
    });

    match oldest {
        Some(oldest) if used >= daily_limit => LimitStatus::Limited {
            reset_at: oldest + window(),
        },
        _ => LimitStatus::Allowed {
            remaining: daily_limit.saturating_sub(used),
        },
    }
}

/// Per-observer rate limiting and match history
#[derive(Clone)]
pub struct MatchLedger {
    repo: Arc<dyn ProfileRepository>,
    daily_limit: u32,
}

impl MatchLedger {
    pub fn new(repo: Arc<dyn ProfileRepository>, daily_limit: u32) -> Self {
        Self { repo, daily_limit }
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    pub async fn check_limit(&self, observer: &Identity) -> Result<LimitStatus, StoreError> {
        self.check_limit_at(observer, Utc::now()).await
    }

    pub async fn check_limit_at(
        &self,
        observer: &Identity,
        now: DateTime<Utc>,
    ) -> Result<LimitStatus, StoreError> {
        let entries = self.repo.match_requests(observer).await?;
        Ok(evaluate_window(&entries, now, self.daily_limit))
    }

    /// Count one match request against the observer's window
    pub async fn record_request(&self, observer: &Identity) -> Result<(), StoreError> {
        self.record_request_at(observer, Utc::now()).await
    }

    pub async fn record_request_at(
        &self,
        observer: &Identity,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.repo
            .push_match_request(observer, RateLimitEntry::single(at))
            .await
    }

    /// Add `matched` to the observer's history. Self matches are refused and
    /// repeated pairs are no-ops; both return `false`.
    pub async fn record_match(
        &self,
        observer: &Identity,
        matched: &Identity,
    ) -> Result<bool, StoreError> {
        if observer == matched {
            tracing::warn!("Refusing to record self match for {}", observer);
            return Ok(false);
        }

        let inserted = self
            .repo
            .add_match(MatchRecord {
                observer: observer.clone(),
                matched: matched.clone(),
                timestamp: Utc::now(),
            })
            .await?;

        if !inserted {
            tracing::debug!("Match {} -> {} already recorded", observer, matched);
        }
        Ok(inserted)
    }

    /// Recorded matches plus the observer's own identity
    pub async fn exclusion_set(&self, observer: &Identity) -> Result<ExclusionSet, StoreError> {
        let history = self.repo.match_history(observer).await?;

        let mut exclude: ExclusionSet = history.into_iter().map(|m| m.matched).collect();
        exclude.insert(observer.clone());
        Ok(exclude)
    }
}
