use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::core::embedding::EmbeddingGateway;
use crate::core::ledger::MatchLedger;
use crate::core::notifier::NotificationDispatcher;
use crate::core::profiles::{LookupTtl, ProfileStore};
use crate::core::searcher::SimilaritySearcher;
use crate::core::selector::{resolve_candidate, CandidateSelector, LlmCandidateSelector};
use crate::core::similarity::SimilarityMetric;
use crate::core::synthesizer::{IdealMatchSynthesizer, SynthesisError};
use crate::models::{Identity, LimitStatus, MatchType, Profile, ProfileLookup, ProfileUpdate};
use crate::services::cache::CacheManager;
use crate::services::llm::{Embedder, TextGenerator};
use crate::services::store::{ProfileRepository, StoreError, VectorIndex};
use crate::services::telegram::Messenger;

/// Shown to the user whenever the durable store cannot be reached
pub const STORE_UNAVAILABLE_MESSAGE: &str =
    "I'm sorry, something went wrong on my side while looking for matches. Please try again in a moment.";

/// Tunables for the matching pipeline
#[derive(Debug, Clone, Copy)]
pub struct MatchOptions {
    pub daily_limit: u32,
    pub num_candidates: usize,
    pub search_limit: usize,
    pub metric: SimilarityMetric,
    pub collaborator_timeout: Duration,
    pub index_settle: Duration,
    pub index_poll: Duration,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            daily_limit: 2,
            num_candidates: 100,
            search_limit: 7,
            metric: SimilarityMetric::Cosine,
            collaborator_timeout: Duration::from_secs(30),
            index_settle: Duration::from_secs(5),
            index_poll: Duration::from_millis(250),
        }
    }
}

/// Terminal outcome of one matchmaking request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchOutcome {
    InsufficientProfile,
    RateLimited {
        #[serde(rename = "resetAt")]
        reset_at: DateTime<Utc>,
    },
    SynthesisFailed,
    EmbeddingUnavailable,
    NoMatches {
        remaining: u32,
    },
    IntroductionFailed {
        remaining: u32,
    },
    Success {
        introduction: String,
        matched: Option<Identity>,
        remaining: u32,
        notified: bool,
    },
}

impl MatchOutcome {
    /// Stable outcome name, matching the serialized tag
    pub fn kind(&self) -> &'static str {
        match self {
            MatchOutcome::InsufficientProfile => "insufficient_profile",
            MatchOutcome::RateLimited { .. } => "rate_limited",
            MatchOutcome::SynthesisFailed => "synthesis_failed",
            MatchOutcome::EmbeddingUnavailable => "embedding_unavailable",
            MatchOutcome::NoMatches { .. } => "no_matches",
            MatchOutcome::IntroductionFailed { .. } => "introduction_failed",
            MatchOutcome::Success { .. } => "success",
        }
    }

    /// Short user-facing text for the outcome
    pub fn message(&self) -> String {
        match self {
            MatchOutcome::InsufficientProfile => "I'm sorry, but I don't have enough information about you to find a match. Please share a bit more about yourself first.".to_string(),
            MatchOutcome::RateLimited { reset_at } => format!(
                "You've reached your match limit for today. You can request new matches after {}.",
                reset_at.format("%Y-%m-%d %H:%M UTC")
            ),
            MatchOutcome::SynthesisFailed => "I'm sorry, I couldn't work out what kind of connection would suit you right now. Please try again in a moment.".to_string(),
            MatchOutcome::EmbeddingUnavailable => "I'm sorry, my search is temporarily unavailable. Please try again in a moment.".to_string(),
            MatchOutcome::NoMatches { .. } => "I'm searching my network for connections. No matches found yet, but I'll keep looking!".to_string(),
            MatchOutcome::IntroductionFailed { .. } => "I found some matches, but couldn't generate the introduction. Please try again!".to_string(),
            MatchOutcome::Success { introduction, remaining, .. } => format!(
                "{}\n\nYou have {} more match requests available today.",
                introduction, remaining
            ),
        }
    }

    /// Message variant used right after the user's profile was updated
    pub fn message_after_update(&self) -> String {
        match self {
            MatchOutcome::NoMatches { .. } => "I've updated your profile and I'm searching my network for connections. No matches found yet, but I'll keep looking!".to_string(),
            MatchOutcome::IntroductionFailed { .. } => "I've updated your profile and found some matches, but couldn't generate the introduction. Please try again!".to_string(),
            other => other.message(),
        }
    }

    pub fn remaining(&self) -> Option<u32> {
        match self {
            MatchOutcome::NoMatches { remaining }
            | MatchOutcome::IntroductionFailed { remaining }
            | MatchOutcome::Success { remaining, .. } => Some(*remaining),
            MatchOutcome::RateLimited { .. } => Some(0),
            _ => None,
        }
    }
}

/// Result of publishing a profile revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishOutcome {
    /// Nothing new in the update, no version written
    Unchanged,
    Published {
        version: u32,
        first_time: bool,
        embedded: bool,
    },
}

/// Publish result followed by the match outcome it triggered
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishAndMatch {
    pub publish: PublishOutcome,
    pub outcome: MatchOutcome,
}

/// Main matchmaking orchestrator
///
/// # Pipeline Stages
/// 1. Latest profile lookup
/// 2. Rate-limit check
/// 3. Ideal match synthesis
/// 4. Embedding of the ideal match description
/// 5. Nearest-neighbour recall minus the exclusion set
/// 6. Candidate selection and introduction
/// 7. Match recording and notification
///
/// Stages run strictly in order; each one needs the previous output.
#[derive(Clone)]
pub struct Matchmaker {
    profiles: ProfileStore,
    embedding: EmbeddingGateway,
    synthesizer: IdealMatchSynthesizer,
    searcher: SimilaritySearcher,
    ledger: MatchLedger,
    selector: Arc<dyn CandidateSelector>,
    notifier: NotificationDispatcher,
    options: MatchOptions,
}

impl Matchmaker {
    /// Wire the pipeline from its collaborators
    pub fn new(
        repo: Arc<dyn ProfileRepository>,
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn TextGenerator>,
        embedder: Arc<dyn Embedder>,
        messenger: Arc<dyn Messenger>,
        options: MatchOptions,
    ) -> Self {
        let timeout = options.collaborator_timeout;

        Self {
            profiles: ProfileStore::new(repo.clone()),
            embedding: EmbeddingGateway::new(embedder, timeout),
            synthesizer: IdealMatchSynthesizer::new(generator.clone(), timeout),
            searcher: SimilaritySearcher::new(
                index,
                options.num_candidates,
                options.search_limit,
                options.metric,
                timeout,
            ),
            ledger: MatchLedger::new(repo.clone(), options.daily_limit),
            selector: Arc::new(LlmCandidateSelector::new(generator, timeout)),
            notifier: NotificationDispatcher::new(repo, messenger, timeout),
            options,
        }
    }

    pub fn with_cache(mut self, cache: Arc<CacheManager>, ttl: LookupTtl) -> Self {
        self.profiles = self.profiles.with_cache(cache, ttl);
        self
    }

    pub fn with_selector(mut self, selector: Arc<dyn CandidateSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }

    pub fn ledger(&self) -> &MatchLedger {
        &self.ledger
    }

    pub fn embedding(&self) -> &EmbeddingGateway {
        &self.embedding
    }

    pub fn options(&self) -> &MatchOptions {
        &self.options
    }

    /// Run the full matching pipeline for `observer`.
    ///
    /// Collaborator failures end in a named outcome; only store failures
    /// are returned as errors.
    #[tracing::instrument(
        name = "find_match",
        skip_all,
        fields(request_id = %uuid::Uuid::new_v4(), observer = %observer)
    )]
    pub async fn find_match(
        &self,
        observer: &Identity,
        context: Option<&str>,
    ) -> Result<MatchOutcome, StoreError> {
        // Stage 1: an empty placeholder is as good as nothing
        let profile = match self.profiles.get_latest(observer).await? {
            ProfileLookup::Present(profile) => profile,
            ProfileLookup::Missing | ProfileLookup::Empty(_) => {
                tracing::info!("No usable profile, cannot search");
                return Ok(MatchOutcome::InsufficientProfile);
            }
        };

        // Stage 2
        let remaining = match self.ledger.check_limit(observer).await? {
            LimitStatus::Allowed { remaining } => remaining,
            LimitStatus::Limited { reset_at } => {
                tracing::info!("Rate limited until {}", reset_at);
                return Ok(MatchOutcome::RateLimited { reset_at });
            }
        };

        // Stage 3
        let description = match self.synthesizer.synthesize(&profile, context).await {
            Ok(description) => description,
            Err(SynthesisError::Empty) => {
                tracing::warn!("Ideal match synthesis returned nothing");
                return Ok(MatchOutcome::SynthesisFailed);
            }
            Err(e) => {
                tracing::error!("Ideal match synthesis failed: {}", e);
                return Ok(MatchOutcome::SynthesisFailed);
            }
        };
        tracing::debug!("Ideal match: {}", description);

        // Stage 4
        let Some(query) = self.embedding.embed_text(&description).await else {
            return Ok(MatchOutcome::EmbeddingUnavailable);
        };

        // Stage 5
        let exclude = self.ledger.exclusion_set(observer).await?;
        let candidates = self.searcher.search(&query, &exclude).await;

        // Every attempt past this point counts against the quota
        self.ledger.record_request(observer).await?;
        let remaining = remaining.saturating_sub(1);

        if candidates.is_empty() {
            tracing::info!("No candidates found");
            return Ok(MatchOutcome::NoMatches { remaining });
        }
        tracing::info!("Found {} candidates", candidates.len());

        // Stage 6
        let selection = match self.selector.select(observer, &profile, &candidates).await {
            Ok(selection) => selection,
            Err(e) => {
                tracing::error!("Candidate selection failed: {}", e);
                return Ok(MatchOutcome::IntroductionFailed { remaining });
            }
        };

        // Stage 7: only a listed candidate other than the requester is
        // recorded or notified, whatever the selector returned
        let matched = match selection.matched.as_ref() {
            Some(named) => {
                let resolved =
                    resolve_candidate(&candidates, &named.username, Some(&named.platform))
                        .filter(|identity| *identity != observer)
                        .cloned();
                if resolved.is_none() {
                    tracing::warn!("Selection named {}, not an eligible candidate", named);
                }
                resolved
            }
            None => None,
        };

        let notified = match &matched {
            Some(matched) => {
                self.ledger.record_match(observer, matched).await?;
                self.notifier.notify(matched, observer, &selection.post).await
            }
            None => {
                tracing::warn!("Selection named no match, nothing recorded");
                false
            }
        };

        tracing::info!(
            "Introduced {} (notified: {})",
            matched
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| "unknown match".to_string()),
            notified
        );

        Ok(MatchOutcome::Success {
            introduction: selection.post,
            matched,
            remaining,
            notified,
        })
    }

    /// Store a new profile revision unless the update carries nothing new
    pub async fn publish(
        &self,
        who: &Identity,
        update: ProfileUpdate,
    ) -> Result<PublishOutcome, StoreError> {
        if update.analysis == Some(MatchType::ExactMatch) {
            tracing::info!("Profile for {} unchanged, skipping write", who);
            if let Some(address) = &update.address {
                self.profiles.set_address(who, address).await?;
            }
            return Ok(PublishOutcome::Unchanged);
        }

        let prior = self.profiles.get_latest(who).await?;
        let first_time = !prior.is_present() && update.analysis != Some(MatchType::UpdateExisting);

        let mut profile = Profile::new(update.public, update.private);
        profile.embedding = self.embedding.embed_profile(&profile).await;
        let embedded = profile.embedding.is_some();
        if !embedded {
            tracing::warn!("Storing profile for {} without embedding", who);
        }

        let version = self.profiles.append_version(who, profile).await?;

        if let Some(address) = &update.address {
            self.profiles.set_address(who, address).await?;
        }

        Ok(PublishOutcome::Published {
            version,
            first_time,
            embedded,
        })
    }

    /// Publish, wait for the new version to become searchable, then match
    pub async fn publish_and_match(
        &self,
        who: &Identity,
        update: ProfileUpdate,
        context: Option<&str>,
    ) -> Result<PublishAndMatch, StoreError> {
        let publish = self.publish(who, update).await?;

        if let PublishOutcome::Published {
            version,
            embedded: true,
            ..
        } = publish
        {
            if !self.wait_until_searchable(who, version).await {
                tracing::warn!(
                    "Version {} for {} not searchable after {:?}, matching anyway",
                    version,
                    who,
                    self.options.index_settle
                );
            }
        }

        let outcome = self.find_match(who, context).await?;
        Ok(PublishAndMatch { publish, outcome })
    }

    /// Poll the store until `version` is visible to the index or the settle
    /// budget runs out
    pub async fn wait_until_searchable(&self, who: &Identity, version: u32) -> bool {
        let deadline = Instant::now() + self.options.index_settle;

        loop {
            match self.profiles.is_searchable(who, version).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => tracing::warn!("Searchability check for {} failed: {}", who, e),
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(self.options.index_poll.min(deadline - now)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_outcome_messages() {
        assert!(MatchOutcome::InsufficientProfile
            .message()
            .contains("don't have enough information"));

        let success = MatchOutcome::Success {
            introduction: "Meet @bob!".to_string(),
            matched: None,
            remaining: 1,
            notified: false,
        };
        assert_eq!(
            success.message(),
            "Meet @bob!\n\nYou have 1 more match requests available today."
        );

        let reset_at = Utc::now() + ChronoDuration::hours(3);
        let limited = MatchOutcome::RateLimited { reset_at };
        assert!(limited.message().contains(&reset_at.format("%H:%M").to_string()));
        assert_eq!(limited.remaining(), Some(0));
    }

    #[test]
    fn test_update_messages() {
        let none = MatchOutcome::NoMatches { remaining: 1 };
        assert!(none.message_after_update().starts_with("I've updated your profile"));
        assert_eq!(
            MatchOutcome::SynthesisFailed.message_after_update(),
            MatchOutcome::SynthesisFailed.message()
        );
    }

    #[test]
    fn test_outcome_serializes_with_tag() {
        let value = serde_json::to_value(MatchOutcome::NoMatches { remaining: 1 }).unwrap();
        assert_eq!(value["outcome"], "no_matches");
        assert_eq!(value["remaining"], 1);

        let published = serde_json::to_value(PublishOutcome::Published {
            version: 2,
            first_time: false,
            embedded: true,
        })
        .unwrap();
        assert_eq!(published["status"], "published");
    }
}
