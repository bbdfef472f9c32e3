use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::matcher::{MatchOutcome, PublishOutcome};
use crate::models::domain::{Identity, LimitStatus, Profile};

/// Response for the matching endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResponse {
    pub outcome: String,
    /// User-facing text for the front end to relay verbatim
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub introduction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<Identity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
    #[serde(rename = "resetAt", skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notified: bool,
}

impl MatchResponse {
    pub fn from_outcome(outcome: &MatchOutcome, message: String) -> Self {
        let mut response = Self {
            outcome: outcome.kind().to_string(),
            message,
            introduction: None,
            matched: None,
            remaining: outcome.remaining(),
            reset_at: None,
            notified: false,
        };

        match outcome {
            MatchOutcome::RateLimited { reset_at } => response.reset_at = Some(*reset_at),
            MatchOutcome::Success {
                introduction,
                matched,
                notified,
                ..
            } => {
                response.introduction = Some(introduction.clone());
                response.matched = matched.clone();
                response.notified = *notified;
            }
            _ => {}
        }
        response
    }
}

/// Response for publishing a profile revision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    pub first_time: bool,
    pub embedded: bool,
}

impl From<PublishOutcome> for PublishResponse {
    fn from(outcome: PublishOutcome) -> Self {
        match outcome {
            PublishOutcome::Unchanged => Self {
                status: "unchanged".to_string(),
                version: None,
                first_time: false,
                embedded: false,
            },
            PublishOutcome::Published {
                version,
                first_time,
                embedded,
            } => Self {
                status: "published".to_string(),
                version: Some(version),
                first_time,
                embedded,
            },
        }
    }
}

/// Response for publish-then-match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishAndMatchResponse {
    pub publish: PublishResponse,
    #[serde(rename = "match")]
    pub match_result: MatchResponse,
}

/// Latest profile for one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub identity: Identity,
    pub profile: Profile,
}

/// Revision history for one user, oldest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    #[serde(flatten)]
    pub identity: Identity,
    pub versions: Vec<Profile>,
    pub total: usize,
}

/// Current rate-limit window for one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitResponse {
    #[serde(flatten)]
    pub identity: Identity,
    pub daily_limit: u32,
    pub limited: bool,
    pub remaining: u32,
    #[serde(rename = "resetAt", skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
}

impl LimitResponse {
    pub fn new(identity: Identity, daily_limit: u32, status: LimitStatus) -> Self {
        let reset_at = match status {
            LimitStatus::Limited { reset_at } => Some(reset_at),
            LimitStatus::Allowed { .. } => None,
        };
        Self {
            identity,
            daily_limit,
            limited: status.is_limited(),
            remaining: status.remaining(),
            reset_at,
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}
